//! Descriptor types produced by catalog introspection.

use serde::{Deserialize, Serialize};

/// A column belonging to a table or view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name as it appears in `information_schema.columns`.
    pub name: String,
    /// Ordinal position within the table, 1-based.
    pub position: i32,
    /// Postgres type name (e.g. `text`, `integer`, `jsonb`, `vector`).
    pub pg_type: String,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
    /// Whether the column has a default expression (including identity/serial).
    pub has_default: bool,
    /// Whether the column is a generated column.
    pub is_generated: bool,
}

/// A foreign key relationship used to resolve nested `select=` projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    /// Constraint name.
    pub name: String,
    /// Local columns participating in the constraint, in order.
    pub columns: Vec<String>,
    /// Schema of the referenced table.
    pub referenced_schema: String,
    /// Name of the referenced table.
    pub referenced_table: String,
    /// Referenced columns, in the same order as `columns`.
    pub referenced_columns: Vec<String>,
}

/// A table or view exposed through the data-plane REST surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema the relation lives in.
    pub schema: String,
    /// Relation name.
    pub name: String,
    /// Columns ordered by position.
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key column names, empty for relations without one (e.g. some views).
    pub primary_key: Vec<String>,
    /// Foreign keys declared on this relation.
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// `true` for views, `false` for ordinary tables.
    pub is_view: bool,
    /// Whether row-level security is enabled on the relation.
    pub rls_enabled: bool,
}

impl TableDescriptor {
    /// Find a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Qualified `schema.name` identifier suitable for SQL interpolation
    /// between double quotes.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Parameter direction for a callable function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterMode {
    /// Input parameter.
    In,
    /// Output parameter (contributes to the composite return row).
    Out,
    /// Variadic input parameter.
    Variadic,
}

/// A parameter accepted by a callable function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name, empty for unnamed positional parameters.
    pub name: String,
    /// Postgres type name.
    pub pg_type: String,
    /// Whether the parameter has a default value.
    pub has_default: bool,
    /// Parameter direction.
    pub mode: ParameterMode,
}

/// Function volatility, used to decide whether the RPC surface allows `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    /// `IMMUTABLE` function.
    Immutable,
    /// `STABLE` function; safe to expose over `GET`.
    Stable,
    /// `VOLATILE` function; requires `POST`.
    Volatile,
}

/// A callable function exposed through the RPC surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Schema the function lives in.
    pub schema: String,
    /// Function name.
    pub name: String,
    /// Declared parameters, in call order.
    pub parameters: Vec<ParameterDescriptor>,
    /// Postgres type name of the return value.
    pub return_type: String,
    /// `true` for `RETURNS SETOF`/table functions.
    pub returns_set: bool,
    /// Function volatility.
    pub volatility: Volatility,
    /// Whether the function is currently exposed, after deny-list and
    /// `rpc_function_config` overrides have been applied.
    pub is_public: bool,
}

/// An immutable snapshot of the live catalog as seen by the data plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Monotonic version identifier, bumped on every detected DDL change.
    pub version: i64,
    /// Tables and views keyed implicitly by position; look up via `table`.
    pub tables: Vec<TableDescriptor>,
    /// Callable functions.
    pub functions: Vec<FunctionDescriptor>,
}

impl Catalog {
    /// An empty catalog, used before the first successful refresh.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 0,
            tables: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Look up a table by schema and name.
    #[must_use]
    pub fn table(&self, schema: &str, name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|table| table.schema == schema && table.name == name)
    }

    /// Look up a function by schema and name.
    #[must_use]
    pub fn function(&self, schema: &str, name: &str) -> Option<&FunctionDescriptor> {
        self.functions
            .iter()
            .find(|function| function.schema == schema && function.name == name && function.is_public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TableDescriptor {
        TableDescriptor {
            schema: "public".into(),
            name: "widgets".into(),
            columns: vec![ColumnDescriptor {
                name: "id".into(),
                position: 1,
                pg_type: "uuid".into(),
                nullable: false,
                has_default: true,
                is_generated: false,
            }],
            primary_key: vec!["id".into()],
            foreign_keys: vec![],
            is_view: false,
            rls_enabled: true,
        }
    }

    #[test]
    fn catalog_lookup_is_schema_qualified() {
        let catalog = Catalog {
            version: 1,
            tables: vec![sample_table()],
            functions: vec![],
        };
        assert!(catalog.table("public", "widgets").is_some());
        assert!(catalog.table("other", "widgets").is_none());
    }

    #[test]
    fn table_qualified_name_joins_schema_and_name() {
        assert_eq!(sample_table().qualified_name(), "public.widgets");
    }

    #[test]
    fn function_lookup_excludes_non_public_entries() {
        let hidden = FunctionDescriptor {
            schema: "internal".into(),
            name: "secret".into(),
            parameters: vec![],
            return_type: "void".into(),
            returns_set: false,
            volatility: Volatility::Volatile,
            is_public: false,
        };
        let catalog = Catalog {
            version: 1,
            tables: vec![],
            functions: vec![hidden],
        };
        assert!(catalog.function("internal", "secret").is_none());
    }
}
