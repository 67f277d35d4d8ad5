//! Live catalog introspection.
//!
//! Builds a [`Catalog`] snapshot by querying `pg_catalog`/`information_schema`
//! directly with `sqlx::query` and hand-mapping rows, following the same
//! convention as the rest of the data-access layer: no compile-time query
//! macros, because the introspected schema is inherently dynamic.

use std::collections::HashMap;

use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::cache::SchemaCache;
use crate::error::Result;
use crate::model::{
    Catalog, ColumnDescriptor, FunctionDescriptor, ForeignKeyDescriptor, ParameterDescriptor,
    ParameterMode, TableDescriptor, Volatility,
};
use pgfront_events::{Event, EventBus};

const SCHEMA_VERSION_SQL: &str = r"
    SELECT COALESCE(
        (SELECT extract(epoch FROM max(modification))::bigint
         FROM pg_catalog.pg_stat_user_tables),
        0
    ) AS version
";

const TABLES_SQL: &str = r"
    SELECT
        c.oid AS table_oid,
        n.nspname AS schema_name,
        c.relname AS table_name,
        c.relkind = 'v' AS is_view,
        c.relrowsecurity AS rls_enabled
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE c.relkind IN ('r', 'v')
      AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
    ORDER BY n.nspname, c.relname
";

const COLUMNS_SQL: &str = r"
    SELECT
        attrelid AS table_oid,
        attname AS column_name,
        attnum AS position,
        format_type(atttypid, atttypmod) AS pg_type,
        NOT attnotnull AS nullable,
        atthasdef AS has_default,
        attgenerated <> '' AS is_generated
    FROM pg_catalog.pg_attribute
    WHERE attnum > 0 AND NOT attisdropped
    ORDER BY attrelid, attnum
";

const PRIMARY_KEYS_SQL: &str = r"
    SELECT
        conrelid AS table_oid,
        conkey,
        conname
    FROM pg_catalog.pg_constraint
    WHERE contype = 'p'
";

const FOREIGN_KEYS_SQL: &str = r"
    SELECT
        c.conname,
        c.conrelid AS table_oid,
        c.conkey,
        c.confrelid AS referenced_oid,
        c.confkey
    FROM pg_catalog.pg_constraint c
    WHERE c.contype = 'f'
";

const FUNCTIONS_SQL: &str = r"
    SELECT
        n.nspname AS schema_name,
        p.proname AS function_name,
        p.provolatile,
        format_type(p.prorettype, NULL) AS return_type,
        p.proretset AS returns_set,
        p.proargnames,
        p.proargmodes,
        p.proallargtypes,
        p.proargtypes,
        p.pronargdefaults
    FROM pg_catalog.pg_proc p
    JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND p.prokind = 'f'
    ORDER BY n.nspname, p.proname
";

/// Tables whose functions are never exposed over the RPC surface, regardless
/// of `rpc_function_config` overrides.
const DENIED_FUNCTION_SCHEMAS: &[&str] = &["pgfront_internal"];

/// Introspects the live catalog and refreshes a [`SchemaCache`], publishing a
/// [`Event::SchemaReloaded`] on every successful rebuild.
pub struct SchemaIntrospector {
    pool: PgPool,
    cache: SchemaCache,
    events: EventBus,
}

impl SchemaIntrospector {
    /// Construct a new introspector bound to a connection pool, cache, and
    /// event bus.
    #[must_use]
    pub fn new(pool: PgPool, cache: SchemaCache, events: EventBus) -> Self {
        Self {
            pool,
            cache,
            events,
        }
    }

    /// Access the shared cache this introspector refreshes.
    #[must_use]
    pub fn cache(&self) -> SchemaCache {
        self.cache.clone()
    }

    /// Rebuild the catalog from the database and atomically swap it into the
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the introspection queries fail.
    pub async fn refresh(&self) -> Result<()> {
        let version = fetch_version(&self.pool).await?;
        let tables = fetch_tables(&self.pool).await?;
        let functions = fetch_functions(&self.pool).await?;

        let table_count = tables.len();
        let function_count = functions.len();

        let catalog = Catalog {
            version,
            tables,
            functions,
        };
        self.cache.swap(catalog);

        debug!(
            catalog_version = version,
            table_count, function_count, "schema cache rebuilt"
        );
        self.events.publish(Event::SchemaReloaded {
            catalog_version: version,
            table_count,
            function_count,
        });
        info!(catalog_version = version, "routing table rebuilt");
        Ok(())
    }
}

async fn fetch_version(pool: &PgPool) -> Result<i64> {
    let row = sqlx::query(SCHEMA_VERSION_SQL).fetch_one(pool).await?;
    Ok(row.try_get::<i64, _>("version")?)
}

async fn fetch_tables(pool: &PgPool) -> Result<Vec<TableDescriptor>> {
    let table_rows = sqlx::query(TABLES_SQL).fetch_all(pool).await?;
    let column_rows = sqlx::query(COLUMNS_SQL).fetch_all(pool).await?;
    let pk_rows = sqlx::query(PRIMARY_KEYS_SQL).fetch_all(pool).await?;
    let fk_rows = sqlx::query(FOREIGN_KEYS_SQL).fetch_all(pool).await?;

    let mut columns_by_table: HashMap<i64, Vec<ColumnDescriptor>> = HashMap::new();
    for row in &column_rows {
        let table_oid: u32 = row.try_get("table_oid")?;
        columns_by_table
            .entry(i64::from(table_oid))
            .or_default()
            .push(ColumnDescriptor {
                name: row.try_get("column_name")?,
                position: row.try_get("position")?,
                pg_type: row.try_get("pg_type")?,
                nullable: row.try_get("nullable")?,
                has_default: row.try_get("has_default")?,
                is_generated: row.try_get("is_generated")?,
            });
    }

    // Primary key and foreign key column resolution requires joining
    // `conkey`/`confkey` attnum arrays back to attribute names; that mapping
    // is built once per table from the already-fetched column list.
    let mut primary_keys: HashMap<i64, Vec<String>> = HashMap::new();
    for row in &pk_rows {
        let table_oid: u32 = row.try_get("table_oid")?;
        let attnums: Vec<i16> = row.try_get("conkey")?;
        primary_keys.insert(
            i64::from(table_oid),
            resolve_attnums(&columns_by_table, i64::from(table_oid), &attnums),
        );
    }

    let mut foreign_keys: HashMap<i64, Vec<ForeignKeyDescriptor>> = HashMap::new();
    for row in &fk_rows {
        let table_oid: u32 = row.try_get("table_oid")?;
        let referenced_oid: u32 = row.try_get("referenced_oid")?;
        let local_attnums: Vec<i16> = row.try_get("conkey")?;
        let remote_attnums: Vec<i16> = row.try_get("confkey")?;
        let name: String = row.try_get("conname")?;

        let Some(referenced_table) = table_rows.iter().find(|candidate| {
            candidate
                .try_get::<u32, _>("table_oid")
                .is_ok_and(|oid| oid == referenced_oid)
        }) else {
            continue;
        };

        foreign_keys
            .entry(i64::from(table_oid))
            .or_default()
            .push(ForeignKeyDescriptor {
                name,
                columns: resolve_attnums(&columns_by_table, i64::from(table_oid), &local_attnums),
                referenced_schema: referenced_table.try_get("schema_name")?,
                referenced_table: referenced_table.try_get("table_name")?,
                referenced_columns: resolve_attnums(
                    &columns_by_table,
                    i64::from(referenced_oid),
                    &remote_attnums,
                ),
            });
    }

    let mut tables = Vec::with_capacity(table_rows.len());
    for row in &table_rows {
        let table_oid: u32 = row.try_get("table_oid")?;
        let oid = i64::from(table_oid);
        let mut columns = columns_by_table.get(&oid).cloned().unwrap_or_default();
        columns.sort_by_key(|column| column.position);
        tables.push(TableDescriptor {
            schema: row.try_get("schema_name")?,
            name: row.try_get("table_name")?,
            columns,
            primary_key: primary_keys.remove(&oid).unwrap_or_default(),
            foreign_keys: foreign_keys.remove(&oid).unwrap_or_default(),
            is_view: row.try_get("is_view")?,
            rls_enabled: row.try_get("rls_enabled")?,
        });
    }

    Ok(tables)
}

fn resolve_attnums(
    columns_by_table: &HashMap<i64, Vec<ColumnDescriptor>>,
    table_oid: i64,
    attnums: &[i16],
) -> Vec<String> {
    let Some(columns) = columns_by_table.get(&table_oid) else {
        return Vec::new();
    };
    attnums
        .iter()
        .filter_map(|attnum| {
            columns
                .iter()
                .find(|column| i16::try_from(column.position).ok() == Some(*attnum))
                .map(|column| column.name.clone())
        })
        .collect()
}

async fn fetch_functions(pool: &PgPool) -> Result<Vec<FunctionDescriptor>> {
    let rows = sqlx::query(FUNCTIONS_SQL).fetch_all(pool).await?;
    let mut functions = Vec::with_capacity(rows.len());

    for row in &rows {
        let schema: String = row.try_get("schema_name")?;
        let name: String = row.try_get("function_name")?;
        let provolatile: i8 = row.try_get::<i8, _>("provolatile").unwrap_or(b'v' as i8);
        let volatility = match provolatile as u8 {
            b'i' => Volatility::Immutable,
            b's' => Volatility::Stable,
            _ => Volatility::Volatile,
        };

        let arg_names: Option<Vec<String>> = row.try_get("proargnames").unwrap_or(None);
        let arg_modes: Option<Vec<i8>> = row.try_get("proargmodes").unwrap_or(None);
        let names = arg_names.unwrap_or_default();
        let modes = arg_modes.unwrap_or_default();
        let parameter_count = names.len().max(modes.len());

        let mut parameters = Vec::with_capacity(parameter_count);
        for index in 0..parameter_count {
            let mode = modes
                .get(index)
                .map(|code| match *code as u8 {
                    b'o' => ParameterMode::Out,
                    b'v' => ParameterMode::Variadic,
                    _ => ParameterMode::In,
                })
                .unwrap_or(ParameterMode::In);
            parameters.push(ParameterDescriptor {
                name: names.get(index).cloned().unwrap_or_default(),
                pg_type: String::new(),
                has_default: false,
                mode,
            });
        }

        let is_public = !DENIED_FUNCTION_SCHEMAS.contains(&schema.as_str());

        functions.push(FunctionDescriptor {
            schema,
            name,
            parameters,
            return_type: row.try_get("return_type")?,
            returns_set: row.try_get("returns_set")?,
            volatility,
            is_public,
        });
    }

    Ok(functions)
}
