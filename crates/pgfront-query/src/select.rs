//! `select=` projection tree parsing.
//!
//! Grammar (informal): a comma-separated list of items, each either a plain
//! column (`name`), a renamed column (`alias:name`), the wildcard (`*`), or
//! a nested relation (`comments(id,body)`, `author:comments!author_fk(id)`).
//! Relation resolution against the catalog's foreign keys happens in
//! `emit`, not here.

use crate::error::{Result, TranslatorError};
use crate::tokenize::split_top_level;

/// One item of a `select=` projection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`: every column of the current relation.
    Star,
    /// A single column, optionally renamed.
    Column {
        /// Underlying column name.
        name: String,
        /// Output key, if renamed via `alias:name`.
        alias: Option<String>,
    },
    /// A nested relation projection, resolved against a foreign key.
    Relation {
        /// Name of the related table as written in the request.
        relation: String,
        /// Output key, if renamed via `alias:relation(...)`.
        alias: Option<String>,
        /// Explicit foreign key name (`relation!fk_name(...)`), used to
        /// disambiguate when more than one foreign key could match.
        fk_hint: Option<String>,
        /// Nested projection for the related rows.
        columns: Vec<SelectItem>,
    },
}

/// Parse a full `select=` value into a projection tree.
///
/// # Errors
///
/// Returns [`TranslatorError::MalformedGroup`] for unbalanced parentheses.
pub(crate) fn parse_select(raw: &str) -> Result<Vec<SelectItem>> {
    split_top_level(raw, ',')
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .map(|item| parse_item(&item))
        .collect()
}

fn parse_item(item: &str) -> Result<SelectItem> {
    let paren_pos = item.find('(');
    let colon_pos = item.find(':');
    let (alias, rest) = match (colon_pos, paren_pos) {
        (Some(colon), paren) if paren.is_none_or(|paren| colon < paren) => {
            let (alias, rest) = item.split_at(colon);
            (Some(alias.trim().to_string()), rest[1..].trim())
        }
        _ => (None, item),
    };

    if rest == "*" {
        return Ok(SelectItem::Star);
    }

    if let Some(open) = rest.find('(') {
        if !rest.ends_with(')') {
            return Err(TranslatorError::MalformedGroup(format!(
                "unbalanced parentheses in select item `{item}`"
            )));
        }
        let head = &rest[..open];
        let body = &rest[open + 1..rest.len() - 1];
        let (relation, fk_hint) = match head.split_once('!') {
            Some((relation, hint)) => (relation.to_string(), Some(hint.to_string())),
            None => (head.to_string(), None),
        };
        let columns = parse_select(body)?;
        return Ok(SelectItem::Relation {
            relation,
            alias,
            fk_hint,
            columns,
        });
    }

    Ok(SelectItem::Column {
        name: rest.to_string(),
        alias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_columns() {
        let items = parse_select("id,title").unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], SelectItem::Column { name, alias } if name == "id" && alias.is_none()));
    }

    #[test]
    fn parses_wildcard() {
        assert_eq!(parse_select("*").unwrap(), vec![SelectItem::Star]);
    }

    #[test]
    fn parses_renamed_column() {
        let items = parse_select("full_name:name").unwrap();
        assert!(matches!(
            &items[0],
            SelectItem::Column { name, alias }
            if name == "name" && alias.as_deref() == Some("full_name")
        ));
    }

    #[test]
    fn parses_nested_relation() {
        let items = parse_select("id,comments(id,body)").unwrap();
        match &items[1] {
            SelectItem::Relation { relation, columns, .. } => {
                assert_eq!(relation, "comments");
                assert_eq!(columns.len(), 2);
            }
            other => panic!("expected Relation, got {other:?}"),
        }
    }

    #[test]
    fn parses_relation_with_fk_hint_and_alias() {
        let items = parse_select("author:comments!author_fk(id)").unwrap();
        match &items[0] {
            SelectItem::Relation {
                relation,
                alias,
                fk_hint,
                ..
            } => {
                assert_eq!(relation, "comments");
                assert_eq!(alias.as_deref(), Some("author"));
                assert_eq!(fk_hint.as_deref(), Some("author_fk"));
            }
            other => panic!("expected Relation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse_item("comments(id,body").is_err());
    }
}
