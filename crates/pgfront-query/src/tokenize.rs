//! Low-level string splitting helpers shared by the filter and select
//! parsers. Every split here is bracket-aware so that nested `and(...)`/
//! `or(...)` groups, nested `select=` projections, and `[<floats>]` vector
//! literals don't get cut in half by a comma that belongs to an inner group.

use crate::error::{Result, TranslatorError};

/// Split `input` on top-level occurrences of `sep`, treating `(` / `)` and
/// `[` / `]` as nesting delimiters. A `sep` inside either kind of bracket is
/// not a split point.
pub(crate) fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for ch in input.chars() {
        match ch {
            '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Strip one balanced pair of enclosing parentheses from `input`.
///
/// # Errors
///
/// Returns [`TranslatorError::MalformedGroup`] if `input` is not fully
/// wrapped in a single balanced `(...)` pair.
pub(crate) fn strip_parens(input: &str) -> Result<&str> {
    let trimmed = input.trim();
    if !trimmed.starts_with('(') || !trimmed.ends_with(')') || trimmed.len() < 2 {
        return Err(TranslatorError::MalformedGroup(format!(
            "expected a parenthesized group, got `{trimmed}`"
        )));
    }
    let inner = &trimmed[1..trimmed.len() - 1];

    let mut depth = 0i32;
    for (index, ch) in inner.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(TranslatorError::MalformedGroup(format!(
                        "unbalanced parentheses at byte {index} in `{trimmed}`"
                    )));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TranslatorError::MalformedGroup(format!(
            "unbalanced parentheses in `{trimmed}`"
        )));
    }
    Ok(inner)
}

/// Split `input` on the first occurrence of `sep`, returning `(before,
/// after)`. Returns `None` if `sep` does not occur.
pub(crate) fn split_first(input: &str, sep: char) -> Option<(&str, &str)> {
    input.split_once(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_commas() {
        assert_eq!(split_top_level("a,b,c", ','), vec!["a", "b", "c"]);
    }

    #[test]
    fn keeps_nested_groups_intact() {
        assert_eq!(
            split_top_level("or(a.eq.1,b.eq.2),c.eq.3", ','),
            vec!["or(a.eq.1,b.eq.2)", "c.eq.3"]
        );
    }

    #[test]
    fn keeps_bracketed_vector_literals_intact() {
        assert_eq!(
            split_top_level("embedding.vec_cos.[0.1,0.2,0.3],name.asc", ','),
            vec!["embedding.vec_cos.[0.1,0.2,0.3]", "name.asc"]
        );
    }

    #[test]
    fn strip_parens_rejects_unwrapped_input() {
        assert!(strip_parens("a,b").is_err());
    }

    #[test]
    fn strip_parens_rejects_unbalanced_input() {
        assert!(strip_parens("(a,(b)").is_err());
    }

    #[test]
    fn strip_parens_accepts_nested_groups() {
        assert_eq!(strip_parens("(or(a.eq.1,b.eq.2),c.eq.3)").unwrap(), "or(a.eq.1,b.eq.2),c.eq.3");
    }
}
