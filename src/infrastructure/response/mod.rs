//! Cleanup of raw generator output into a single compact SQL statement.
//!
//! The result is still untrusted; it only removes formatting so the validator
//! sees exactly what would be executed.

use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static CODE_FENCE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z0-9_-]*").unwrap());

/// Whole-word SELECT, or a WITH that opens a CTE (`with name as (`), so a
/// prose "With the given schema" is not taken for a statement.
static STATEMENT_START_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:select\b|with\s+(?:recursive\s+)?[a-z_][a-z0-9_]*\s+as\s*\()").unwrap()
});

static LEADING_WRITE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(insert|update|delete|drop|alter|truncate|create|grant|revoke|merge|copy)\b")
        .unwrap()
});

static WHITESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strips fences and inline backticks, then extracts the first SELECT/WITH
/// statement up to `;` or end of text, collapsed to single spaces.
///
/// Text with no SELECT/WITH, or text that itself opens with a write verb, is
/// returned collapsed but otherwise unchanged, so the validator can reject it
/// with a concrete reason.
pub fn clean_sql_response(raw: &str) -> String {
    let unfenced = THINK_TAG_PATTERN.replace_all(raw, " ");
    let unfenced = CODE_FENCE_PATTERN.replace_all(&unfenced, " ");
    let unfenced = unfenced.replace('`', "");

    let start = if LEADING_WRITE_PATTERN.is_match(&unfenced) {
        None
    } else {
        STATEMENT_START_PATTERN.find(&unfenced).map(|m| m.start())
    };

    let statement = match start {
        Some(start) => {
            let rest = &unfenced[start..];
            match rest.find(';') {
                Some(end) => &rest[..end],
                None => rest,
            }
        }
        None => unfenced.as_str(),
    };

    collapse_whitespace(statement)
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_PATTERN.replace_all(text.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_code_fence() {
        let raw = "```sql\nSELECT id,\n  title\nFROM products\n```";
        assert_eq!(clean_sql_response(raw), "SELECT id, title FROM products");
    }

    #[test]
    fn test_strips_inline_backticks() {
        assert_eq!(
            clean_sql_response("`SELECT * FROM orders`"),
            "SELECT * FROM orders"
        );
    }

    #[test]
    fn test_extracts_first_statement_only() {
        let raw = "SELECT * FROM orders; DROP TABLE orders;";
        assert_eq!(clean_sql_response(raw), "SELECT * FROM orders");
    }

    #[test]
    fn test_skips_leading_prose() {
        let raw = "Here is the query you asked for:\nselect id from orders where customer_id = $1;\nHope it helps";
        assert_eq!(
            clean_sql_response(raw),
            "select id from orders where customer_id = $1"
        );
    }

    #[test]
    fn test_with_statement_is_extracted() {
        let raw = "```\nWITH t AS (SELECT id FROM orders)\nSELECT id FROM t\n```";
        assert_eq!(
            clean_sql_response(raw),
            "WITH t AS (SELECT id FROM orders) SELECT id FROM t"
        );
    }

    #[test]
    fn test_non_select_text_is_returned_collapsed() {
        assert_eq!(clean_sql_response("DROP   TABLE\norders"), "DROP TABLE orders");
    }

    #[test]
    fn test_prose_mentioning_write_verbs_is_skipped() {
        let raw = "This query does not update anything:\nSELECT id FROM orders WHERE customer_id = $1";
        assert_eq!(
            clean_sql_response(raw),
            "SELECT id FROM orders WHERE customer_id = $1"
        );
    }

    #[test]
    fn test_leading_comment_line_is_skipped() {
        let raw = "-- read only, no delete\nSELECT id FROM orders WHERE customer_id = $1";
        assert_eq!(
            clean_sql_response(raw),
            "SELECT id FROM orders WHERE customer_id = $1"
        );
    }

    #[test]
    fn test_prose_starting_with_with_is_not_a_statement() {
        let raw = "With the given schema, the query is:\nSELECT id FROM orders";
        assert_eq!(clean_sql_response(raw), "SELECT id FROM orders");
    }

    #[test]
    fn test_outer_select_wins_over_subquery() {
        let raw = "Query: SELECT id FROM orders WHERE id IN (\nSELECT order_id FROM order_items)";
        assert_eq!(
            clean_sql_response(raw),
            "SELECT id FROM orders WHERE id IN ( SELECT order_id FROM order_items)"
        );
    }

    #[test]
    fn test_leading_write_statement_is_returned_unchanged() {
        let raw = "DELETE FROM orders WHERE id IN (\nSELECT id FROM orders)";
        assert_eq!(
            clean_sql_response(raw),
            "DELETE FROM orders WHERE id IN ( SELECT id FROM orders)"
        );
    }

    #[test]
    fn test_removes_think_block() {
        let raw = "<think>select the best table</think>\nSELECT * FROM products";
        assert_eq!(clean_sql_response(raw), "SELECT * FROM products");
    }
}
