//! Allowlist Validator for generated SQL
//!
//! The last check before anything reaches the store. Rules, short-circuiting
//! on the first failure:
//! 1. Statement must be non-empty
//! 2. No statement separator (single statement only)
//! 3. Must start with SELECT
//! 4. Must reference at least one allowlisted table (whole word)
//! 5. Every selected column must belong to one of the referenced tables
//!
//! Checks are lexical. Subqueries, joins and expressions in the select list
//! are only inspected at the surface: the select list ends at the first
//! whole-word FROM, and expression columns are checked identifier by
//! identifier. The schema is the sole source of truth for what is permitted.

use crate::domain::query::ValidationVerdict;
use crate::domain::schema::WhitelistSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

pub const REASON_EMPTY: &str = "No SQL";
pub const REASON_MULTIPLE_STATEMENTS: &str = "Multiple statements or semicolon found";
pub const REASON_NOT_SELECT: &str = "Only SELECT allowed";
pub const REASON_NO_TABLE: &str = "No allowed table found";
pub const REASON_UNPARSEABLE_COLUMNS: &str = "Could not parse SELECT columns";

static SELECT_LIST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^select\s+(.+?)\s+from\b").unwrap());

static ALIAS_SUFFIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+as\s+[a-z_][a-z0-9_]*$").unwrap());

static PLAIN_COLUMN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*(\.[a-z_][a-z0-9_]*)*(\.\*)?$").unwrap());

static STRING_LITERAL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'").unwrap());

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)*)(\s*\()?").unwrap());

/// Words that may appear inside expression columns without naming a column.
static EXPRESSION_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "and", "as", "asc", "between", "bigint", "boolean", "by", "case", "current_date",
        "current_time", "current_timestamp", "date", "decimal", "desc", "distinct", "else", "end",
        "false", "filter", "from", "ilike", "in", "int", "integer", "interval", "is", "like",
        "not", "null", "nulls", "numeric", "or", "over", "partition", "text", "then", "timestamp",
        "timestamptz", "true", "varchar", "when", "where",
    ]
    .into_iter()
    .collect()
});

/// Functions an expression column may call. Any other call is reported as a
/// disallowed column.
static SAFE_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abs", "avg", "coalesce", "count", "date_trunc", "greatest", "least", "length", "lower",
        "max", "min", "nullif", "round", "sum", "to_char", "trim", "upper",
    ]
    .into_iter()
    .collect()
});

/// Allowlist validator for generated SQL
pub struct AllowlistValidator {
    schema: Arc<WhitelistSchema>,
    table_patterns: Vec<(String, Regex)>,
}

impl AllowlistValidator {
    pub fn new(schema: Arc<WhitelistSchema>) -> Self {
        let table_patterns = schema
            .table_names()
            .filter_map(|table| {
                Regex::new(&format!(r"\b{}\b", regex::escape(table)))
                    .ok()
                    .map(|re| (table.to_string(), re))
            })
            .collect();

        Self {
            schema,
            table_patterns,
        }
    }

    pub fn schema(&self) -> &WhitelistSchema {
        &self.schema
    }

    /// Validate a candidate statement. The verdict always carries a reason.
    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        let s = sql.trim().to_lowercase();

        if s.is_empty() {
            return ValidationVerdict::reject(REASON_EMPTY);
        }

        if s.contains(';') {
            return ValidationVerdict::reject(REASON_MULTIPLE_STATEMENTS);
        }

        if !s.starts_with("select") {
            return ValidationVerdict::reject(REASON_NOT_SELECT);
        }

        let used_tables = self.referenced_tables(&s);
        if used_tables.is_empty() {
            return ValidationVerdict::reject(REASON_NO_TABLE);
        }

        let Some(select_list) = SELECT_LIST_PATTERN
            .captures(&s)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            return ValidationVerdict::reject(REASON_UNPARSEABLE_COLUMNS);
        };

        for token in split_top_level(select_list) {
            for column in columns_in_token(&token) {
                if column == "*" {
                    continue;
                }
                let allowed = used_tables
                    .iter()
                    .any(|table| self.schema.is_column_allowed(table, &column));
                if !allowed {
                    return ValidationVerdict::reject(format!("Column {} not in whitelist", column));
                }
            }
        }

        ValidationVerdict::ok()
    }

    /// Allowlisted tables named anywhere in the (lower-cased) statement.
    fn referenced_tables(&self, sql_lower: &str) -> Vec<&str> {
        self.table_patterns
            .iter()
            .filter(|(_, re)| re.is_match(sql_lower))
            .map(|(table, _)| table.as_str())
            .collect()
    }
}

/// Splits the select list on commas that are not nested in parentheses or
/// string literals.
fn split_top_level(select_list: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;

    for c in select_list.chars() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                tokens.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    tokens.push(current);
    tokens
}

/// Bare column names a single select-list token refers to.
fn columns_in_token(token: &str) -> Vec<String> {
    let unquoted: String = token.chars().filter(|c| *c != '"' && *c != '`').collect();
    let trimmed = unquoted.trim();
    let expr = ALIAS_SUFFIX_PATTERN.replace(trimmed, "");
    let expr = expr.trim();

    if expr == "*" {
        return vec!["*".to_string()];
    }

    if expr.is_empty() || PLAIN_COLUMN_PATTERN.is_match(expr) {
        let bare = expr.rsplit('.').next().unwrap_or(expr);
        return vec![bare.to_string()];
    }

    let without_literals = STRING_LITERAL_PATTERN.replace_all(expr, "''");
    let mut columns = Vec::new();
    for caps in IDENTIFIER_PATTERN.captures_iter(&without_literals) {
        let Some(ident) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if EXPRESSION_KEYWORDS.contains(ident) {
            continue;
        }
        if caps.get(2).is_some() {
            if !SAFE_FUNCTIONS.contains(ident) {
                columns.push(format!("{}()", ident));
            }
            continue;
        }
        columns.push(ident.rsplit('.').next().unwrap_or(ident).to_string());
    }
    columns
}
