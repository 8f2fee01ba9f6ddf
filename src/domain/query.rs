use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque requester id (phone number or user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value bound to the `$1` placeholder of identity-scoped queries.
    ///
    /// Numeric ids (a leading `+` is dropped) bind as integers so they compare
    /// against integer key columns; anything else binds as text.
    pub fn as_param(&self) -> serde_json::Value {
        let digits = self.0.strip_prefix('+').unwrap_or(&self.0);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = digits.parse::<i64>() {
                return serde_json::Value::from(n);
            }
        }
        serde_json::Value::String(self.0.clone())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::new(value)
    }
}

/// SQL plus the positional values for its `$n` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub params: Vec<serde_json::Value>,
}

impl GeneratedQuery {
    pub fn new(sql: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Binds the identity only when the statement actually references `$1`.
    pub fn scoped_to(sql: impl Into<String>, identity: &Identity) -> Self {
        let sql = sql.into();
        let params = if references_first_placeholder(&sql) {
            vec![identity.as_param()]
        } else {
            Vec::new()
        };
        Self { sql, params }
    }
}

fn references_first_placeholder(sql: &str) -> bool {
    sql.match_indices("$1").any(|(idx, _)| {
        !sql[idx + 2..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub reason: String,
}

impl ValidationVerdict {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: "OK".to_string(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Where the executed SQL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuerySource {
    Cache,
    Pattern,
    Generator,
    Fallback,
}

impl fmt::Display for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuerySource::Cache => "cache",
            QuerySource::Pattern => "pattern",
            QuerySource::Generator => "generator",
            QuerySource::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Rows as returned by the store, in store order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
