//! Whitelist of tables and columns that generated SQL may reference.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable table -> allowed-column map.
///
/// Ordered maps keep the schema description embedded in generator prompts
/// stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhitelistSchema {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl WhitelistSchema {
    pub fn from_tables<T, C, I>(tables: I) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        I: IntoIterator<Item = (T, Vec<C>)>,
    {
        let tables = tables
            .into_iter()
            .map(|(table, columns)| {
                let columns = columns
                    .into_iter()
                    .map(|c| c.into().to_lowercase())
                    .collect();
                (table.into().to_lowercase(), columns)
            })
            .collect();
        Self { tables }
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(table)
    }

    pub fn is_column_allowed(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .map(|cols| cols.contains(column))
            .unwrap_or(false)
    }

    /// One `table(col, col, ...)` line per table, for prompt embedding.
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(|(table, cols)| {
                let cols: Vec<&str> = cols.iter().map(String::as_str).collect();
                format!("{}({})", table, cols.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for WhitelistSchema {
    fn default() -> Self {
        Self::from_tables([
            (
                "orders",
                vec![
                    "id",
                    "order_number",
                    "customer_id",
                    "amount",
                    "total_price",
                    "status",
                    "created_at",
                ],
            ),
            (
                "customers",
                vec!["id", "first_name", "last_name", "email", "phone", "created_at"],
            ),
            (
                "products",
                vec![
                    "id",
                    "title",
                    "sku",
                    "price",
                    "inventory_quantity",
                    "status",
                    "created_at",
                ],
            ),
            (
                "order_items",
                vec!["id", "order_id", "product_id", "quantity", "price"],
            ),
        ])
    }
}
