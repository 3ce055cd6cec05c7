//! Where the schema adapter reads related rows from.

use crate::config::EntitySchema;
use crate::error::ApiError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One row as column name to JSON value.
pub type Row = Map<String, Value>;

#[async_trait]
pub trait RowSource: Send + Sync {
    /// Rows of `entity` whose `column` is one of `values`.
    async fn rows_where_in(&self, entity: &EntitySchema, column: &str, values: &[Value]) -> Result<Vec<Row>, ApiError>;

    /// `(local, remote)` pairs of a link table for the given local ids.
    async fn links(
        &self,
        link_table: &str,
        local_column: &str,
        remote_column: &str,
        local_ids: &[Value],
    ) -> Result<Vec<(Value, Value)>, ApiError>;

    async fn exists(&self, entity: &EntitySchema, id: &Value) -> Result<bool, ApiError>;
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;

    /// Tables and link tables held in memory.
    #[derive(Default)]
    pub struct MemorySource {
        pub tables: HashMap<String, Vec<Row>>,
        pub links: HashMap<String, Vec<Row>>,
    }

    impl MemorySource {
        pub fn insert(&mut self, table: &str, row: Value) {
            if let Value::Object(map) = row {
                self.tables.entry(table.to_string()).or_default().push(map);
            }
        }

        pub fn link(&mut self, link_table: &str, row: Value) {
            if let Value::Object(map) = row {
                self.links.entry(link_table.to_string()).or_default().push(map);
            }
        }
    }

    #[async_trait]
    impl RowSource for MemorySource {
        async fn rows_where_in(&self, entity: &EntitySchema, column: &str, values: &[Value]) -> Result<Vec<Row>, ApiError> {
            Ok(self
                .tables
                .get(&entity.table)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| r.get(column).map_or(false, |v| values.contains(v)))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn links(
            &self,
            link_table: &str,
            local_column: &str,
            remote_column: &str,
            local_ids: &[Value],
        ) -> Result<Vec<(Value, Value)>, ApiError> {
            Ok(self
                .links
                .get(link_table)
                .map(|rows| {
                    rows.iter()
                        .filter_map(|r| Some((r.get(local_column)?.clone(), r.get(remote_column)?.clone())))
                        .filter(|(l, _)| local_ids.contains(l))
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn exists(&self, entity: &EntitySchema, id: &Value) -> Result<bool, ApiError> {
            Ok(self
                .tables
                .get(&entity.table)
                .map_or(false, |rows| rows.iter().any(|r| r.get(&entity.pk) == Some(id))))
        }
    }
}
