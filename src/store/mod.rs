//! Storage collaborators: an object store for audio blobs and a tabular
//! store for metadata rows.

mod fs;
mod gcs;
mod memory;
mod schema;
mod sqlite;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::http::ByteStream;

pub use fs::FsObjectStore;
pub use gcs::GcsObjectStore;
pub use memory::{MemoryObjectStore, MemoryTabularStore};
pub use schema::{ColumnType, TableSchema, table_schema};
pub use sqlite::SqliteTabularStore;

/// A metadata row: column name to JSON value
pub type Row = serde_json::Map<String, Value>;

/// Durable blob storage addressed by `(bucket, path)`
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `body` into `bucket/path`, replacing any existing object
    ///
    /// Returns the number of bytes written.
    async fn put(&self, bucket: &str, path: &str, body: ByteStream) -> Result<u64, StoreError>;

    /// Whether an object exists at `bucket/path`
    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StoreError>;
}

/// Row storage with equality lookups
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// All rows of `table` matching `filter`
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError>;

    /// Append rows to `table`
    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError>;

    /// Update the row whose `key` column equals `row[key]`, or insert it
    async fn upsert(&self, table: &str, key: &str, row: Row) -> Result<(), StoreError>;
}

/// Conjunction of column equality conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column == value`
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Whether `row` satisfies every condition; a missing column counts as null
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&row(json!({ "id": "a" }))));
    }

    #[test]
    fn filter_requires_all_conditions() {
        let filter = Filter::new().eq("showId", "s1").eq("originalAudioUrl", "u1");

        assert!(filter.matches(&row(json!({ "showId": "s1", "originalAudioUrl": "u1" }))));
        assert!(!filter.matches(&row(json!({ "showId": "s1", "originalAudioUrl": "u2" }))));
        assert!(!filter.matches(&row(json!({ "showId": "s1" }))));
    }

    #[test]
    fn missing_column_matches_null() {
        let filter = Filter::new().eq("audioId", Value::Null);
        assert!(filter.matches(&row(json!({ "id": "a" }))));
    }
}
