//! Typed access to the metadata tables.
//!
//! Rows are the serde serialization of the [`crate::model`] structs, so the
//! writer only decides which table, which key and in which order.

mod episode;
mod show;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{Row, TabularStore};

/// Reads and writes shows, episodes and audio rows
#[derive(Clone)]
pub struct MetadataWriter {
    store: Arc<dyn TabularStore>,
}

impl MetadataWriter {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TabularStore> {
        &self.store
    }
}

fn to_row<T: Serialize>(table: &str, value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::InvalidRow {
            table: table.to_string(),
            reason: format!("expected an object, got {other}"),
        }),
    }
}

fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}
