use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::error::StoreError;
use crate::http::ByteStream;

use super::{Filter, ObjectStore, Row, TabularStore};

/// In-process object store, mostly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.lock()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths stored in `bucket`, sorted
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Bytes>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, path: &str, mut body: ByteStream) -> Result<u64, StoreError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(StoreError::Body)?);
        }

        let size = buffer.len() as u64;
        self.lock()
            .insert((bucket.to_string(), path.to_string()), buffer.freeze());
        Ok(size)
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .contains_key(&(bucket.to_string(), path.to_string())))
    }
}

/// In-process tabular store, mostly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryTabularStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryTabularStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of `table`, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().get(table).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Row>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TabularStore for MemoryTabularStore {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .lock()
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        self.lock().entry(table.to_string()).or_default().extend(rows);
        Ok(())
    }

    async fn upsert(&self, table: &str, key: &str, row: Row) -> Result<(), StoreError> {
        let key_value = row.get(key).cloned().ok_or_else(|| StoreError::InvalidRow {
            table: table.to_string(),
            reason: format!("missing key column {key}"),
        })?;

        let mut tables = self.lock();
        let rows = tables.entry(table.to_string()).or_default();
        match rows.iter_mut().find(|r| r.get(key) == Some(&key_value)) {
            Some(existing) => existing.extend(row),
            None => rows.push(row),
        }
        Ok(())
    }
}
