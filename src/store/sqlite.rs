use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Row as _, Sqlite};

use crate::error::StoreError;

use super::schema::{ColumnType, TableSchema, all_tables, table_schema};
use super::{Filter, Row, TabularStore};

/// Tabular store backed by a SQLite database
///
/// Creates the metadata tables on open. Table and column names are checked
/// against the known schema before any SQL is built.
#[derive(Clone)]
pub struct SqliteTabularStore {
    pool: SqlitePool,
}

impl SqliteTabularStore {
    /// Open (or create) the database at `path`
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection: every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for table in all_tables() {
            for statement in table.ddl() {
                sqlx::query(&statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }
}

fn schema_for(table: &str) -> Result<&'static TableSchema, StoreError> {
    table_schema(table).ok_or_else(|| StoreError::UnknownTable(table.to_string()))
}

fn check_column(schema: &TableSchema, column: &str) -> Result<ColumnType, StoreError> {
    schema
        .column(column)
        .ok_or_else(|| StoreError::UnknownColumn {
            table: schema.name.to_string(),
            column: column.to_string(),
        })
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn decode_row(schema: &TableSchema, row: &SqliteRow) -> Result<Row, StoreError> {
    let mut decoded = Row::new();
    for (column, ty) in schema.columns {
        let value = match ty {
            ColumnType::Integer => row
                .try_get::<Option<i64>, _>(*column)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            ColumnType::Text => row
                .try_get::<Option<String>, _>(*column)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            ColumnType::Json => match row.try_get::<Option<String>, _>(*column)? {
                Some(text) => serde_json::from_str(&text)?,
                None => Value::Null,
            },
        };
        decoded.insert(column.to_string(), value);
    }
    Ok(decoded)
}

fn insert_sql(schema: &TableSchema, row: &Row) -> Result<String, StoreError> {
    if row.is_empty() {
        return Err(StoreError::InvalidRow {
            table: schema.name.to_string(),
            reason: "row has no columns".to_string(),
        });
    }
    for column in row.keys() {
        check_column(schema, column)?;
    }

    let columns: Vec<String> = row.keys().map(|c| format!("\"{c}\"")).collect();
    let placeholders = vec!["?"; row.len()].join(", ");
    Ok(format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        schema.name,
        columns.join(", "),
        placeholders
    ))
}

#[async_trait]
impl TabularStore for SqliteTabularStore {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let schema = schema_for(table)?;

        let columns: Vec<String> = schema
            .columns
            .iter()
            .map(|(c, _)| format!("\"{c}\""))
            .collect();
        let mut sql = format!("SELECT {} FROM \"{}\"", columns.join(", "), schema.name);

        let mut clauses = Vec::new();
        for (column, value) in filter.conditions() {
            check_column(schema, column)?;
            if value.is_null() {
                clauses.push(format!("\"{column}\" IS NULL"));
            } else {
                clauses.push(format!("\"{column}\" = ?"));
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut query = sqlx::query(&sql);
        for (_, value) in filter.conditions().iter().filter(|(_, v)| !v.is_null()) {
            query = bind_value(query, value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_row(schema, row)).collect()
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        let schema = schema_for(table)?;
        let mut tx = self.pool.begin().await?;

        for row in &rows {
            let sql = insert_sql(schema, row)?;
            let mut query = sqlx::query(&sql);
            for value in row.values() {
                query = bind_value(query, value);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, key: &str, row: Row) -> Result<(), StoreError> {
        let schema = schema_for(table)?;
        check_column(schema, key)?;
        let key_value = row.get(key).cloned().ok_or_else(|| StoreError::InvalidRow {
            table: table.to_string(),
            reason: format!("missing key column {key}"),
        })?;

        let updates: Vec<(&String, &Value)> = row.iter().filter(|(c, _)| *c != key).collect();
        for (column, _) in &updates {
            check_column(schema, column)?;
        }

        let mut tx = self.pool.begin().await?;

        let affected = if updates.is_empty() {
            let sql = format!(
                "SELECT COUNT(*) FROM \"{}\" WHERE \"{key}\" = ?",
                schema.name
            );
            let count: i64 = bind_value(sqlx::query(&sql), &key_value)
                .fetch_one(&mut *tx)
                .await?
                .try_get(0)?;
            count as u64
        } else {
            let assignments: Vec<String> =
                updates.iter().map(|(c, _)| format!("\"{c}\" = ?")).collect();
            let sql = format!(
                "UPDATE \"{}\" SET {} WHERE \"{key}\" = ?",
                schema.name,
                assignments.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for (_, value) in &updates {
                query = bind_value(query, value);
            }
            query = bind_value(query, &key_value);
            query.execute(&mut *tx).await?.rows_affected()
        };

        if affected == 0 {
            let sql = insert_sql(schema, &row)?;
            let mut query = sqlx::query(&sql);
            for value in row.values() {
                query = bind_value(query, value);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
