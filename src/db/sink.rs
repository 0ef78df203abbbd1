//! The warehouse table interface and its Postgres implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::error::DbError;
use super::pool::DbPool;
use super::schema::TableSchema;
use super::types::{DbOperation, Row};

#[async_trait]
pub trait TableSink: Send + Sync {
    /// Creates the table (and its schema) if absent.
    async fn ensure_exists(&self, table: &TableSchema) -> Result<(), DbError>;

    async fn append(&self, table: &TableSchema, rows: Vec<Row>) -> Result<(), DbError>;

    /// Appends to several tables as one unit where the sink supports it.
    async fn append_all(&self, writes: Vec<(TableSchema, Vec<Row>)>) -> Result<(), DbError> {
        for (table, rows) in writes {
            self.append(&table, rows).await?;
        }
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<JsonValue>, DbError>;
}

/// How appended rows treat an existing row with the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Plain INSERT; duplicates across batches are kept.
    #[default]
    Append,
    /// Tables get a primary key and rows are upserted on it.
    MergeOnKey,
}

pub struct PostgresTableSink {
    pool: DbPool,
    mode: WriteMode,
}

impl PostgresTableSink {
    pub fn new(pool: DbPool, mode: WriteMode) -> Self {
        Self { pool, mode }
    }

    pub async fn connect(database_url: &str, mode: WriteMode) -> Result<Self, DbError> {
        Ok(Self::new(DbPool::new(database_url).await?, mode))
    }
}

#[async_trait]
impl TableSink for PostgresTableSink {
    async fn ensure_exists(&self, table: &TableSchema) -> Result<(), DbError> {
        let sql = table.create_sql(self.mode == WriteMode::MergeOnKey);
        tracing::debug!("Ensuring table {}", table);
        self.pool.batch_execute(&sql).await
    }

    async fn append(&self, table: &TableSchema, rows: Vec<Row>) -> Result<(), DbError> {
        self.append_all(vec![(*table, rows)]).await
    }

    async fn append_all(&self, writes: Vec<(TableSchema, Vec<Row>)>) -> Result<(), DbError> {
        let mut operations = Vec::new();
        for (table, rows) in writes {
            let count = rows.len();
            operations.extend(row_operations(&table, rows, self.mode)?);
            tracing::debug!("Queued {} row(s) for {}", count, table);
        }
        self.pool.execute_transaction(operations).await
    }

    async fn query(&self, sql: &str) -> Result<Vec<JsonValue>, DbError> {
        self.pool.query_json(sql).await
    }
}

/// One INSERT or upsert per row, after checking each row's width.
pub(crate) fn row_operations(
    table: &TableSchema,
    rows: Vec<Row>,
    mode: WriteMode,
) -> Result<Vec<DbOperation>, DbError> {
    let columns = table.column_names();
    let conflict_columns: Vec<String> = table.key.iter().map(|k| k.to_string()).collect();
    let update_columns = table.value_columns();
    let qualified = table.qualified_name();

    rows.into_iter()
        .map(|values| {
            if values.len() != columns.len() {
                return Err(DbError::RowWidth {
                    table: table.to_string(),
                    expected: columns.len(),
                    actual: values.len(),
                });
            }
            Ok(match mode {
                WriteMode::MergeOnKey if !conflict_columns.is_empty() => DbOperation::Upsert {
                    table: qualified.clone(),
                    columns: columns.clone(),
                    values,
                    conflict_columns: conflict_columns.clone(),
                    update_columns: update_columns.clone(),
                },
                _ => DbOperation::Insert {
                    table: qualified.clone(),
                    columns: columns.clone(),
                    values,
                },
            })
        })
        .collect()
}
