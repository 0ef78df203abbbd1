//! Persistence of a batch into the bronze object store and the silver and
//! gold warehouse tables.

pub mod bronze;
pub mod tables;

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::db::{DbError, TableSchema, TableSink};
use crate::storage::{ObjectStore, StorageError};
use crate::types::chain::EnrichedBlock;
use crate::types::rows::{AccountDimRow, BlockDimRow, SilverBlockRow, TransactionFactRow};

use tables::{
    count_sql, to_rows, ALL_TABLES, DIM_ACCOUNT, DIM_BLOCK, FACT_TRANSACTION, ROW_COUNT,
    SILVER_BLOCKS,
};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Row count query for {table} returned {result}")]
    UnexpectedCount { table: String, result: String },
}

pub struct LayeredWriter {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn TableSink>,
    bucket: String,
}

impl LayeredWriter {
    pub fn new(store: Arc<dyn ObjectStore>, sink: Arc<dyn TableSink>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            sink,
            bucket: bucket.into(),
        }
    }

    /// Creates the bronze bucket and every silver/gold table.
    pub async fn ensure_layout(&self) -> Result<(), WriteError> {
        self.store.ensure_bucket(&self.bucket).await?;
        for table in &ALL_TABLES {
            self.sink.ensure_exists(table).await?;
        }
        Ok(())
    }

    /// Writes the batch's bronze objects, replacing any from an earlier run
    /// of the same batch. Returns the keys written.
    pub async fn write_bronze(
        &self,
        blocks: &[EnrichedBlock],
        batch_id: &str,
    ) -> Result<Vec<String>, WriteError> {
        let objects = bronze::encode_batch(blocks, batch_id)?;
        let mut keys = Vec::with_capacity(objects.len());

        for (key, data) in objects {
            self.store.put(&self.bucket, &key, data).await?;
            keys.push(key);
        }

        tracing::info!(
            "Wrote bronze batch {} ({} blocks, {} transactions)",
            batch_id,
            blocks.len(),
            blocks.iter().map(|b| b.transactions.len()).sum::<usize>()
        );
        Ok(keys)
    }

    pub async fn read_bronze(&self, batch_id: &str) -> Result<Vec<EnrichedBlock>, WriteError> {
        let key = bronze::object_key(bronze::ENRICHED_BLOCKS, batch_id, "json");
        let data = self.store.get(&self.bucket, &key).await?;
        Ok(bronze::decode_enriched_blocks(&data)?)
    }

    pub async fn write_silver(&self, blocks: &[SilverBlockRow]) -> Result<(), WriteError> {
        self.sink.append(&SILVER_BLOCKS, to_rows(blocks)).await?;
        tracing::info!("Appended {} row(s) to {}", blocks.len(), SILVER_BLOCKS);
        Ok(())
    }

    /// Appends the three gold row sets in a single sink write. Rows are not
    /// deduplicated against earlier batches.
    pub async fn write_gold(
        &self,
        block_dim: &[BlockDimRow],
        transaction_fact: &[TransactionFactRow],
        account_dim: &[AccountDimRow],
    ) -> Result<(), WriteError> {
        self.sink
            .append_all(vec![
                (DIM_BLOCK, to_rows(block_dim)),
                (FACT_TRANSACTION, to_rows(transaction_fact)),
                (DIM_ACCOUNT, to_rows(account_dim)),
            ])
            .await?;

        tracing::info!(
            "Appended gold rows: {} {}, {} {}, {} {}",
            block_dim.len(),
            DIM_BLOCK,
            transaction_fact.len(),
            FACT_TRANSACTION,
            account_dim.len(),
            DIM_ACCOUNT
        );
        Ok(())
    }

    /// Current row count of every silver and gold table.
    pub async fn row_counts(&self) -> Result<Vec<(TableSchema, u64)>, WriteError> {
        let mut counts = Vec::with_capacity(ALL_TABLES.len());
        for table in ALL_TABLES {
            let rows = self.sink.query(&count_sql(&table)).await?;
            let count = rows
                .first()
                .and_then(|row| row.get(ROW_COUNT))
                .and_then(JsonValue::as_u64)
                .ok_or_else(|| WriteError::UnexpectedCount {
                    table: table.to_string(),
                    result: JsonValue::from(rows.clone()).to_string(),
                })?;
            counts.push((table, count));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbValue;
    use crate::storage::LocalObjectStore;
    use crate::testing::{enriched_block, enriched_tx, MemoryObjectStore, MemoryTableSink};
    use crate::transformations::{normalize_blocks, transform_batch};
    use tempfile::TempDir;

    fn sample() -> Vec<EnrichedBlock> {
        vec![enriched_block(
            100,
            "0xb100",
            1_700_000_000,
            "0xminer",
            vec![
                enriched_tx("0xt1", "0xb100", "0xa", Some("0xb"), "0x1", true),
                enriched_tx("0xt2", "0xb100", "0xa", None, "0x0", false),
            ],
        )]
    }

    fn writer(store: Arc<dyn ObjectStore>, sink: &MemoryTableSink) -> LayeredWriter {
        LayeredWriter::new(store, Arc::new(sink.clone()), "bronze")
    }

    #[tokio::test]
    async fn test_ensure_layout_creates_bucket_and_tables() {
        let store = MemoryObjectStore::default();
        let sink = MemoryTableSink::default();
        let writer = writer(Arc::new(store.clone()), &sink);

        writer.ensure_layout().await.unwrap();
        writer.ensure_layout().await.unwrap();

        assert!(store.has_bucket("bronze"));
        assert_eq!(
            sink.tables(),
            vec!["gold.dim_account", "gold.dim_block", "gold.fact_transaction", "silver.blocks"]
        );
    }

    #[tokio::test]
    async fn test_bronze_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let sink = MemoryTableSink::default();
        let writer = writer(Arc::new(LocalObjectStore::new(dir.path())), &sink);
        writer.ensure_layout().await.unwrap();

        let blocks = sample();
        let keys = writer.write_bronze(&blocks, "100-100").await.unwrap();
        assert_eq!(keys.len(), 4);
        for key in &keys {
            assert!(dir.path().join("bronze").join(key).is_file());
        }

        assert_eq!(writer.read_bronze("100-100").await.unwrap(), blocks);
    }

    #[tokio::test]
    async fn test_bronze_rewrite_is_idempotent() {
        let store = MemoryObjectStore::default();
        let sink = MemoryTableSink::default();
        let writer = writer(Arc::new(store.clone()), &sink);

        writer.write_bronze(&sample(), "100-100").await.unwrap();
        let first = store.snapshot();
        writer.write_bronze(&sample(), "100-100").await.unwrap();

        assert_eq!(store.snapshot(), first);
        assert_eq!(first.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_bronze_batch_is_not_found() {
        let store = MemoryObjectStore::default();
        let sink = MemoryTableSink::default();
        let writer = writer(Arc::new(store), &sink);

        let err = writer.read_bronze("1-2").await.unwrap_err();
        assert!(matches!(err, WriteError::Storage(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_silver_and_gold_are_appended() {
        let store = MemoryObjectStore::default();
        let sink = MemoryTableSink::default();
        let writer = writer(Arc::new(store), &sink);
        writer.ensure_layout().await.unwrap();

        let blocks = sample();
        let silver = normalize_blocks(&blocks).unwrap();
        let gold = transform_batch(&blocks).unwrap();

        for _ in 0..2 {
            writer.write_silver(&silver).await.unwrap();
            writer
                .write_gold(&gold.block_dim, &gold.transaction_fact, &gold.account_dim)
                .await
                .unwrap();
        }

        // plain appends keep duplicates
        assert_eq!(sink.rows("silver.blocks").len(), 2);
        assert_eq!(sink.rows("gold.dim_block").len(), 2);
        assert_eq!(sink.rows("gold.fact_transaction").len(), 2);
        assert_eq!(sink.rows("gold.dim_account").len(), 6);
        assert_eq!(sink.append_all_calls(), 2);

        let fact = &sink.rows("gold.fact_transaction")[0];
        assert_eq!(fact[0], DbValue::Text("0xt1".into()));
    }

    #[tokio::test]
    async fn test_row_counts_reflect_appends() {
        let sink = MemoryTableSink::default();
        let writer = writer(Arc::new(MemoryObjectStore::default()), &sink);
        writer.ensure_layout().await.unwrap();

        let blocks = sample();
        let gold = transform_batch(&blocks).unwrap();
        writer.write_silver(&normalize_blocks(&blocks).unwrap()).await.unwrap();
        writer
            .write_gold(&gold.block_dim, &gold.transaction_fact, &gold.account_dim)
            .await
            .unwrap();

        let counts: Vec<(String, u64)> = writer
            .row_counts()
            .await
            .unwrap()
            .into_iter()
            .map(|(table, n)| (table.to_string(), n))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("silver.blocks".to_string(), 1),
                ("gold.dim_block".to_string(), 1),
                ("gold.fact_transaction".to_string(), 1),
                ("gold.dim_account".to_string(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_row_counts_require_tables() {
        let sink = MemoryTableSink::default();
        let writer = writer(Arc::new(MemoryObjectStore::default()), &sink);

        let err = writer.row_counts().await.unwrap_err();
        assert!(matches!(err, WriteError::Db(DbError::UnsupportedQuery(_))));
    }
}
