//! Batch orchestration: fetch a block range, land it in bronze, then derive
//! and append the silver and gold tables.

use std::sync::Arc;

use thiserror::Error;

use crate::db::TableSchema;
use crate::layers::{LayeredWriter, WriteError};
use crate::raw_data::{fetch_range, BlockRange, FetchError};
use crate::rpc::{with_retry, ChainRpc, EnrichOptions, RetryConfig};
use crate::transformations::{normalize_blocks, transform_batch, TransformError};
use crate::types::chain::EnrichedBlock;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Invalid batch id {0:?}, expected \"<start>-<end>\"")]
    InvalidBatchId(String),

    #[error("No RPC client configured; only replay is available")]
    NoClient,
}

/// Outcome of one processed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_id: String,
    pub blocks: usize,
    pub fact_rows: usize,
    pub account_rows: usize,
    /// Transactions left out of the fact table for lack of a receipt.
    pub skipped_transactions: usize,
}

/// Owns the handles of one run; they are released when the context drops.
pub struct PipelineContext {
    client: Option<Arc<dyn ChainRpc>>,
    writer: LayeredWriter,
    retry: RetryConfig,
    enrich: EnrichOptions,
    batch_size: u64,
}

impl PipelineContext {
    /// A context without a node connection can only `replay`.
    pub fn new(writer: LayeredWriter) -> Self {
        Self {
            client: None,
            writer,
            retry: RetryConfig::default(),
            enrich: EnrichOptions::default(),
            batch_size: 10,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn ChainRpc>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_enrich_options(mut self, options: EnrichOptions) -> Self {
        self.enrich = options;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Creates the bronze bucket and the warehouse tables.
    pub async fn prepare(&self) -> Result<(), PipelineError> {
        self.writer.ensure_layout().await?;
        Ok(())
    }

    /// Processes `[start, end]` in consecutive batches. A failed batch stops
    /// the run; batches already reported stay written.
    pub async fn run(&self, start: u64, end: u64) -> Result<Vec<BatchReport>, PipelineError> {
        let range = BlockRange::new(start, end)?;
        tracing::info!(
            "Processing blocks {} in {} batch(es) of up to {} blocks",
            range,
            range.chunk_count(self.batch_size),
            self.batch_size
        );

        let mut reports = Vec::new();
        for batch in range.chunks(self.batch_size) {
            reports.push(self.run_batch(batch).await?);
        }
        Ok(reports)
    }

    /// Fetches one batch (retrying the whole fetch on transient failures),
    /// writes bronze, then silver and gold.
    pub async fn run_batch(&self, range: BlockRange) -> Result<BatchReport, PipelineError> {
        let batch_id = range.batch_id();
        let client = self.client.as_deref().ok_or(PipelineError::NoClient)?;
        let options = self.enrich;

        let blocks = with_retry(&self.retry, &format!("fetch batch {}", batch_id), move || {
            fetch_range(client, range.start, range.end, options)
        })
        .await?;

        self.writer.write_bronze(&blocks, &batch_id).await?;
        self.load(&batch_id, &blocks).await
    }

    /// Re-derives silver and gold for a batch from its bronze replay blob,
    /// without contacting the node.
    pub async fn replay(&self, batch_id: &str) -> Result<BatchReport, PipelineError> {
        let range = BlockRange::parse_batch_id(batch_id)
            .ok_or_else(|| PipelineError::InvalidBatchId(batch_id.to_string()))?;
        let batch_id = range.batch_id();

        let blocks = self.writer.read_bronze(&batch_id).await?;
        tracing::info!("Replaying batch {} ({} blocks) from bronze", batch_id, blocks.len());
        self.load(&batch_id, &blocks).await
    }

    /// Row count of every warehouse table.
    pub async fn table_counts(&self) -> Result<Vec<(TableSchema, u64)>, PipelineError> {
        Ok(self.writer.row_counts().await?)
    }

    async fn load(&self, batch_id: &str, blocks: &[EnrichedBlock]) -> Result<BatchReport, PipelineError> {
        let silver = normalize_blocks(blocks)?;
        let gold = transform_batch(blocks)?;

        self.writer.write_silver(&silver).await?;
        self.writer
            .write_gold(&gold.block_dim, &gold.transaction_fact, &gold.account_dim)
            .await?;

        let report = BatchReport {
            batch_id: batch_id.to_string(),
            blocks: blocks.len(),
            fact_rows: gold.transaction_fact.len(),
            account_rows: gold.account_dim.len(),
            skipped_transactions: gold.skipped_transactions,
        };
        tracing::info!(
            "Batch {} complete: {} blocks, {} fact rows, {} accounts, {} skipped transactions",
            report.batch_id,
            report.blocks,
            report.fact_rows,
            report.account_rows,
            report.skipped_transactions
        );
        Ok(report)
    }
}
