//! Star-schema derivation: block dimension, transaction fact and account
//! dimension rows from one batch of enriched blocks.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::decoding::{
    decode_fixed_point, decode_opt_int, decode_timestamp, decode_u64, WEI_DECIMALS,
};
use crate::types::chain::{EnrichedBlock, EnrichedTransaction};
use crate::types::rows::{AccountDimRow, BlockDimRow, TransactionFactRow};

use super::error::TransformError;

/// The three gold row sets of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionalBatch {
    pub block_dim: Vec<BlockDimRow>,
    pub transaction_fact: Vec<TransactionFactRow>,
    pub account_dim: Vec<AccountDimRow>,
    /// Transactions left out of the fact table because they had no receipt.
    pub skipped_transactions: usize,
}

impl DimensionalBatch {
    pub fn is_empty(&self) -> bool {
        self.block_dim.is_empty() && self.transaction_fact.is_empty() && self.account_dim.is_empty()
    }
}

/// Derives the gold row sets for `blocks`.
///
/// Account first/last-seen bounds are the batch's minimum and maximum block
/// timestamps, not the address's own first and last appearance.
pub fn transform_batch(blocks: &[EnrichedBlock]) -> Result<DimensionalBatch, TransformError> {
    if blocks.is_empty() {
        return Ok(DimensionalBatch::default());
    }

    let timestamps = blocks
        .iter()
        .map(|block| {
            decode_timestamp(&block.timestamp)
                .map_err(TransformError::decode(block.number, "timestamp"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut batch = DimensionalBatch::default();

    for (block, timestamp) in blocks.iter().zip(&timestamps) {
        batch.block_dim.push(block_row(block, *timestamp)?);

        for tx in &block.transactions {
            match fact_row(block, tx)? {
                Some(row) => batch.transaction_fact.push(row),
                None => batch.skipped_transactions += 1,
            }
        }
    }

    // non-empty batch, so both bounds exist
    let first_seen = timestamps.iter().min().copied().unwrap_or_default();
    let last_seen = timestamps.iter().max().copied().unwrap_or_default();
    batch.account_dim = account_rows(blocks, first_seen, last_seen);

    if batch.skipped_transactions > 0 {
        tracing::warn!(
            "Excluded {} transaction(s) without a receipt from the fact table (blocks {}-{})",
            batch.skipped_transactions,
            blocks[0].number,
            blocks[blocks.len() - 1].number
        );
    }

    Ok(batch)
}

fn block_row(block: &EnrichedBlock, timestamp: DateTime<Utc>) -> Result<BlockDimRow, TransformError> {
    Ok(BlockDimRow {
        block_key: block.hash.clone(),
        parent_block_hash: block.parent_hash.clone(),
        block_number: block.number,
        block_timestamp: timestamp,
        miner_account_key: block.miner.clone(),
        block_gas_limit: decode_u64(&block.gas_limit)
            .map_err(TransformError::decode(block.number, "gasLimit"))?,
    })
}

fn fact_row(
    block: &EnrichedBlock,
    tx: &EnrichedTransaction,
) -> Result<Option<TransactionFactRow>, TransformError> {
    let Some(receipt) = &tx.receipt else {
        return Ok(None);
    };
    let number = block.number;

    let transaction_status = receipt
        .status
        .as_deref()
        .map(decode_u64)
        .transpose()
        .map_err(TransformError::decode(number, "receipt.status"))?;

    Ok(Some(TransactionFactRow {
        transaction_hash_key: tx.hash.clone(),
        block_key: block.hash.clone(),
        from_account_key: tx.from.clone(),
        to_account_key: tx.to.clone(),
        transaction_value: decode_fixed_point(&tx.value, WEI_DECIMALS)
            .map_err(TransformError::decode(number, "value"))?,
        gas_used: decode_u64(&receipt.gas_used)
            .map_err(TransformError::decode(number, "receipt.gasUsed"))?,
        gas_price: decode_opt_int(tx.gas_price.as_deref())
            .map_err(TransformError::decode(number, "gasPrice"))?,
        transaction_status,
        block_number: number,
    }))
}

/// Distinct miners, senders and recipients in first-appearance order.
fn account_rows(
    blocks: &[EnrichedBlock],
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
) -> Vec<AccountDimRow> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut rows = Vec::new();

    let participants = blocks.iter().flat_map(|block| {
        std::iter::once(block.miner.as_str()).chain(
            block
                .transactions
                .iter()
                .flat_map(|tx| std::iter::once(tx.from.as_str()).chain(tx.to.as_deref())),
        )
    });

    for address in participants {
        if seen.insert(address) {
            rows.push(AccountDimRow {
                account_key: address.to_string(),
                account_address: address.to_string(),
                is_contract: None,
                first_seen_timestamp: first_seen,
                last_seen_timestamp: last_seen,
            });
        }
    }

    rows
}
