//! Assembly of an [`EnrichedBlock`] from block, receipt and code lookups.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::decoding::decode_u64;
use crate::rpc::rpc::RpcError;
use crate::types::chain::{EnrichedBlock, EnrichedTransaction, RawBlock, RawReceipt};

/// The three node lookups enrichment needs.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// `eth_getBlockByNumber` with full transaction objects.
    async fn fetch_block(&self, number: u64) -> Result<RawBlock, RpcError>;

    /// `eth_getTransactionReceipt`; `None` when the node has no receipt.
    async fn fetch_receipt(&self, tx_hash: &str) -> Result<Option<RawReceipt>, RpcError>;

    /// `eth_getCode` at `latest`; `"0x"` for externally owned accounts.
    async fn fetch_code(&self, address: &str) -> Result<String, RpcError>;
}

/// Bounded fan-out for the receipt and code lookups of one block.
#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    pub concurrency: usize,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Fetches block `number` and annotates every transaction with its receipt
/// and the bytecode of its participants.
///
/// Each distinct address is looked up once per call. Any failed lookup
/// fails the whole block; results keep the block's transaction order
/// regardless of `options.concurrency`.
pub async fn fetch_enriched_block<C>(
    client: &C,
    number: u64,
    options: EnrichOptions,
) -> Result<EnrichedBlock, RpcError>
where
    C: ChainRpc + ?Sized,
{
    let block = client.fetch_block(number).await?;

    let returned = decode_u64(&block.number)?;
    if returned != number {
        return Err(RpcError::UnexpectedBlock {
            requested: number,
            returned,
        });
    }

    let concurrency = options.concurrency.max(1);

    let receipts: Vec<Option<RawReceipt>> = stream::iter(&block.transactions)
        .map(|tx| client.fetch_receipt(&tx.hash))
        .buffered(concurrency)
        .try_collect()
        .await?;

    let mut addresses: Vec<&str> = Vec::new();
    for tx in &block.transactions {
        for address in std::iter::once(tx.from.as_str()).chain(tx.to.as_deref()) {
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }
    }

    let codes: Vec<String> = stream::iter(addresses.iter().copied())
        .map(|address| client.fetch_code(address))
        .buffered(concurrency)
        .try_collect()
        .await?;
    let code_by_address: HashMap<&str, String> = addresses.into_iter().zip(codes).collect();

    let lookup = |address: &str| -> String {
        code_by_address.get(address).cloned().unwrap_or_default()
    };

    let transactions: Vec<EnrichedTransaction> = block
        .transactions
        .iter()
        .zip(receipts)
        .map(|(tx, receipt)| EnrichedTransaction {
            hash: tx.hash.clone(),
            block_hash: tx.block_hash.clone().unwrap_or_else(|| block.hash.clone()),
            from: tx.from.clone(),
            to: tx.to.clone(),
            value: tx.value.clone(),
            gas_price: tx.gas_price.clone(),
            receipt,
            from_code: lookup(&tx.from),
            to_code: tx.to.as_deref().map(lookup),
            extra: tx.extra.clone(),
        })
        .collect();

    let enriched = EnrichedBlock {
        hash: block.hash,
        parent_hash: block.parent_hash,
        number,
        timestamp: block.timestamp,
        miner: block.miner,
        gas_limit: block.gas_limit,
        gas_used: block.gas_used,
        base_fee_per_gas: block.base_fee_per_gas,
        size: block.size,
        difficulty: block.difficulty,
        transactions,
        extra: block.extra,
    };

    let missing = enriched.missing_receipts();
    if missing > 0 {
        tracing::warn!(
            "Block {} has {} transaction(s) without a receipt",
            number,
            missing
        );
    }
    Ok(enriched)
}
