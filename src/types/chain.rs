//! Wire-level block, transaction and receipt shapes, and the enriched
//! block assembled from them.
//!
//! Quantities stay as the hex strings the node returned; decoding happens in
//! the silver/gold transforms so bronze keeps the raw representation. Fields
//! the transforms do not read are carried verbatim in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of `eth_getBlockByNumber(n, true)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub hash: String,
    pub parent_hash: String,
    pub number: String,
    pub timestamp: String,
    pub miner: String,
    pub gas_limit: String,
    pub gas_used: String,
    #[serde(default)]
    pub base_fee_per_gas: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
    /// `stateRoot`, `logsBloom`, `extraData`, `withdrawals`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    /// `input`, `nonce`, `gas`, `type`, signature fields, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of `eth_getTransactionReceipt(hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: String,
    /// Absent on pre-Byzantium receipts.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub cumulative_gas_used: Option<String>,
    #[serde(default)]
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
    /// `logs`, `logsBloom`, `type`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A block whose transactions carry their receipt and participant bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedBlock {
    pub hash: String,
    pub parent_hash: String,
    pub number: u64,
    pub timestamp: String,
    pub miner: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub base_fee_per_gas: Option<String>,
    pub size: Option<String>,
    pub difficulty: Option<String>,
    pub transactions: Vec<EnrichedTransaction>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    pub hash: String,
    pub block_hash: String,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    pub value: String,
    pub gas_price: Option<String>,
    /// `None` when the node had no receipt for the transaction.
    pub receipt: Option<RawReceipt>,
    pub from_code: String,
    pub to_code: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl EnrichedTransaction {
    pub fn has_receipt(&self) -> bool {
        self.receipt.is_some()
    }
}

impl EnrichedBlock {
    /// Number of transactions the node returned without a receipt.
    pub fn missing_receipts(&self) -> usize {
        self.transactions.iter().filter(|tx| !tx.has_receipt()).count()
    }
}
