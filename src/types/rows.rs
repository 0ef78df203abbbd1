//! Typed rows of the silver and gold layers.

use alloy::primitives::U256;
use chrono::{DateTime, Utc};

use crate::decoding::FixedPoint;

/// Normalized block header (silver `blocks` table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilverBlockRow {
    pub hash: String,
    pub parent_hash: String,
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub miner: String,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee_per_gas: u64,
    pub size: u64,
    pub difficulty: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDimRow {
    pub block_key: String,
    pub parent_block_hash: String,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub miner_account_key: String,
    pub block_gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFactRow {
    pub transaction_hash_key: String,
    pub block_key: String,
    pub from_account_key: String,
    pub to_account_key: Option<String>,
    /// Value in ether, 18 fractional digits.
    pub transaction_value: FixedPoint,
    pub gas_used: u64,
    pub gas_price: U256,
    /// `None` when the receipt predates the status field.
    pub transaction_status: Option<u64>,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDimRow {
    pub account_key: String,
    pub account_address: String,
    /// Populated downstream from bronze `address_codes`; never set here.
    pub is_contract: Option<bool>,
    pub first_seen_timestamp: DateTime<Utc>,
    pub last_seen_timestamp: DateTime<Utc>,
}
