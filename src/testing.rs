//! In-memory fakes and fixture builders shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value as JsonValue;

use crate::db::{DbError, Row, TableSchema, TableSink};
use crate::rpc::{ChainRpc, RpcError, GET_BLOCK_BY_NUMBER, GET_TRANSACTION_RECEIPT};
use crate::storage::{ObjectStore, StorageError};
use crate::types::chain::{EnrichedBlock, EnrichedTransaction, RawBlock, RawReceipt, RawTransaction};

const GAS_LIMIT: &str = "0x1c9c380";
const GAS_PRICE: &str = "0x3b9aca00";

pub fn raw_block(
    number: u64,
    hash: &str,
    parent_hash: &str,
    timestamp: &str,
    miner: &str,
    transactions: Vec<RawTransaction>,
) -> RawBlock {
    RawBlock {
        hash: hash.to_string(),
        parent_hash: parent_hash.to_string(),
        number: format!("0x{:x}", number),
        timestamp: timestamp.to_string(),
        miner: miner.to_string(),
        gas_limit: GAS_LIMIT.to_string(),
        gas_used: "0x5208".to_string(),
        base_fee_per_gas: Some(GAS_PRICE.to_string()),
        size: Some("0x220".to_string()),
        difficulty: Some("0x0".to_string()),
        transactions,
        extra: Default::default(),
    }
}

pub fn raw_tx(hash: &str, block_hash: &str, from: &str, to: Option<&str>, value: &str) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        block_hash: Some(block_hash.to_string()),
        from: from.to_string(),
        to: to.map(str::to_string),
        value: value.to_string(),
        gas_price: Some(GAS_PRICE.to_string()),
        extra: Default::default(),
    }
}

pub fn raw_receipt(tx_hash: &str, status: &str, gas_used: &str) -> RawReceipt {
    RawReceipt {
        transaction_hash: tx_hash.to_string(),
        status: Some(status.to_string()),
        gas_used: gas_used.to_string(),
        cumulative_gas_used: Some(gas_used.to_string()),
        effective_gas_price: Some(GAS_PRICE.to_string()),
        contract_address: None,
        extra: Default::default(),
    }
}

/// Block `number` whose parent hash is `0xb{number - 1}`.
pub fn enriched_block(
    number: u64,
    hash: &str,
    timestamp: u64,
    miner: &str,
    transactions: Vec<EnrichedTransaction>,
) -> EnrichedBlock {
    EnrichedBlock {
        hash: hash.to_string(),
        parent_hash: format!("0xb{}", number.saturating_sub(1)),
        number,
        timestamp: format!("0x{:x}", timestamp),
        miner: miner.to_string(),
        gas_limit: GAS_LIMIT.to_string(),
        gas_used: "0x5208".to_string(),
        base_fee_per_gas: Some(GAS_PRICE.to_string()),
        size: Some("0x220".to_string()),
        difficulty: Some("0x0".to_string()),
        transactions,
        extra: Default::default(),
    }
}

pub fn enriched_tx(
    hash: &str,
    block_hash: &str,
    from: &str,
    to: Option<&str>,
    value: &str,
    with_receipt: bool,
) -> EnrichedTransaction {
    EnrichedTransaction {
        hash: hash.to_string(),
        block_hash: block_hash.to_string(),
        from: from.to_string(),
        to: to.map(str::to_string),
        value: value.to_string(),
        gas_price: Some(GAS_PRICE.to_string()),
        receipt: with_receipt.then(|| raw_receipt(hash, "0x1", "0x5208")),
        from_code: "0x".to_string(),
        to_code: to.map(|_| "0x".to_string()),
        extra: Default::default(),
    }
}

fn injected(method: &str, cause: &str) -> RpcError {
    RpcError::CallFailed {
        method: method.to_string(),
        endpoint: "mock".to_string(),
        cause: cause.to_string(),
    }
}

#[derive(Default)]
struct Calls {
    blocks: usize,
    code: HashMap<String, usize>,
    transient_block_failures: HashMap<u64, usize>,
    /// Receipt hashes and code addresses in the order their lookups finished.
    completed: Vec<String>,
}

/// Scripted node: serves what was added, counts lookups, fails on request.
#[derive(Default)]
pub struct MockChainRpc {
    blocks: HashMap<u64, RawBlock>,
    receipts: HashMap<String, RawReceipt>,
    codes: HashMap<String, String>,
    failing_blocks: HashSet<u64>,
    failing_receipts: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Calls>,
}

impl MockChainRpc {
    pub fn add_block(&mut self, block: RawBlock) {
        let number = u64::from_str_radix(block.number.trim_start_matches("0x"), 16).unwrap();
        self.blocks.insert(number, block);
    }

    /// Serves `block` when `number` is requested, whatever its own number.
    pub fn add_block_as(&mut self, number: u64, block: RawBlock) {
        self.blocks.insert(number, block);
    }

    pub fn add_receipt(&mut self, receipt: RawReceipt) {
        self.receipts.insert(receipt.transaction_hash.clone(), receipt);
    }

    pub fn remove_receipt(&mut self, tx_hash: &str) {
        self.receipts.remove(tx_hash);
    }

    pub fn add_code(&mut self, address: &str, code: &str) {
        self.codes.insert(address.to_string(), code.to_string());
    }

    /// Every request for block `number` fails with a non-retryable error.
    pub fn fail_block(&mut self, number: u64) {
        self.failing_blocks.insert(number);
    }

    /// The next `times` requests for block `number` fail with an HTTP 503.
    pub fn fail_block_transiently(&mut self, number: u64, times: usize) {
        self.calls
            .lock()
            .unwrap()
            .transient_block_failures
            .insert(number, times);
    }

    pub fn fail_receipt(&mut self, tx_hash: &str) {
        self.failing_receipts.insert(tx_hash.to_string());
    }

    /// Holds back the receipt or code lookup keyed by `hash_or_address`.
    pub fn delay(&mut self, hash_or_address: &str, delay: Duration) {
        self.delays.insert(hash_or_address.to_string(), delay);
    }

    pub fn completion_order(&self) -> Vec<String> {
        self.calls.lock().unwrap().completed.clone()
    }

    async fn respond(&self, key: &str) {
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        self.calls.lock().unwrap().completed.push(key.to_string());
    }

    pub fn block_calls(&self) -> usize {
        self.calls.lock().unwrap().blocks
    }

    pub fn code_calls(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .code
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn fetch_block(&self, number: u64) -> Result<RawBlock, RpcError> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.blocks += 1;
            if let Some(remaining) = calls.transient_block_failures.get_mut(&number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(injected(GET_BLOCK_BY_NUMBER, "HTTP error 503: Service Unavailable"));
                }
            }
        }
        if self.failing_blocks.contains(&number) {
            return Err(injected(GET_BLOCK_BY_NUMBER, "injected failure"));
        }
        self.blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| injected(GET_BLOCK_BY_NUMBER, &format!("null result for block {number}")))
    }

    async fn fetch_receipt(&self, tx_hash: &str) -> Result<Option<RawReceipt>, RpcError> {
        if self.failing_receipts.contains(tx_hash) {
            return Err(injected(GET_TRANSACTION_RECEIPT, "injected failure"));
        }
        self.respond(tx_hash).await;
        Ok(self.receipts.get(tx_hash).cloned())
    }

    async fn fetch_code(&self, address: &str) -> Result<String, RpcError> {
        *self
            .calls
            .lock()
            .unwrap()
            .code
            .entry(address.to_string())
            .or_default() += 1;
        self.respond(address).await;
        Ok(self
            .codes
            .get(address)
            .cloned()
            .unwrap_or_else(|| "0x".to_string()))
    }
}

/// Object store on a shared map; clones see the same objects.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<Mutex<BTreeSet<String>>>,
    objects: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

impl MemoryObjectStore {
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().unwrap().contains(bucket)
    }

    /// All objects keyed `bucket/key`.
    pub fn snapshot(&self) -> BTreeMap<String, Bytes> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{bucket}/{key}"))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[derive(Default)]
struct SinkState {
    tables: BTreeMap<String, Vec<Row>>,
    append_all_calls: usize,
}

/// Table sink on a shared map; clones see the same tables.
#[derive(Clone, Default)]
pub struct MemoryTableSink {
    state: Arc<Mutex<SinkState>>,
}

impl MemoryTableSink {
    /// Names of the created tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn append_all_calls(&self) -> usize {
        self.state.lock().unwrap().append_all_calls
    }
}

#[async_trait]
impl TableSink for MemoryTableSink {
    async fn ensure_exists(&self, table: &TableSchema) -> Result<(), DbError> {
        self.state
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_default();
        Ok(())
    }

    async fn append(&self, table: &TableSchema, rows: Vec<Row>) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let Some(existing) = state.tables.get_mut(&table.to_string()) else {
            return Err(DbError::UnsupportedQuery(format!("table {table} does not exist")));
        };
        for row in rows {
            if row.len() != table.columns.len() {
                return Err(DbError::RowWidth {
                    table: table.to_string(),
                    expected: table.columns.len(),
                    actual: row.len(),
                });
            }
            existing.push(row);
        }
        Ok(())
    }

    async fn append_all(&self, writes: Vec<(TableSchema, Vec<Row>)>) -> Result<(), DbError> {
        self.state.lock().unwrap().append_all_calls += 1;
        for (table, rows) in writes {
            self.append(&table, rows).await?;
        }
        Ok(())
    }

    /// Answers `SELECT count(*) AS row_count FROM "schema"."table"` only.
    async fn query(&self, sql: &str) -> Result<Vec<JsonValue>, DbError> {
        let unsupported = || DbError::UnsupportedQuery(sql.to_string());
        let table = sql
            .strip_prefix("SELECT count(*) AS row_count FROM ")
            .ok_or_else(unsupported)?
            .replace('"', "");
        let state = self.state.lock().unwrap();
        let rows = state.tables.get(&table).ok_or_else(unsupported)?;
        Ok(vec![serde_json::json!({ "row_count": rows.len() })])
    }
}
