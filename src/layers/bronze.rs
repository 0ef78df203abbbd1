//! Bronze encoding: the replay blob plus three Snappy parquet datasets that
//! keep the node's raw wire strings. Node fields without a dedicated column
//! are stored as a JSON object in `extra`.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray, UInt32Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::storage::StorageError;
use crate::types::chain::{EnrichedBlock, EnrichedTransaction};

pub const ENRICHED_BLOCKS: &str = "enriched_blocks";
pub const BLOCKS: &str = "blocks";
pub const TRANSACTIONS: &str = "transactions";
pub const ADDRESS_CODES: &str = "address_codes";

/// `{dataset}/batch={batch_id}/data.{extension}`
pub fn object_key(dataset: &str, batch_id: &str, extension: &str) -> String {
    format!("{}/batch={}/data.{}", dataset, batch_id, extension)
}

/// Every object written for one batch, as `(key, bytes)`.
pub fn encode_batch(
    blocks: &[EnrichedBlock],
    batch_id: &str,
) -> Result<Vec<(String, Bytes)>, StorageError> {
    Ok(vec![
        (
            object_key(ENRICHED_BLOCKS, batch_id, "json"),
            Bytes::from(serde_json::to_vec(blocks)?),
        ),
        (object_key(BLOCKS, batch_id, "parquet"), blocks_parquet(blocks)?),
        (
            object_key(TRANSACTIONS, batch_id, "parquet"),
            transactions_parquet(blocks)?,
        ),
        (
            object_key(ADDRESS_CODES, batch_id, "parquet"),
            address_codes_parquet(blocks)?,
        ),
    ])
}

pub fn decode_enriched_blocks(data: &[u8]) -> Result<Vec<EnrichedBlock>, StorageError> {
    Ok(serde_json::from_slice(data)?)
}

fn utf8(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Utf8, nullable)
}

fn blocks_parquet(blocks: &[EnrichedBlock]) -> Result<Bytes, StorageError> {
    let schema = Arc::new(Schema::new(vec![
        utf8("hash", false),
        utf8("parent_hash", false),
        Field::new("number", DataType::UInt64, false),
        utf8("timestamp", false),
        utf8("miner", false),
        utf8("gas_limit", false),
        utf8("gas_used", false),
        utf8("base_fee_per_gas", true),
        utf8("size", true),
        utf8("difficulty", true),
        Field::new("transaction_count", DataType::UInt32, false),
        utf8("extra", false),
    ]));

    let strings = |f: fn(&EnrichedBlock) -> &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(blocks.iter().map(f)))
    };
    let optional = |f: fn(&EnrichedBlock) -> Option<&str>| -> ArrayRef {
        Arc::new(blocks.iter().map(f).collect::<StringArray>())
    };

    let numbers: UInt64Array = blocks.iter().map(|b| Some(b.number)).collect();
    let tx_counts: UInt32Array = blocks
        .iter()
        .map(|b| Some(b.transactions.len() as u32))
        .collect();
    let extras = blocks
        .iter()
        .map(|b| serde_json::to_string(&b.extra))
        .collect::<Result<Vec<_>, _>>()?;

    let arrays: Vec<ArrayRef> = vec![
        strings(|b| b.hash.as_str()),
        strings(|b| b.parent_hash.as_str()),
        Arc::new(numbers),
        strings(|b| b.timestamp.as_str()),
        strings(|b| b.miner.as_str()),
        strings(|b| b.gas_limit.as_str()),
        strings(|b| b.gas_used.as_str()),
        optional(|b| b.base_fee_per_gas.as_deref()),
        optional(|b| b.size.as_deref()),
        optional(|b| b.difficulty.as_deref()),
        Arc::new(tx_counts),
        Arc::new(StringArray::from(extras)),
    ];

    write_parquet(schema, arrays)
}

fn transactions_parquet(blocks: &[EnrichedBlock]) -> Result<Bytes, StorageError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("block_number", DataType::UInt64, false),
        utf8("hash", false),
        utf8("block_hash", false),
        utf8("from", false),
        utf8("to", true),
        utf8("value", false),
        utf8("gas_price", true),
        utf8("receipt_status", true),
        utf8("receipt_gas_used", true),
        utf8("receipt_cumulative_gas_used", true),
        utf8("receipt_effective_gas_price", true),
        utf8("receipt_contract_address", true),
        utf8("extra", false),
        utf8("receipt_extra", true),
    ]));

    let rows: Vec<_> = blocks
        .iter()
        .flat_map(|b| b.transactions.iter().map(move |tx| (b.number, tx)))
        .collect();

    let block_numbers: UInt64Array = rows.iter().map(|(n, _)| Some(*n)).collect();
    let column = |f: &dyn Fn(&EnrichedTransaction) -> Option<&str>| -> ArrayRef {
        Arc::new(rows.iter().map(|(_, tx)| f(tx)).collect::<StringArray>())
    };

    let extras = rows
        .iter()
        .map(|(_, tx)| serde_json::to_string(&tx.extra))
        .collect::<Result<Vec<_>, _>>()?;
    let receipt_extras = rows
        .iter()
        .map(|(_, tx)| tx.receipt.as_ref().map(|r| serde_json::to_string(&r.extra)).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(block_numbers),
        column(&|tx| Some(tx.hash.as_str())),
        column(&|tx| Some(tx.block_hash.as_str())),
        column(&|tx| Some(tx.from.as_str())),
        column(&|tx| tx.to.as_deref()),
        column(&|tx| Some(tx.value.as_str())),
        column(&|tx| tx.gas_price.as_deref()),
        column(&|tx| tx.receipt.as_ref().and_then(|r| r.status.as_deref())),
        column(&|tx| tx.receipt.as_ref().map(|r| r.gas_used.as_str())),
        column(&|tx| tx.receipt.as_ref().and_then(|r| r.cumulative_gas_used.as_deref())),
        column(&|tx| tx.receipt.as_ref().and_then(|r| r.effective_gas_price.as_deref())),
        column(&|tx| tx.receipt.as_ref().and_then(|r| r.contract_address.as_deref())),
        Arc::new(StringArray::from(extras)),
        Arc::new(StringArray::from(receipt_extras)),
    ];

    write_parquet(schema, arrays)
}

/// Distinct participant addresses of the batch and their bytecode, first
/// observation wins.
fn address_codes_parquet(blocks: &[EnrichedBlock]) -> Result<Bytes, StorageError> {
    let schema = Arc::new(Schema::new(vec![utf8("address", false), utf8("code", false)]));

    let mut seen = HashSet::new();
    let mut addresses = Vec::new();
    let mut codes = Vec::new();
    for tx in blocks.iter().flat_map(|b| &b.transactions) {
        let participants = std::iter::once((tx.from.as_str(), tx.from_code.as_str())).chain(
            tx.to
                .as_deref()
                .zip(tx.to_code.as_deref()),
        );
        for (address, code) in participants {
            if seen.insert(address) {
                addresses.push(address);
                codes.push(code);
            }
        }
    }

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(addresses)),
        Arc::new(StringArray::from(codes)),
    ];

    write_parquet(schema, arrays)
}

fn write_parquet(schema: Arc<Schema>, arrays: Vec<ArrayRef>) -> Result<Bytes, StorageError> {
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(Bytes::from(buffer))
}
