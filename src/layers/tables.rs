//! Silver and gold table definitions and row encodings.

use crate::db::{Column, DbValue, Row, TableSchema};
use crate::types::rows::{AccountDimRow, BlockDimRow, SilverBlockRow, TransactionFactRow};

use crate::db::SqlType::{BigInt, Boolean, Numeric, Text, TimestampTz};

pub const SILVER_BLOCKS: TableSchema = TableSchema {
    schema: "silver",
    name: "blocks",
    columns: &[
        Column::required("hash", Text),
        Column::required("parent_hash", Text),
        Column::required("number", BigInt),
        Column::required("timestamp", TimestampTz),
        Column::required("miner", Text),
        Column::required("gas_limit", BigInt),
        Column::required("gas_used", BigInt),
        Column::required("base_fee_per_gas", BigInt),
        Column::required("size", BigInt),
        Column::required("difficulty", Numeric),
    ],
    key: &["hash"],
};

pub const DIM_BLOCK: TableSchema = TableSchema {
    schema: "gold",
    name: "dim_block",
    columns: &[
        Column::required("block_key", Text),
        Column::required("parent_block_hash", Text),
        Column::required("block_number", BigInt),
        Column::required("block_timestamp", TimestampTz),
        Column::required("miner_account_key", Text),
        Column::required("block_gas_limit", BigInt),
    ],
    key: &["block_key"],
};

pub const FACT_TRANSACTION: TableSchema = TableSchema {
    schema: "gold",
    name: "fact_transaction",
    columns: &[
        Column::required("transaction_hash_key", Text),
        Column::required("block_key", Text),
        Column::required("from_account_key", Text),
        Column::nullable("to_account_key", Text),
        Column::required("transaction_value", Numeric),
        Column::required("gas_used", BigInt),
        Column::required("gas_price", Numeric),
        Column::nullable("transaction_status", BigInt),
        Column::required("block_number", BigInt),
    ],
    key: &["transaction_hash_key"],
};

pub const DIM_ACCOUNT: TableSchema = TableSchema {
    schema: "gold",
    name: "dim_account",
    columns: &[
        Column::required("account_key", Text),
        Column::required("account_address", Text),
        Column::nullable("is_contract", Boolean),
        Column::required("first_seen_timestamp", TimestampTz),
        Column::required("last_seen_timestamp", TimestampTz),
    ],
    key: &["account_key"],
};

pub const ALL_TABLES: [TableSchema; 4] = [SILVER_BLOCKS, DIM_BLOCK, FACT_TRANSACTION, DIM_ACCOUNT];

/// Column holding the result of [`count_sql`].
pub const ROW_COUNT: &str = "row_count";

pub fn count_sql(table: &TableSchema) -> String {
    format!("SELECT count(*) AS {} FROM {}", ROW_COUNT, table.qualified_name())
}

/// Encoding of a typed row in its table's column order.
pub trait ToRow {
    fn to_row(&self) -> Row;
}

impl ToRow for SilverBlockRow {
    fn to_row(&self) -> Row {
        vec![
            DbValue::Text(self.hash.clone()),
            DbValue::Text(self.parent_hash.clone()),
            DbValue::Uint64(self.number),
            DbValue::Timestamp(self.timestamp),
            DbValue::Text(self.miner.clone()),
            DbValue::Uint64(self.gas_limit),
            DbValue::Uint64(self.gas_used),
            DbValue::Uint64(self.base_fee_per_gas),
            DbValue::Uint64(self.size),
            DbValue::Numeric(self.difficulty.to_string()),
        ]
    }
}

impl ToRow for BlockDimRow {
    fn to_row(&self) -> Row {
        vec![
            DbValue::Text(self.block_key.clone()),
            DbValue::Text(self.parent_block_hash.clone()),
            DbValue::Uint64(self.block_number),
            DbValue::Timestamp(self.block_timestamp),
            DbValue::Text(self.miner_account_key.clone()),
            DbValue::Uint64(self.block_gas_limit),
        ]
    }
}

impl ToRow for TransactionFactRow {
    fn to_row(&self) -> Row {
        vec![
            DbValue::Text(self.transaction_hash_key.clone()),
            DbValue::Text(self.block_key.clone()),
            DbValue::Text(self.from_account_key.clone()),
            DbValue::opt_text(self.to_account_key.as_deref()),
            DbValue::Numeric(self.transaction_value.to_string()),
            DbValue::Uint64(self.gas_used),
            DbValue::Numeric(self.gas_price.to_string()),
            self.transaction_status.map_or(DbValue::Null, DbValue::Uint64),
            DbValue::Uint64(self.block_number),
        ]
    }
}

impl ToRow for AccountDimRow {
    fn to_row(&self) -> Row {
        vec![
            DbValue::Text(self.account_key.clone()),
            DbValue::Text(self.account_address.clone()),
            self.is_contract.map_or(DbValue::Null, DbValue::Bool),
            DbValue::Timestamp(self.first_seen_timestamp),
            DbValue::Timestamp(self.last_seen_timestamp),
        ]
    }
}

pub fn to_rows<T: ToRow>(rows: &[T]) -> Vec<Row> {
    rows.iter().map(ToRow::to_row).collect()
}
