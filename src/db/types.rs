use chrono::{DateTime, Utc};

/// A value that can be stored in a warehouse table.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// NULL value
    Null,
    Bool(bool),
    /// Unsigned 64-bit integer (stored as BIGINT)
    Uint64(u64),
    Text(String),
    /// Decimal string for 256-bit integers and fixed-point amounts (stored as NUMERIC)
    Numeric(String),
    /// Instant, stored as TIMESTAMPTZ
    Timestamp(DateTime<Utc>),
}

impl DbValue {
    /// `Text` for `Some`, `Null` for `None`.
    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(DbValue::Null, |v| DbValue::Text(v.to_string()))
    }
}

/// One table row, values in schema column order.
pub type Row = Vec<DbValue>;

/// Write issued against the warehouse.
#[derive(Debug, Clone)]
pub enum DbOperation {
    /// INSERT with ON CONFLICT DO UPDATE (upsert)
    Upsert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
        /// Columns that form the unique constraint
        conflict_columns: Vec<String>,
        /// Columns to update on conflict
        update_columns: Vec<String>,
    },
    /// Simple INSERT
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
    },
}
