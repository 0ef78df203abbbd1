pub mod error;
pub mod pool;
pub mod schema;
pub mod sink;
pub mod types;

pub use error::DbError;
pub use schema::{Column, SqlType, TableSchema};
pub use sink::{PostgresTableSink, TableSink, WriteMode};
pub use types::{DbValue, Row};
