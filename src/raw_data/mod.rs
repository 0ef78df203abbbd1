pub mod range;

pub use range::{fetch_range, BlockRange, FetchError};
