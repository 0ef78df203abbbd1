//! Transformation error types.

use thiserror::Error;

use crate::decoding::HexError;

/// Only malformed quantities fail a transform; missing receipts and
/// contract creations are row-inclusion rules, not errors.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to decode {field} of block {block_number}: {source}")]
    Decode {
        block_number: u64,
        field: &'static str,
        #[source]
        source: HexError,
    },
}

impl TransformError {
    pub fn decode(block_number: u64, field: &'static str) -> impl FnOnce(HexError) -> Self {
        move |source| Self::Decode {
            block_number,
            field,
            source,
        }
    }
}
