use crate::decoding::{decode_opt_int, decode_opt_u64, decode_timestamp, decode_u64};
use crate::types::chain::EnrichedBlock;
use crate::types::rows::SilverBlockRow;

use super::error::TransformError;

/// Decodes block headers into typed silver rows, one per block in input order.
pub fn normalize_blocks(blocks: &[EnrichedBlock]) -> Result<Vec<SilverBlockRow>, TransformError> {
    blocks.iter().map(normalize_block).collect()
}

fn normalize_block(block: &EnrichedBlock) -> Result<SilverBlockRow, TransformError> {
    let n = block.number;
    Ok(SilverBlockRow {
        hash: block.hash.clone(),
        parent_hash: block.parent_hash.clone(),
        number: n,
        timestamp: decode_timestamp(&block.timestamp)
            .map_err(TransformError::decode(n, "timestamp"))?,
        miner: block.miner.clone(),
        gas_limit: decode_u64(&block.gas_limit).map_err(TransformError::decode(n, "gasLimit"))?,
        gas_used: decode_u64(&block.gas_used).map_err(TransformError::decode(n, "gasUsed"))?,
        base_fee_per_gas: decode_opt_u64(block.base_fee_per_gas.as_deref())
            .map_err(TransformError::decode(n, "baseFeePerGas"))?,
        size: decode_opt_u64(block.size.as_deref()).map_err(TransformError::decode(n, "size"))?,
        difficulty: decode_opt_int(block.difficulty.as_deref())
            .map_err(TransformError::decode(n, "difficulty"))?,
    })
}
