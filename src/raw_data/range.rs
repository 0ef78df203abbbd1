use std::fmt;

use thiserror::Error;

use crate::rpc::{fetch_enriched_block, ChainRpc, EnrichOptions, Retryable, RpcError};
use crate::types::chain::EnrichedBlock;

/// Upper bound on the block buffer reserved before a range is fetched.
const PREALLOCATED_BLOCKS: u64 = 1_024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid block range: start {start} is greater than end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Failed to fetch block {number}: {source}")]
    Block {
        number: u64,
        #[source]
        source: RpcError,
    },
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::InvalidRange { .. } => false,
            FetchError::Block { source, .. } => source.is_retryable(),
        }
    }
}

/// An inclusive, non-empty block-number range processed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Result<Self, FetchError> {
        if start > end {
            return Err(FetchError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Deterministic batch identifier, `"{start}-{end}"`.
    pub fn batch_id(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    /// Saturates at `u64::MAX` for the full `0..=u64::MAX` range.
    pub fn block_count(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// Number of sub-ranges [`chunks`](Self::chunks) yields for `size`.
    pub fn chunk_count(&self, size: u64) -> u64 {
        ((self.end - self.start) / size.max(1)).saturating_add(1)
    }

    /// Consecutive sub-ranges of at most `size` blocks, produced lazily.
    pub fn chunks(&self, size: u64) -> impl Iterator<Item = BlockRange> {
        let size = size.max(1);
        let last = self.end;
        let mut next = Some(self.start);
        std::iter::from_fn(move || {
            let start = next?;
            let end = start.saturating_add(size - 1).min(last);
            next = (end < last).then(|| end + 1);
            Some(BlockRange { start, end })
        })
    }

    /// Parses a batch identifier back into its range.
    pub fn parse_batch_id(batch_id: &str) -> Option<Self> {
        let (start, end) = batch_id.split_once('-')?;
        let range = Self::new(start.parse().ok()?, end.parse().ok()?).ok()?;
        Some(range)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Fetches every block of `[start, end]` in ascending order.
///
/// The first failure aborts the range; no partial result is returned.
pub async fn fetch_range<C>(
    client: &C,
    start: u64,
    end: u64,
    options: EnrichOptions,
) -> Result<Vec<EnrichedBlock>, FetchError>
where
    C: ChainRpc + ?Sized,
{
    let range = BlockRange::new(start, end)?;
    let mut blocks = Vec::with_capacity(range.block_count().min(PREALLOCATED_BLOCKS) as usize);

    for number in range.start..=range.end {
        let block = fetch_enriched_block(client, number, options)
            .await
            .map_err(|source| {
                tracing::error!("Error fetching block {}: {}", number, source);
                FetchError::Block { number, source }
            })?;

        tracing::info!(
            "Fetched block {} with {} transactions",
            number,
            block.transactions.len()
        );
        blocks.push(block);
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_block, raw_receipt, raw_tx, MockChainRpc};

    fn chain_of(numbers: std::ops::RangeInclusive<u64>) -> MockChainRpc {
        let mut rpc = MockChainRpc::default();
        for n in numbers {
            let tx_hash = format!("0xt{n}");
            rpc.add_block(raw_block(
                n,
                &format!("0xb{n}"),
                &format!("0xb{}", n.saturating_sub(1)),
                &format!("0x{:x}", 1_700_000_000 + n * 12),
                "0xminer",
                vec![raw_tx(&tx_hash, &format!("0xb{n}"), "0xa", Some("0xb"), "0x1")],
            ));
            rpc.add_receipt(raw_receipt(&tx_hash, "0x1", "0x5208"));
        }
        rpc
    }

    #[tokio::test]
    async fn test_single_block_range() {
        let rpc = chain_of(1..=10);
        let blocks = fetch_range(&rpc, 5, 5, EnrichOptions::default())
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number, 5);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let rpc = chain_of(1..=10);
        let err = fetch_range(&rpc, 5, 3, EnrichOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRange { start: 5, end: 3 }));
        assert!(!err.is_retryable());
        assert_eq!(rpc.block_calls(), 0);
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_ascending() {
        let rpc = chain_of(0..=10);
        let blocks = fetch_range(&rpc, 2, 6, EnrichOptions::default())
            .await
            .unwrap();
        let numbers: Vec<u64> = blocks.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![2, 3, 4, 5, 6]);
        for pair in blocks.windows(2) {
            assert_eq!(pair[1].number, pair[0].number + 1);
        }
    }

    #[tokio::test]
    async fn test_failure_aborts_range_with_block_context() {
        let mut rpc = chain_of(1..=5);
        rpc.fail_block(3);

        let err = fetch_range(&rpc, 1, 5, EnrichOptions::default())
            .await
            .unwrap_err();
        match err {
            FetchError::Block { number, .. } => assert_eq!(number, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        // blocks after the failure are never requested
        assert_eq!(rpc.block_calls(), 3);
    }

    #[test]
    fn test_batch_id_round_trip() {
        let range = BlockRange::new(390_000, 390_010).unwrap();
        assert_eq!(range.batch_id(), "390000-390010");
        assert_eq!(BlockRange::parse_batch_id("390000-390010"), Some(range));
        assert_eq!(BlockRange::parse_batch_id("10-2"), None);
        assert_eq!(BlockRange::parse_batch_id("latest"), None);
    }

    #[test]
    fn test_chunks_cover_range_exactly() {
        let range = BlockRange::new(10, 34).unwrap();
        let chunks: Vec<_> = range.chunks(10).collect();
        assert_eq!(range.chunk_count(10), 3);
        assert_eq!(
            chunks,
            vec![
                BlockRange { start: 10, end: 19 },
                BlockRange { start: 20, end: 29 },
                BlockRange { start: 30, end: 34 },
            ]
        );

        let single: Vec<_> = BlockRange::new(5, 5).unwrap().chunks(100).collect();
        assert_eq!(single, vec![BlockRange { start: 5, end: 5 }]);

        let top: Vec<_> = BlockRange::new(u64::MAX - 1, u64::MAX).unwrap().chunks(1).collect();
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_full_u64_range_is_not_materialized() {
        let range = BlockRange::new(0, u64::MAX).unwrap();
        assert_eq!(range.block_count(), u64::MAX);
        assert_eq!(range.chunk_count(1), u64::MAX);
        assert_eq!(range.chunk_count(10), u64::MAX / 10 + 1);

        let mut chunks = range.chunks(10);
        assert_eq!(chunks.next(), Some(BlockRange { start: 0, end: 9 }));
        assert_eq!(chunks.next(), Some(BlockRange { start: 10, end: 19 }));

        let last = range.chunks(u64::MAX).last();
        assert_eq!(last, Some(BlockRange { start: u64::MAX, end: u64::MAX }));
    }

    #[tokio::test]
    async fn test_huge_range_fails_on_first_block_without_allocating() {
        let mut rpc = chain_of(1..=3);
        rpc.fail_block(0);

        let err = fetch_range(&rpc, 0, u64::MAX, EnrichOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Block { number: 0, .. }));
        assert_eq!(rpc.block_calls(), 1);
    }
}
