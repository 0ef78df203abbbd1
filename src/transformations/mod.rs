//! Derivation of typed silver rows and gold star-schema rows from a batch
//! of enriched blocks.
//!
//! ```text
//! Vec<EnrichedBlock> ──► normalize_blocks ──► silver.blocks
//!          │
//!          └──────────► transform_batch ──► gold.dim_block
//!                                       ├─► gold.fact_transaction
//!                                       └─► gold.dim_account
//! ```
//!
//! Both transforms are pure; a malformed hex quantity is the only failure.

pub mod dimensional;
pub mod error;
pub mod silver;

pub use dimensional::transform_batch;
pub use error::TransformError;
pub use silver::normalize_blocks;
