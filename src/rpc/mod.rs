pub mod chain;
#[allow(clippy::module_inception)]
mod rpc;

pub use chain::{fetch_enriched_block, ChainRpc, EnrichOptions};
pub use rpc::{
    with_retry, RateLimitConfig, RetryConfig, Retryable, RpcClient, RpcClientConfig, RpcError,
};
#[cfg(test)]
pub use rpc::{GET_BLOCK_BY_NUMBER, GET_TRANSACTION_RECEIPT};
