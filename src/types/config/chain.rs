use std::num::NonZeroU32;

use serde::Deserialize;

use crate::rpc::{EnrichOptions, RateLimitConfig};

fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    /// Environment variable holding the JSON-RPC endpoint URL.
    pub rpc_url_env_var: String,
    #[serde(default)]
    pub requests_per_second: Option<NonZeroU32>,
    /// Receipt and code lookups in flight within one block.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl ChainConfig {
    pub fn rate_limit(&self) -> Option<RateLimitConfig> {
        self.requests_per_second.map(RateLimitConfig::new)
    }

    pub fn enrich_options(&self) -> EnrichOptions {
        EnrichOptions {
            concurrency: self.concurrency.max(1),
        }
    }
}
