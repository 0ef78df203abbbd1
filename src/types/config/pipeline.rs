use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::types::config::chain::ChainConfig;
use crate::types::config::storage::{BronzeConfig, RetrySettings, WarehouseConfig};

fn default_batch_size() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub chain: ChainConfig,
    pub bronze: BronzeConfig,
    pub warehouse: WarehouseConfig,
    /// Blocks per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let mut config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(config.batch_size > 0, "batch_size must be at least 1");

        if config.bronze.root.is_relative() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            config.bronze.root = base_dir.join(&config.bronze.root);
        }

        Ok(config)
    }

    /// Environment variables that must be set before a `run`.
    pub fn required_env_vars(&self) -> Vec<&str> {
        vec![
            self.chain.rpc_url_env_var.as_str(),
            self.warehouse.database_url_env_var.as_str(),
        ]
    }
}
