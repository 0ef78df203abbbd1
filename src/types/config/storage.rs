use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::db::WriteMode;
use crate::rpc::RetryConfig;

fn default_bucket() -> String {
    "bronze".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BronzeConfig {
    /// Root directory of the object store; relative paths resolve against
    /// the config file's directory.
    pub root: PathBuf,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    pub database_url_env_var: String,
    #[serde(default)]
    pub write_mode: WriteMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }
}
