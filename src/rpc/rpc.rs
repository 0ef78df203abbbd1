use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::U256;
use alloy::providers::{Provider, RootProvider};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::decoding::{encode_int, HexError};
use crate::rpc::chain::ChainRpc;
use crate::types::chain::{RawBlock, RawReceipt};

pub const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
pub const GET_CODE: &str = "eth_getCode";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC call {method} to {endpoint} failed: {cause}")]
    CallFailed {
        method: String,
        endpoint: String,
        cause: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("RPC call {method} returned an unexpected payload: {message}")]
    InvalidResponse { method: String, message: String },

    #[error("Requested block {requested} but node returned block {returned}")]
    UnexpectedBlock { requested: u64, returned: u64 },

    #[error("Hex decoding error: {0}")]
    Hex(#[from] HexError),
}

/// Errors that know whether repeating the operation may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RpcError {
    fn is_retryable(&self) -> bool {
        match self {
            RpcError::CallFailed { cause, .. } => is_retryable_message(cause),
            // A lagging node may not have caught up to the requested height yet
            RpcError::UnexpectedBlock { .. } => true,
            RpcError::InvalidUrl(_) | RpcError::InvalidResponse { .. } | RpcError::Hex(_) => false,
        }
    }
}

fn is_retryable_message(msg: &str) -> bool {
    let msg_lower = msg.to_lowercase();
    // Network/connection errors
    msg_lower.contains("connection")
        || msg_lower.contains("timeout")
        || msg_lower.contains("timed out")
        || msg_lower.contains("reset")
        || msg_lower.contains("broken pipe")
        || msg_lower.contains("eof")
        || msg_lower.contains("null result")
        // Rate limiting
        || msg_lower.contains("rate limit")
        || msg_lower.contains("too many requests")
        // Server errors (5xx)
        || msg_lower.contains("internal server error")
        || msg_lower.contains("bad gateway")
        || msg_lower.contains("service unavailable")
        || msg_lower.contains("gateway timeout")
        || msg_lower.contains("temporarily")
        || msg_lower.contains("try again")
        || http_status(&msg_lower).is_some_and(|status| status == 429 || (500..600).contains(&status))
}

/// Status code of an HTTP failure message such as
/// `HTTP error 503 with body: ...`; bare digits elsewhere are ignored.
fn http_status(msg_lower: &str) -> Option<u16> {
    ["http error ", "status code: ", "status code ", "status: "]
        .iter()
        .find_map(|marker| {
            let rest = &msg_lower[msg_lower.find(marker)? + marker.len()..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.len() == 3 {
                digits.parse().ok()
            } else {
                None
            }
        })
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = Duration::from_millis(delay_ms as u64);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Execute an async operation with retry logic
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt);
            tracing::warn!(
                "Retry {}/{} for '{}' in {:?}",
                attempt,
                config.max_retries,
                operation_name,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!("'{}' succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                tracing::warn!(
                    "'{}' failed (attempt {}/{}): {}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    e
                );
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::error!(
                        "'{}' failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl RateLimitConfig {
    pub fn new(requests_per_second: NonZeroU32) -> Self {
        Self {
            requests_per_second,
            jitter_min_ms: 5,
            jitter_max_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub url: Url,
    pub rate_limit: Option<RateLimitConfig>,
}

impl RpcClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            rate_limit: None,
        }
    }

    pub fn from_url(url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::InvalidUrl(e.to_string()))?;
        Ok(Self::new(url))
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }
}

/// JSON-RPC client issuing raw requests and returning wire-format payloads.
///
/// Every call is a single round trip; failures surface as
/// [`RpcError::CallFailed`] and are never retried here.
pub struct RpcClient {
    provider: RootProvider<Ethereum>,
    config: RpcClientConfig,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    jitter: Option<Jitter>,
}

impl RpcClient {
    pub fn new(config: RpcClientConfig) -> Self {
        let provider = RootProvider::<Ethereum>::new_http(config.url.clone());

        let (rate_limiter, jitter) = if let Some(ref rate_config) = config.rate_limit {
            let quota = Quota::per_second(rate_config.requests_per_second);
            let limiter = RateLimiter::direct(quota);
            let jitter = Jitter::new(
                Duration::from_millis(rate_config.jitter_min_ms),
                Duration::from_millis(rate_config.jitter_max_ms),
            );
            (Some(Arc::new(limiter)), Some(jitter))
        } else {
            (None, None)
        };

        Self {
            provider,
            config,
            rate_limiter,
            jitter,
        }
    }

    /// Host of the endpoint, safe to log (URLs often embed API keys).
    pub fn endpoint(&self) -> String {
        self.config
            .url
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    async fn wait_for_rate_limit(&self) {
        if let (Some(limiter), Some(jitter)) = (&self.rate_limiter, &self.jitter) {
            limiter.until_ready_with_jitter(*jitter).await;
        }
    }

    fn call_failed(&self, method: &str, cause: impl ToString) -> RpcError {
        RpcError::CallFailed {
            method: method.to_string(),
            endpoint: self.endpoint(),
            cause: cause.to_string(),
        }
    }

    /// Issues one JSON-RPC request and returns its `result` member.
    async fn request<P>(&self, method: &'static str, params: P) -> Result<Value, RpcError>
    where
        P: serde::Serialize + Clone + fmt::Debug + Send + Sync + Unpin + 'static,
    {
        self.wait_for_rate_limit().await;
        tracing::debug!("{} {:?}", method, params);
        let value: Value = self
            .provider
            .client()
            .request(method, params)
            .await
            .map_err(|e| self.call_failed(method, e))?;
        Ok(value)
    }

    fn parse<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
        serde_json::from_value(value).map_err(|e| RpcError::InvalidResponse {
            method: method.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn fetch_block(&self, number: u64) -> Result<RawBlock, RpcError> {
        let value = self
            .request(GET_BLOCK_BY_NUMBER, (encode_int(U256::from(number)), true))
            .await?;
        if value.is_null() {
            return Err(self.call_failed(
                GET_BLOCK_BY_NUMBER,
                format!("null result for block {number}"),
            ));
        }
        Self::parse(GET_BLOCK_BY_NUMBER, value)
    }

    async fn fetch_receipt(&self, tx_hash: &str) -> Result<Option<RawReceipt>, RpcError> {
        let value = self
            .request(GET_TRANSACTION_RECEIPT, (tx_hash.to_string(),))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Self::parse(GET_TRANSACTION_RECEIPT, value).map(Some)
    }

    async fn fetch_code(&self, address: &str) -> Result<String, RpcError> {
        let value = self
            .request(GET_CODE, (address.to_string(), "latest".to_string()))
            .await?;
        match value {
            Value::String(code) => Ok(code),
            Value::Null => Err(self.call_failed(GET_CODE, format!("null result for {address}"))),
            other => Err(RpcError::InvalidResponse {
                method: GET_CODE.to_string(),
                message: format!("expected a hex string, got {other}"),
            }),
        }
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.endpoint())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}
