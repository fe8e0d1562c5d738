//! Per-exchange tuning of the response lifecycle.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 8 * 1024;
pub const DEFAULT_OUTPUT_AGGREGATION_SIZE: usize = 2 * 1024;
pub const DEFAULT_ASYNC_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_REQUEST_BODY: usize = 1024 * 1024;

/// Buffering and timeout settings shared by every response of a connection.
///
/// Deserializable so servers can embed it in their own configuration; missing fields take
/// their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// bytes held before the first commit; a write that does not fit forces chunked framing
    pub output_buffer_size: usize,
    /// after commit, writes smaller than this are aggregated instead of sent immediately
    pub output_aggregation_size: usize,
    /// deadline for `complete()` once an exchange went async
    pub async_timeout_ms: u64,
    /// request bodies above this are rejected with `413`
    pub max_request_body: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("output buffer size must be greater than zero")]
    ZeroBufferSize,

    #[error("aggregation size {aggregation} exceeds output buffer size {buffer}")]
    AggregationTooLarge { aggregation: usize, buffer: usize },
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            output_aggregation_size: DEFAULT_OUTPUT_AGGREGATION_SIZE,
            async_timeout_ms: DEFAULT_ASYNC_TIMEOUT_MS,
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
        }
    }
}

impl HttpConfig {
    pub fn with_buffer_sizes(output_buffer_size: usize, output_aggregation_size: usize) -> Self {
        Self { output_buffer_size, output_aggregation_size, ..Self::default() }
    }

    #[must_use]
    pub fn async_timeout(mut self, timeout: Duration) -> Self {
        self.async_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn async_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.async_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.output_aggregation_size > self.output_buffer_size {
            return Err(ConfigError::AggregationTooLarge {
                aggregation: self.output_aggregation_size,
                buffer: self.output_buffer_size,
            });
        }
        Ok(())
    }
}
