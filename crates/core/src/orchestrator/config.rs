//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::executor::ExecutorConfig;
use crate::processor::{ProcessorConfig, RetryConfig};

/// Configuration for the issuance engine.
///
/// Sizes set here are defaults; a launch request may override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tickets committed per transaction.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Partitions for the partitioned strategy.
    #[serde(default = "default_grid_size")]
    pub grid_size: u64,

    /// Workers for the multithreaded strategy.
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: u64,

    /// Largest grid size a launch may request.
    #[serde(default = "default_max_grid_size")]
    pub max_grid_size: u64,

    /// Largest thread pool a launch may request.
    #[serde(default = "default_max_thread_pool_size")]
    pub max_thread_pool_size: u64,

    /// Maximum partitions processed at once (0 = unlimited).
    #[serde(default)]
    pub max_concurrent_partitions: usize,

    /// Wall-clock budget per partition dispatch in milliseconds (0 = none).
    #[serde(default)]
    pub partition_timeout_ms: u64,

    /// Dispatches a timed-out partition gets within one run, counting the first.
    #[serde(default = "default_partition_attempts")]
    pub partition_attempts: u32,

    /// Retry policy for transient chunk failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_chunk_size() -> u64 {
    500
}

fn default_grid_size() -> u64 {
    4
}

fn default_thread_pool_size() -> u64 {
    4
}

fn default_max_grid_size() -> u64 {
    1024
}

fn default_max_thread_pool_size() -> u64 {
    256
}

fn default_partition_attempts() -> u32 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            grid_size: default_grid_size(),
            thread_pool_size: default_thread_pool_size(),
            max_grid_size: default_max_grid_size(),
            max_thread_pool_size: default_max_thread_pool_size(),
            max_concurrent_partitions: 0,
            partition_timeout_ms: 0,
            partition_attempts: default_partition_attempts(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn partition_timeout(&self) -> Option<Duration> {
        (self.partition_timeout_ms > 0).then(|| Duration::from_millis(self.partition_timeout_ms))
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            retry: self.retry.clone(),
            partition_timeout: self.partition_timeout(),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrent_partitions: self.max_concurrent_partitions,
        }
    }

    /// Sets the default chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the largest grid size and thread pool a launch may request.
    pub fn with_size_limits(mut self, max_grid_size: u64, max_thread_pool_size: u64) -> Self {
        self.max_grid_size = max_grid_size;
        self.max_thread_pool_size = max_thread_pool_size;
        self
    }

    /// Sets the partition concurrency cap.
    pub fn with_max_concurrent_partitions(mut self, max: usize) -> Self {
        self.max_concurrent_partitions = max;
        self
    }

    /// Sets the per-partition timeout.
    pub fn with_partition_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.partition_timeout_ms = timeout_ms;
        self
    }

    /// Sets the per-run dispatch budget for timed-out partitions.
    pub fn with_partition_attempts(mut self, attempts: u32) -> Self {
        self.partition_attempts = attempts;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
