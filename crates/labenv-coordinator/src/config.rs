//! Configuration types for allocation and teardown
//!
//! Plain structs built by the binary from CLI arguments. The library never
//! reads the environment itself.

use crate::wait::WaitConfig;
use backon::ExponentialBuilder;
use labenv_common::defaults::{DEFAULT_MAX_RETRIES, DEFAULT_REGION, DEFAULT_TEARDOWN_CONCURRENCY};
use std::time::Duration;

/// Backoff applied to transient provider errors on a single call
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_times: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_times: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_times: 0,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_times)
            .with_jitter()
    }
}

/// Teardown run parameters
#[derive(Debug, Clone)]
pub struct TeardownConfig {
    /// Deletions in flight at once within a stage
    pub concurrency: usize,
    /// Discover and report without deleting anything
    pub dry_run: bool,
    pub retry: RetryConfig,
    /// Polling for kinds whose deletion completes asynchronously
    pub wait: WaitConfig,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_TEARDOWN_CONCURRENCY,
            dry_run: false,
            retry: RetryConfig::default(),
            wait: WaitConfig::default(),
        }
    }
}

/// AWS account selection
#[derive(Debug, Clone)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,
    /// AWS profile name (overrides default credential resolution)
    pub profile: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            profile: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_common() {
        let config = TeardownConfig::default();
        assert_eq!(config.concurrency, DEFAULT_TEARDOWN_CONCURRENCY);
        assert!(!config.dry_run);
        assert_eq!(config.retry.max_times, DEFAULT_MAX_RETRIES);
        assert_eq!(AwsConfig::default().region, DEFAULT_REGION);
    }

    #[test]
    fn none_disables_retries() {
        assert_eq!(RetryConfig::none().max_times, 0);
    }
}
