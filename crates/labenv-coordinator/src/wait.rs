//! Polling with exponential backoff, a deadline and cancellation.
//!
//! Used to wait for asynchronous deletions (clusters, instances) to finish
//! before the next teardown stage starts.

use crate::provider::ProviderError;
use backon::{BackoffBuilder, ExponentialBuilder};
use labenv_common::defaults::DEFAULT_DELETION_WAIT_TIMEOUT_SECS;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for resource waiting with exponential backoff.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Initial delay between checks
    pub initial_delay: Duration,
    /// Maximum delay between checks (cap for exponential growth)
    pub max_delay: Duration,
    /// Maximum total time to wait before timeout
    pub timeout: Duration,
    /// Randomise delays so parallel waiters do not poll in lockstep
    pub jitter: bool,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(DEFAULT_DELETION_WAIT_TIMEOUT_SECS),
            jitter: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("Timed out waiting for {resource} after {elapsed:?} ({attempts} checks)")]
    Timeout {
        resource: String,
        elapsed: Duration,
        attempts: u32,
    },

    #[error("Wait for {resource} cancelled")]
    Cancelled { resource: String },

    #[error("Checking {resource} failed: {source}")]
    Check {
        resource: String,
        #[source]
        source: ProviderError,
    },
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}

/// Wait until `check` returns `Ok(true)`.
///
/// Transient check errors count as "not yet"; any other error ends the wait.
/// Each check and each sleep is bounded by the time left before
/// `config.timeout`, so a hung provider call cannot extend the deadline.
///
/// # Example
/// ```ignore
/// wait_for_resource(
///     &WaitConfig::default(),
///     Some(&cancel),
///     || provider.is_gone(&node),
///     "instance i-0abc",
/// ).await?;
/// ```
pub async fn wait_for_resource<F, Fut>(
    config: &WaitConfig,
    cancel: Option<&CancellationToken>,
    check: F,
    resource_name: &str,
) -> Result<(), WaitError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool, ProviderError>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    let mut builder = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0);
    if config.jitter {
        builder = builder.with_jitter();
    }
    let mut delays = builder.build();

    let timeout = |attempts: u32| WaitError::Timeout {
        resource: resource_name.to_string(),
        elapsed: start.elapsed(),
        attempts,
    };
    let cancelled = || WaitError::Cancelled {
        resource: resource_name.to_string(),
    };

    loop {
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(cancelled());
        }
        let Some(remaining) = config.timeout.checked_sub(start.elapsed()) else {
            return Err(timeout(attempts));
        };

        attempts += 1;
        let ready = match tokio::time::timeout(remaining, check()).await {
            Err(_) => return Err(timeout(attempts)),
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) if e.is_retryable() => {
                debug!(resource = %resource_name, error = %e, "Transient error while waiting");
                false
            }
            Ok(Err(e)) => {
                warn!(resource = %resource_name, error = %e, "Resource check failed");
                return Err(WaitError::Check {
                    resource: resource_name.to_string(),
                    source: e,
                });
            }
        };

        if ready {
            debug!(resource = %resource_name, attempts, "Resource ready");
            return Ok(());
        }

        let delay = delays
            .next()
            .unwrap_or(config.max_delay)
            .min(config.timeout.saturating_sub(start.elapsed()));
        debug!(
            resource = %resource_name,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            "Resource not ready, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                return Err(cancelled());
            }
        }
    }
}
