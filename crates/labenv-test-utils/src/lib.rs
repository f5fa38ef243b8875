//! Shared test utilities for labenv
//!
//! This crate sits outside the coordinator so integration and property tests
//! can drive allocation and teardown against an in-memory provider.
//!
//! ## Modules
//!
//! - [`aws`]: Region and tenant helpers for live AWS tests
//! - [`simulated`]: [`SimulatedCloud`], an in-memory provider with fault
//!   injection and a call log

pub mod aws;
pub mod simulated;

use labenv_common::ResourceScope;
use labenv_coordinator::config::{RetryConfig, TeardownConfig};
use labenv_coordinator::wait::WaitConfig;
use std::time::Duration;

pub use aws::{get_test_region, live_test_scope, test_tenant};
pub use simulated::{Call, CallKind, Fault, SimulatedCloud, Violation};

/// Tenant scope used throughout the simulated tests
pub fn test_scope() -> ResourceScope {
    ResourceScope::new("dlab", "alpha").expect("valid scope")
}

/// A second tenant under the same service base name
pub fn other_tenant_scope() -> ResourceScope {
    ResourceScope::new("dlab", "beta").expect("valid scope")
}

/// Teardown settings with millisecond delays, for tests
pub fn fast_teardown_config() -> TeardownConfig {
    TeardownConfig {
        concurrency: 4,
        dry_run: false,
        retry: RetryConfig {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_times: 5,
        },
        wait: WaitConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
            jitter: false,
        },
    }
}
