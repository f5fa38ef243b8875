//! Helpers for tests that run against a real AWS account
//!
//! These back the `#[ignore]` integration tests; nothing here talks to AWS
//! itself.

use chrono::Utc;
use labenv_common::ResourceScope;
use labenv_common::defaults::DEFAULT_REGION;

/// Service base name for resources created by live tests
pub const LIVE_TEST_SERVICE_BASE_NAME: &str = "labenv-it";

/// Get the AWS region for tests.
///
/// Checks `AWS_REGION`, then `AWS_DEFAULT_REGION`, then falls back to the
/// crate default.
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| DEFAULT_REGION.to_string())
}

/// Unique tenant id for one test run.
///
/// Format: `test-{timestamp_ms}-{counter}`, valid as a scope component, so
/// concurrent runs never see each other's resources.
pub fn test_tenant() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{ts}-{counter}")
}

/// Fresh tenant scope for a live test
pub fn live_test_scope() -> ResourceScope {
    ResourceScope::new(LIVE_TEST_SERVICE_BASE_NAME, &test_tenant())
        .expect("generated tenant is a valid scope component")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_test_region_default() {
        let original_region = std::env::var("AWS_REGION").ok();
        let original_default = std::env::var("AWS_DEFAULT_REGION").ok();

        // SAFETY: only this test touches these variables in this crate.
        unsafe {
            std::env::remove_var("AWS_REGION");
            std::env::remove_var("AWS_DEFAULT_REGION");
        }

        assert_eq!(get_test_region(), DEFAULT_REGION);

        unsafe {
            if let Some(r) = original_region {
                std::env::set_var("AWS_REGION", r);
            }
            if let Some(r) = original_default {
                std::env::set_var("AWS_DEFAULT_REGION", r);
            }
        }
    }

    #[test]
    fn test_tenant_format() {
        let tenant = test_tenant();
        let parts: Vec<&str> = tenant.strip_prefix("test-").unwrap().split('-').collect();
        assert_eq!(parts.len(), 2);
        parts[0].parse::<i64>().expect("Should be valid timestamp");
        parts[1].parse::<u32>().expect("Should be valid counter");
    }

    #[test]
    fn test_tenants_unique() {
        let a = test_tenant();
        let b = test_tenant();
        assert_ne!(a, b);
    }

    #[test]
    fn test_live_scope_prefix() {
        let scope = live_test_scope();
        assert!(scope.prefix().starts_with("labenv-it-test-"));
    }
}
