//! Default configuration values shared by every labenv component

/// Default number of same-kind deletions in flight at once
pub const DEFAULT_TEARDOWN_CONCURRENCY: usize = 8;

/// Default timeout while waiting for an asynchronous deletion (15 minutes).
///
/// Managed clusters regularly take 5-10 minutes to reach a terminated state.
pub const DEFAULT_DELETION_WAIT_TIMEOUT_SECS: u64 = 900;

/// Default number of retries for transient provider errors
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// Default prefix length for tenant subnets
pub const DEFAULT_SUBNET_PREFIX_LEN: u8 = 24;

/// Default cloud region
pub const DEFAULT_REGION: &str = "us-west-2";
