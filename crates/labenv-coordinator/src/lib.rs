//! labenv-coordinator - Tenant environment allocation and teardown
//!
//! Names, subnets and teardown for per-tenant research environments, written
//! against the provider traits in [`provider`] with an AWS adapter in [`aws`].
//! The `labenv` binary is a thin operator front-end over this library.

pub mod allocate;
pub mod aws;
pub mod config;
pub mod provider;
pub mod teardown;
pub mod wait;

pub use allocate::{AllocationError, CandidateRange, IndexAllocator, SubnetPlanner};
pub use provider::{Inventory, ProviderError, ResourceDeleter};
pub use teardown::{Outcome, Teardown, TeardownPlan, TeardownReport};
