//! labenv-common - Shared types for tenant environment lifecycle
//!
//! This crate provides the vocabulary used by allocators, teardown and
//! provider adapters, without any cloud SDK dependencies to keep it
//! lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`node`]: Deletable resources returned by inventory queries
//! - [`resource_kind`]: Resource kinds and the fixed teardown order
//! - [`scope`]: Tenant scopes and allocated names
//! - [`tags`]: Resource tag constants for discovery and teardown

pub mod defaults;
pub mod node;
pub mod resource_kind;
pub mod scope;
pub mod tags;

// Re-export commonly used types
pub use node::ResourceNode;
pub use resource_kind::{ResourceKind, TEARDOWN_ORDER};
pub use scope::{AllocatedName, ResourceScope, ScopeError};

pub use ipnet::Ipv4Net;
