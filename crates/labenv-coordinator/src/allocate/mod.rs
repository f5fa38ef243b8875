//! Name and address-space allocation
//!
//! Both allocators are pure computations over a snapshot read from
//! [`Inventory`](crate::provider::Inventory) immediately before the call.
//! They hold no state, so they are safe to retry or abandon.

pub mod index;
pub mod subnet;

pub use index::{IndexAllocator, next_index};
pub use subnet::{CandidateRange, SubnetPlanner, allocate_subnet};

use crate::provider::ProviderError;
use ipnet::Ipv4Net;
use thiserror::Error;

/// Allocation errors, always surfaced to the caller unchanged
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// No unused, correctly sized block fits in the parent network or range
    #[error("No /{prefix_len} block available in {parent}")]
    NoSpaceAvailable { parent: Ipv4Net, prefix_len: u8 },

    /// Requested prefix is shorter than the parent's or longer than /32
    #[error("Prefix length /{prefix_len} cannot be carved from {parent}")]
    InvalidPrefixLength { parent: Ipv4Net, prefix_len: u8 },

    /// Candidate range is empty or reversed
    #[error("Invalid candidate range: {0}")]
    InvalidRange(String),

    /// The inventory query feeding the allocation failed
    #[error("Inventory query failed: {0}")]
    Inventory(#[from] ProviderError),
}
