//! Provider capability traits
//!
//! Allocation and teardown are written once against these traits. Each cloud
//! gets an adapter (see [`crate::aws::AwsProvider`]); tests use the in-memory
//! simulated cloud from `labenv-test-utils`.

mod error;

pub use error::ProviderError;

use ipnet::Ipv4Net;
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use std::future::Future;

/// Read-only, tag-filtered lookups against a cloud account.
///
/// Implementations never cache: every call reflects live provider state.
pub trait Inventory: Send + Sync {
    /// All live resources of `kind` tagged inside `scope`.
    ///
    /// Returns an empty list (not an error) when nothing matches.
    fn list_by_tag(
        &self,
        scope: &ResourceScope,
        kind: ResourceKind,
    ) -> impl Future<Output = Result<Vec<ResourceNode>, ProviderError>> + Send;

    /// Address blocks of every subnet in a network, whatever tenant owns them.
    fn list_network_subnets(
        &self,
        network_id: &str,
    ) -> impl Future<Output = Result<Vec<Ipv4Net>, ProviderError>> + Send;

    /// Address block of the network itself
    fn network_block(
        &self,
        network_id: &str,
    ) -> impl Future<Output = Result<Ipv4Net, ProviderError>> + Send;
}

/// Deletion calls, one per resource kind behind a single entry point.
pub trait ResourceDeleter: Send + Sync {
    /// Delete a resource.
    ///
    /// Returns `ProviderError::NotFound` if it does not exist; callers treat
    /// that as success-equivalent.
    fn delete(&self, node: &ResourceNode) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Whether a resource whose deletion was accepted is fully gone.
    ///
    /// Only polled for kinds with [`ResourceKind::deletion_is_async`].
    fn is_gone(
        &self,
        node: &ResourceNode,
    ) -> impl Future<Output = Result<bool, ProviderError>> + Send;
}

impl<T: Inventory> Inventory for &T {
    fn list_by_tag(
        &self,
        scope: &ResourceScope,
        kind: ResourceKind,
    ) -> impl Future<Output = Result<Vec<ResourceNode>, ProviderError>> + Send {
        (**self).list_by_tag(scope, kind)
    }

    fn list_network_subnets(
        &self,
        network_id: &str,
    ) -> impl Future<Output = Result<Vec<Ipv4Net>, ProviderError>> + Send {
        (**self).list_network_subnets(network_id)
    }

    fn network_block(
        &self,
        network_id: &str,
    ) -> impl Future<Output = Result<Ipv4Net, ProviderError>> + Send {
        (**self).network_block(network_id)
    }
}

impl<T: ResourceDeleter> ResourceDeleter for &T {
    fn delete(&self, node: &ResourceNode) -> impl Future<Output = Result<(), ProviderError>> + Send {
        (**self).delete(node)
    }

    fn is_gone(
        &self,
        node: &ResourceNode,
    ) -> impl Future<Output = Result<bool, ProviderError>> + Send {
        (**self).is_gone(node)
    }
}
