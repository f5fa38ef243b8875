//! Cloud resource kinds and teardown ordering
//!
//! Provides one deletion order shared by every teardown path. Resources must
//! be deleted in dependency order or the provider rejects the call (a subnet
//! cannot go while an instance still has an interface in it, a network cannot
//! go while it still has subnets).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Types of cloud resources that make up a tenant environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Managed Spark/Hadoop cluster (must shut down before its instances' groups go)
    ManagedCluster,
    /// Compute instance (notebook VM, edge gateway)
    Instance,
    /// Security group (depends on instances being terminated)
    SecurityGroup,
    /// Subnet carved from the parent network
    Subnet,
    /// Route table (non-main tables only)
    RouteTable,
    /// Object storage bucket
    Bucket,
    /// Identity role, together with its instance profiles and inline policies
    IdentityRole,
    /// Customer-managed identity policy
    IdentityPolicy,
    /// Parent virtual network
    Network,
}

/// Fixed teardown order. Every node of one kind reaches a terminal state
/// before any node of the next kind is attempted.
pub const TEARDOWN_ORDER: [ResourceKind; 9] = [
    ResourceKind::ManagedCluster,
    ResourceKind::Instance,
    ResourceKind::SecurityGroup,
    ResourceKind::Subnet,
    ResourceKind::RouteTable,
    ResourceKind::Bucket,
    ResourceKind::IdentityRole,
    ResourceKind::IdentityPolicy,
    ResourceKind::Network,
];

impl ResourceKind {
    /// Position in [`TEARDOWN_ORDER`] (lower number = delete first)
    pub fn teardown_stage(self) -> u8 {
        match self {
            ResourceKind::ManagedCluster => 0,
            ResourceKind::Instance => 1,
            ResourceKind::SecurityGroup => 2,
            ResourceKind::Subnet => 3,
            ResourceKind::RouteTable => 4,
            ResourceKind::Bucket => 5,
            ResourceKind::IdentityRole => 6,
            ResourceKind::IdentityPolicy => 7,
            ResourceKind::Network => 8,
        }
    }

    /// Whether the provider acknowledges deletion before the resource is gone.
    ///
    /// Nodes of these kinds are polled until gone before the next stage starts.
    pub fn deletion_is_async(self) -> bool {
        matches!(self, ResourceKind::ManagedCluster | ResourceKind::Instance)
    }

    /// Stable name used in logs, tags and JSON output
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ManagedCluster => "managed-cluster",
            ResourceKind::Instance => "instance",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::Bucket => "bucket",
            ResourceKind::IdentityRole => "identity-role",
            ResourceKind::IdentityPolicy => "identity-policy",
            ResourceKind::Network => "network",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TEARDOWN_ORDER
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind: {s}"))
    }
}
