//! Deletable cloud objects discovered by inventory queries

use crate::resource_kind::ResourceKind;
use crate::scope::ResourceScope;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// One deletable cloud object belonging to a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Type of resource
    pub kind: ResourceKind,
    /// Provider identifier (instance id, bucket name, policy ARN, ...)
    pub id: String,
    /// Human-facing name (usually the `Name` tag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Scope the resource was tagged with
    pub scope: ResourceScope,
    /// Address block, for subnets and networks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<Ipv4Net>,
}

impl ResourceNode {
    pub fn new(kind: ResourceKind, id: impl Into<String>, scope: ResourceScope) -> Self {
        Self {
            kind,
            id: id.into(),
            name: None,
            scope,
            cidr: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cidr(mut self, cidr: Ipv4Net) -> Self {
        self.cidr = Some(cidr);
        self
    }

    /// Identity used to de-duplicate nodes from different sources
    pub fn key(&self) -> (ResourceKind, &str) {
        (self.kind, self.id.as_str())
    }

    /// Human-readable description for logging
    pub fn description(&self) -> String {
        match &self.name {
            Some(name) if name != &self.id => format!("{} {} ({})", self.kind, self.id, name),
            _ => format!("{} {}", self.kind, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description() {
        let scope = ResourceScope::new("dlab", "alpha").unwrap();
        let node = ResourceNode::new(ResourceKind::Instance, "i-123", scope.clone())
            .with_name("dlab-alpha-nb-1");
        assert_eq!(node.description(), "instance i-123 (dlab-alpha-nb-1)");

        let bucket = ResourceNode::new(ResourceKind::Bucket, "dlab-alpha-bucket", scope)
            .with_name("dlab-alpha-bucket");
        assert_eq!(bucket.description(), "bucket dlab-alpha-bucket");
    }

    #[test]
    fn test_json_shape() {
        let scope = ResourceScope::new("dlab", "alpha").unwrap();
        let node = ResourceNode::new(ResourceKind::Subnet, "subnet-1", scope)
            .with_cidr("10.0.1.0/24".parse().unwrap());
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "subnet");
        assert_eq!(json["cidr"], "10.0.1.0/24");
        assert!(json.get("name").is_none());
    }
}
