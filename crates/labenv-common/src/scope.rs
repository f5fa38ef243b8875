//! Tenant scopes and the names allocated inside them
//!
//! A [`ResourceScope`] is never stored by labenv. It is rebuilt from
//! caller-supplied identifiers (or from resource tags) on every call, and the
//! uniqueness of an [`AllocatedName`] is enforced by re-reading live inventory.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Scope validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// A scope component is empty after trimming
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A scope component contains characters that cannot appear in resource names
    #[error("{field} must only contain [a-z0-9-] and not start or end with '-', got: {value}")]
    InvalidCharacters { field: &'static str, value: String },
}

/// Identifies the tenant/project/resource-type a name or address belongs to
///
/// A scope without a resource type covers the whole tenant environment and is
/// what teardown operates on. A scope with a resource type (e.g. `nb` for
/// notebooks) is what name allocation operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceScope {
    service_base_name: String,
    tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
}

impl ResourceScope {
    /// Create a tenant-wide scope
    ///
    /// Components are trimmed, lower-cased and `_` is replaced by `-`, the
    /// same normalisation applied to names handed to the provider.
    pub fn new(service_base_name: &str, tenant: &str) -> Result<Self, ScopeError> {
        Ok(Self {
            service_base_name: normalize("service_base_name", service_base_name)?,
            tenant: normalize("tenant", tenant)?,
            resource_type: None,
        })
    }

    /// Narrow the scope to one resource type
    pub fn with_resource_type(mut self, resource_type: &str) -> Result<Self, ScopeError> {
        self.resource_type = Some(normalize("resource_type", resource_type)?);
        Ok(self)
    }

    pub fn service_base_name(&self) -> &str {
        &self.service_base_name
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    /// The tenant-wide scope this scope belongs to
    pub fn tenant_scope(&self) -> Self {
        Self {
            resource_type: None,
            ..self.clone()
        }
    }

    /// Name prefix shared by every allocated name in this scope
    pub fn prefix(&self) -> String {
        match &self.resource_type {
            Some(rt) => format!("{}-{}-{}", self.service_base_name, self.tenant, rt),
            None => format!("{}-{}", self.service_base_name, self.tenant),
        }
    }

    /// Whether `other` falls inside this scope
    ///
    /// A tenant-wide scope contains every resource-type scope of that tenant.
    pub fn contains(&self, other: &ResourceScope) -> bool {
        self.service_base_name == other.service_base_name
            && self.tenant == other.tenant
            && match &self.resource_type {
                Some(rt) => other.resource_type.as_ref() == Some(rt),
                None => true,
            }
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

fn normalize(field: &'static str, value: &str) -> Result<String, ScopeError> {
    let value = value.trim().to_lowercase().replace('_', "-");
    if value.is_empty() {
        return Err(ScopeError::Empty { field });
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars || value.starts_with('-') || value.ends_with('-') {
        return Err(ScopeError::InvalidCharacters { field, value });
    }
    Ok(value)
}

/// A name of the form `<scope-prefix>-<index>`, with `index >= 1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocatedName {
    prefix: String,
    index: u32,
}

impl AllocatedName {
    /// Build the name for `index` in `scope`.
    ///
    /// # Panics
    /// Panics if `index` is zero; indices are always positive.
    pub fn new(scope: &ResourceScope, index: u32) -> Self {
        assert!(index >= 1, "allocated indices start at 1");
        Self {
            prefix: scope.prefix(),
            index,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extract the trailing index from `name` if it was allocated under `prefix`.
    ///
    /// Returns `None` for names of other scopes and for malformed names (no
    /// digits after the prefix, a zero index, or an index that overflows).
    pub fn parse_index(prefix: &str, name: &str) -> Option<u32> {
        let suffix = name.strip_prefix(prefix)?.strip_prefix('-')?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse::<u32>().ok().filter(|&i| i >= 1)
    }
}

impl fmt::Display for AllocatedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ResourceScope {
        ResourceScope::new("dlab", "team_alpha")
            .unwrap()
            .with_resource_type("nb")
            .unwrap()
    }

    #[test]
    fn test_normalisation() {
        let s = ResourceScope::new("  DLab ", "Team_Alpha").unwrap();
        assert_eq!(s.service_base_name(), "dlab");
        assert_eq!(s.tenant(), "team-alpha");
        assert_eq!(s.prefix(), "dlab-team-alpha");
    }

    #[test]
    fn test_rejects_invalid_components() {
        assert_eq!(
            ResourceScope::new("", "t"),
            Err(ScopeError::Empty {
                field: "service_base_name"
            })
        );
        assert!(matches!(
            ResourceScope::new("dlab", "team/alpha"),
            Err(ScopeError::InvalidCharacters { field: "tenant", .. })
        ));
        assert!(matches!(
            ResourceScope::new("dlab", "-alpha"),
            Err(ScopeError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn test_prefix_with_resource_type() {
        assert_eq!(scope().prefix(), "dlab-team-alpha-nb");
        assert_eq!(scope().to_string(), "dlab-team-alpha-nb");
    }

    #[test]
    fn test_contains() {
        let tenant = scope().tenant_scope();
        assert!(tenant.contains(&scope()));
        assert!(!scope().contains(&tenant));
        let other = ResourceScope::new("dlab", "team-beta").unwrap();
        assert!(!tenant.contains(&other));
    }

    #[test]
    fn test_allocated_name_display() {
        let name = AllocatedName::new(&scope(), 3);
        assert_eq!(name.to_string(), "dlab-team-alpha-nb-3");
        assert_eq!(name.index(), 3);
    }

    #[test]
    fn test_parse_index() {
        let prefix = "dlab-team-alpha-nb";
        assert_eq!(AllocatedName::parse_index(prefix, "dlab-team-alpha-nb-12"), Some(12));
        assert_eq!(AllocatedName::parse_index(prefix, "dlab-team-alpha-nb-"), None);
        assert_eq!(AllocatedName::parse_index(prefix, "dlab-team-alpha-nb-0"), None);
        assert_eq!(AllocatedName::parse_index(prefix, "dlab-team-alpha-nb-x1"), None);
        assert_eq!(AllocatedName::parse_index(prefix, "dlab-team-alpha-nb-1-2"), None);
        assert_eq!(AllocatedName::parse_index(prefix, "dlab-team-alpha-nb7"), None);
        assert_eq!(AllocatedName::parse_index(prefix, "dlab-team-beta-nb-1"), None);
        assert_eq!(
            AllocatedName::parse_index(prefix, "dlab-team-alpha-nb-99999999999"),
            None
        );
    }

    #[test]
    #[should_panic(expected = "start at 1")]
    fn test_zero_index_panics() {
        AllocatedName::new(&scope(), 0);
    }
}
