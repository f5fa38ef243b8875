//! Cloud resource tag constants for labenv
//!
//! Every labenv-provisioned resource is tagged with these standard tags so
//! inventory queries can find it again without any local state.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `labenv:tool` | Static identifier ("labenv") |
//! | `labenv:service-base-name` | Deployment-wide service base name |
//! | `labenv:tenant` | Tenant/project the resource belongs to |
//! | `labenv:resource-type` | Resource type within the tenant (optional) |
//! | `labenv:created-at` | RFC 3339 creation timestamp |
//! | `labenv:status` | Lifecycle status (`active`) |
//! | `Name` | The allocated name |

use crate::scope::ResourceScope;
use std::collections::HashMap;

/// Tag key for tool identification - all labenv resources have this
pub const TAG_TOOL: &str = "labenv:tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "labenv";

/// Tag key for the service base name
pub const TAG_SERVICE_BASE_NAME: &str = "labenv:service-base-name";

/// Tag key for the tenant
pub const TAG_TENANT: &str = "labenv:tenant";

/// Tag key for the resource type within a tenant
pub const TAG_RESOURCE_TYPE: &str = "labenv:resource-type";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "labenv:created-at";

/// Tag key for resource lifecycle status
pub const TAG_STATUS: &str = "labenv:status";

/// Provider-conventional name tag
pub const TAG_NAME: &str = "Name";

/// Resource lifecycle status values
pub mod status {
    /// Resource is active and in use
    pub const ACTIVE: &str = "active";
}

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339()
}

/// Helper to parse creation timestamp from tags
pub fn parse_created_at(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Tag pairs identifying `scope`, tool tag included.
///
/// Used both to tag new resources and to build provider-side tag filters.
pub fn scope_tags(scope: &ResourceScope) -> Vec<(&'static str, String)> {
    let mut tags = vec![
        (TAG_TOOL, TAG_TOOL_VALUE.to_string()),
        (TAG_SERVICE_BASE_NAME, scope.service_base_name().to_string()),
        (TAG_TENANT, scope.tenant().to_string()),
    ];
    if let Some(rt) = scope.resource_type() {
        tags.push((TAG_RESOURCE_TYPE, rt.to_string()));
    }
    tags
}

/// Rebuild the scope a resource was tagged with.
///
/// Returns `None` for resources not created by labenv or with malformed tags.
pub fn scope_from_tags(tags: &HashMap<String, String>) -> Option<ResourceScope> {
    if tags.get(TAG_TOOL).map(String::as_str) != Some(TAG_TOOL_VALUE) {
        return None;
    }
    let scope = ResourceScope::new(tags.get(TAG_SERVICE_BASE_NAME)?, tags.get(TAG_TENANT)?).ok()?;
    match tags.get(TAG_RESOURCE_TYPE) {
        Some(rt) => scope.with_resource_type(rt).ok(),
        None => Some(scope),
    }
}

/// Whether a resource's tags place it inside `scope`
pub fn matches_scope(tags: &HashMap<String, String>, scope: &ResourceScope) -> bool {
    scope_from_tags(tags).is_some_and(|tagged| scope.contains(&tagged))
}
