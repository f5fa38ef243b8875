//! Conversions between AWS tag shapes and labenv scopes
//!
//! Every service models tags slightly differently (optional keys on EC2 and
//! EMR, required keys on S3 and IAM), so each gets its own `*_tags` helper
//! producing the same `HashMap` consumed by [`labenv_common::tags`].

use aws_sdk_ec2::types::Filter;
use labenv_common::tags::{TAG_NAME, matches_scope, scope_from_tags, scope_tags};
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use std::collections::HashMap;

/// EC2 tag filters matching every resource inside `scope`
pub fn ec2_scope_filters(scope: &ResourceScope) -> Vec<Filter> {
    scope_tags(scope)
        .into_iter()
        .map(|(key, value)| {
            Filter::builder()
                .name(format!("tag:{key}"))
                .values(value)
                .build()
        })
        .collect()
}

pub fn ec2_tags(tags: &[aws_sdk_ec2::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
        .collect()
}

pub fn emr_tags(tags: &[aws_sdk_emr::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
        .collect()
}

pub fn s3_tags(tags: &[aws_sdk_s3::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .map(|t| (t.key().to_string(), t.value().to_string()))
        .collect()
}

pub fn iam_tags(tags: &[aws_sdk_iam::types::Tag]) -> HashMap<String, String> {
    tags.iter()
        .map(|t| (t.key().to_string(), t.value().to_string()))
        .collect()
}

/// The `Name` tag, if set
pub fn name_tag(tags: &HashMap<String, String>) -> Option<String> {
    tags.get(TAG_NAME).filter(|n| !n.is_empty()).cloned()
}

/// Build a node for a resource whose tags place it inside `scope`
pub fn scoped_node(
    kind: ResourceKind,
    id: &str,
    tags: &HashMap<String, String>,
    scope: &ResourceScope,
) -> Option<ResourceNode> {
    if !matches_scope(tags, scope) {
        return None;
    }
    let node = ResourceNode::new(kind, id, scope_from_tags(tags)?);
    Some(match name_tag(tags) {
        Some(name) => node.with_name(name),
        None => node,
    })
}
