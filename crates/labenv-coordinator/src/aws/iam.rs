//! IAM role and managed policy discovery and deletion

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::classify_anyhow_error;
use crate::aws::tags::{iam_tags, scoped_node};
use anyhow::{Context, Result};
use aws_sdk_iam::Client;
use aws_sdk_iam::types::PolicyScopeType;
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use tracing::{debug, info};

/// Map a tag lookup on an entity deleted since it was listed to `None`
fn unless_vanished<T>(result: Result<T>, entity: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let classified = classify_anyhow_error(&e);
            if classified.is_not_found() {
                debug!(entity = %entity, error = %classified, "Skipping IAM entity deleted while listing");
                return Ok(None);
            }
            Err(e)
        }
    }
}

/// IAM client for tenant roles, instance profiles and policies
pub struct IamClient {
    client: Client,
}

impl FromAwsContext for IamClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }
}

impl IamClient {
    /// Roles tagged inside `scope`; the node id is the role name
    pub async fn list_roles(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let prefix = scope.prefix();
        let mut nodes = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_roles()
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list IAM roles")?;

            for role in response.roles() {
                let role_name = role.role_name();
                if !role_name.starts_with(&prefix) {
                    continue;
                }
                let tags = self
                    .client
                    .list_role_tags()
                    .role_name(role_name)
                    .send()
                    .await
                    .context("Failed to list IAM role tags");
                let Some(tags) = unless_vanished(tags, role_name)? else {
                    continue;
                };
                if let Some(mut node) =
                    scoped_node(ResourceKind::IdentityRole, role_name, &iam_tags(tags.tags()), scope)
                {
                    node.name = Some(role_name.to_string());
                    nodes.push(node);
                }
            }

            if response.is_truncated() {
                marker = response.marker().map(str::to_string);
            } else {
                break;
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found IAM roles");
        Ok(nodes)
    }

    /// Delete a role after removing it from its instance profiles (which are
    /// deleted too) and dropping its inline and attached policies
    pub async fn delete_role(&self, role_name: &str) -> Result<()> {
        info!(role = %role_name, "Deleting IAM role");

        let profiles = self
            .client
            .list_instance_profiles_for_role()
            .role_name(role_name)
            .send()
            .await
            .context("Failed to list instance profiles for role")?;
        for profile in profiles.instance_profiles() {
            let profile_name = profile.instance_profile_name();
            debug!(role = %role_name, profile = %profile_name, "Removing role from instance profile");
            self.client
                .remove_role_from_instance_profile()
                .instance_profile_name(profile_name)
                .role_name(role_name)
                .send()
                .await
                .context("Failed to remove role from instance profile")?;
            self.client
                .delete_instance_profile()
                .instance_profile_name(profile_name)
                .send()
                .await
                .context("Failed to delete instance profile")?;
        }

        let inline = self
            .client
            .list_role_policies()
            .role_name(role_name)
            .send()
            .await
            .context("Failed to list inline role policies")?;
        for policy_name in inline.policy_names() {
            self.client
                .delete_role_policy()
                .role_name(role_name)
                .policy_name(policy_name)
                .send()
                .await
                .context("Failed to delete inline role policy")?;
        }

        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .send()
            .await
            .context("Failed to list attached role policies")?;
        for policy_arn in attached.attached_policies().iter().filter_map(|p| p.policy_arn()) {
            self.client
                .detach_role_policy()
                .role_name(role_name)
                .policy_arn(policy_arn)
                .send()
                .await
                .context("Failed to detach role policy")?;
        }

        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .context("Failed to delete IAM role")?;
        Ok(())
    }

    /// Customer-managed policies tagged inside `scope`; the node id is the ARN
    pub async fn list_policies(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let prefix = scope.prefix();
        let mut nodes = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_policies()
                .scope(PolicyScopeType::Local)
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list IAM policies")?;

            for policy in response.policies() {
                let (Some(arn), Some(name)) = (policy.arn(), policy.policy_name()) else {
                    continue;
                };
                if !name.starts_with(&prefix) {
                    continue;
                }
                let tags = self
                    .client
                    .list_policy_tags()
                    .policy_arn(arn)
                    .send()
                    .await
                    .context("Failed to list IAM policy tags");
                let Some(tags) = unless_vanished(tags, arn)? else {
                    continue;
                };
                if let Some(mut node) =
                    scoped_node(ResourceKind::IdentityPolicy, arn, &iam_tags(tags.tags()), scope)
                {
                    node.name = Some(name.to_string());
                    nodes.push(node);
                }
            }

            if response.is_truncated() {
                marker = response.marker().map(str::to_string);
            } else {
                break;
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found IAM policies");
        Ok(nodes)
    }

    /// Detach a managed policy everywhere, drop its non-default versions,
    /// then delete it
    pub async fn delete_policy(&self, policy_arn: &str) -> Result<()> {
        info!(policy = %policy_arn, "Deleting IAM policy");

        let entities = self
            .client
            .list_entities_for_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .context("Failed to list entities for policy")?;
        for role in entities.policy_roles().iter().filter_map(|r| r.role_name()) {
            self.client
                .detach_role_policy()
                .role_name(role)
                .policy_arn(policy_arn)
                .send()
                .await
                .context("Failed to detach policy from role")?;
        }
        for user in entities.policy_users().iter().filter_map(|u| u.user_name()) {
            self.client
                .detach_user_policy()
                .user_name(user)
                .policy_arn(policy_arn)
                .send()
                .await
                .context("Failed to detach policy from user")?;
        }
        for group in entities.policy_groups().iter().filter_map(|g| g.group_name()) {
            self.client
                .detach_group_policy()
                .group_name(group)
                .policy_arn(policy_arn)
                .send()
                .await
                .context("Failed to detach policy from group")?;
        }

        let versions = self
            .client
            .list_policy_versions()
            .policy_arn(policy_arn)
            .send()
            .await
            .context("Failed to list policy versions")?;
        for version in versions.versions().iter().filter(|v| !v.is_default_version()) {
            if let Some(version_id) = version.version_id() {
                self.client
                    .delete_policy_version()
                    .policy_arn(policy_arn)
                    .version_id(version_id)
                    .send()
                    .await
                    .context("Failed to delete policy version")?;
            }
        }

        self.client
            .delete_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .context("Failed to delete IAM policy")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    #[test]
    fn entity_deleted_while_listing_is_skipped() {
        let gone: Result<()> = Err(anyhow::Error::new(ProviderError::not_found("dlab-alpha-role"))
            .context("Failed to list IAM role tags"));
        assert!(unless_vanished(gone, "dlab-alpha-role").unwrap().is_none());

        let gone: Result<()> = Err(anyhow::anyhow!(
            r#"ServiceError {{ code: Some("NoSuchEntity"), message: "The role cannot be found" }}"#
        ));
        assert!(unless_vanished(gone, "dlab-alpha-role").unwrap().is_none());
    }

    #[test]
    fn other_tag_lookup_errors_propagate() {
        let denied: Result<()> =
            Err(anyhow::anyhow!(r#"ServiceError {{ code: Some("AccessDenied") }}"#));
        assert!(unless_vanished(denied, "dlab-alpha-role").is_err());

        assert_eq!(unless_vanished(Ok(3), "dlab-alpha-role").unwrap(), Some(3));
    }
}
