//! Security group discovery and deletion

use super::Ec2Client;
use crate::aws::tags::{ec2_scope_filters, ec2_tags, scoped_node};
use anyhow::{Context, Result};
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use tracing::{debug, info};

impl Ec2Client {
    pub async fn list_security_groups(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let mut pages = self
            .client
            .describe_security_groups()
            .set_filters(Some(ec2_scope_filters(scope)))
            .into_paginator()
            .send();

        let mut nodes = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to describe security groups")?;
            for sg in page.security_groups() {
                // The default group is deleted with its VPC
                if sg.group_name() == Some("default") {
                    continue;
                }
                let Some(id) = sg.group_id() else {
                    continue;
                };
                let tags = ec2_tags(sg.tags());
                if let Some(mut node) = scoped_node(ResourceKind::SecurityGroup, id, &tags, scope) {
                    if node.name.is_none() {
                        node.name = sg.group_name().map(str::to_string);
                    }
                    nodes.push(node);
                }
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found security groups");
        Ok(nodes)
    }

    /// Delete a security group
    ///
    /// `DependencyViolation` (interfaces of terminated instances still
    /// releasing) surfaces as a transient error for the caller to retry.
    pub async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        info!(sg_id = %security_group_id, "Deleting security group");

        self.client
            .delete_security_group()
            .group_id(security_group_id)
            .send()
            .await
            .context("Failed to delete security group")?;

        Ok(())
    }
}
