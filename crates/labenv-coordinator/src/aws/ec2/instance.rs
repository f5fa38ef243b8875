//! EC2 instance discovery and termination

use super::Ec2Client;
use crate::aws::error::classify_anyhow_error;
use crate::aws::tags::{ec2_scope_filters, ec2_tags, scoped_node};
use crate::provider::ProviderError;
use anyhow::{Context, Result};
use aws_sdk_ec2::types::{Filter, InstanceStateName};
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use tracing::{debug, info};

impl Ec2Client {
    /// Live (not terminated) instances tagged inside `scope`
    pub async fn list_instances(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let mut filters = ec2_scope_filters(scope);
        filters.push(
            Filter::builder()
                .name("instance-state-name")
                .values("pending")
                .values("running")
                .values("shutting-down")
                .values("stopping")
                .values("stopped")
                .build(),
        );

        let mut pages = self
            .client
            .describe_instances()
            .set_filters(Some(filters))
            .into_paginator()
            .send();

        let mut nodes = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to describe instances")?;
            for instance in page.reservations().iter().flat_map(|r| r.instances()) {
                let Some(id) = instance.instance_id() else {
                    continue;
                };
                if let Some(node) =
                    scoped_node(ResourceKind::Instance, id, &ec2_tags(instance.tags()), scope)
                {
                    nodes.push(node);
                }
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found EC2 instances");
        Ok(nodes)
    }

    /// Current state of an instance; `None` once it no longer exists
    pub async fn instance_state(&self, instance_id: &str) -> Result<Option<InstanceStateName>> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("Failed to describe instance");

        match response {
            Ok(resp) => Ok(resp
                .reservations()
                .first()
                .and_then(|r| r.instances().first())
                .and_then(|i| i.state())
                .and_then(|s| s.name())
                .cloned()),
            Err(e) if classify_anyhow_error(&e).is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Terminate an instance
    ///
    /// Fails with [`ProviderError::NotFound`] if the instance is already
    /// terminated; EC2 itself accepts repeated terminations silently.
    pub async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        match self.instance_state(instance_id).await? {
            None | Some(InstanceStateName::Terminated) => {
                return Err(ProviderError::not_found(format!("instance {instance_id}")).into());
            }
            Some(_) => {}
        }

        info!(instance_id = %instance_id, "Terminating instance");
        self.client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("Failed to terminate instance")?;

        Ok(())
    }

    pub async fn is_instance_terminated(&self, instance_id: &str) -> Result<bool> {
        let state = self.instance_state(instance_id).await?;
        debug!(instance_id = %instance_id, state = ?state, "Polled instance state");
        Ok(matches!(state, None | Some(InstanceStateName::Terminated)))
    }
}
