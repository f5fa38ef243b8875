//! EMR cluster discovery and termination

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::classify_anyhow_error;
use crate::aws::tags::{emr_tags, scoped_node};
use crate::provider::ProviderError;
use anyhow::{Context, Result};
use aws_sdk_emr::Client;
use aws_sdk_emr::types::{ClusterState, ClusterSummary};
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use tracing::{debug, info};

/// Cluster states that still hold instances
const ACTIVE_STATES: [ClusterState; 5] = [
    ClusterState::Starting,
    ClusterState::Bootstrapping,
    ClusterState::Running,
    ClusterState::Waiting,
    ClusterState::Terminating,
];

fn is_terminated(state: Option<&ClusterState>) -> bool {
    matches!(
        state,
        None | Some(ClusterState::Terminated) | Some(ClusterState::TerminatedWithErrors)
    )
}

/// Ids of the listed clusters. Names are not trusted to carry the scope
/// prefix; ownership is decided from tags alone.
fn cluster_ids(summaries: &[ClusterSummary]) -> impl Iterator<Item = String> + '_ {
    summaries
        .iter()
        .filter_map(|summary| summary.id())
        .map(str::to_string)
}

/// EMR client for tenant compute clusters
pub struct EmrClient {
    client: Client,
}

impl FromAwsContext for EmrClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.emr_client(),
        }
    }
}

impl EmrClient {
    /// Active clusters tagged inside `scope`.
    ///
    /// EMR cannot filter by tag server-side, so every active cluster in the
    /// region is described to read its tags, whatever it is named.
    pub async fn list_clusters(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let mut pages = self
            .client
            .list_clusters()
            .set_cluster_states(Some(ACTIVE_STATES.to_vec()))
            .into_paginator()
            .send();

        let mut candidates = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to list EMR clusters")?;
            candidates.extend(cluster_ids(page.clusters()));
        }

        let mut nodes = Vec::new();
        for id in candidates {
            let response = self
                .client
                .describe_cluster()
                .cluster_id(&id)
                .send()
                .await
                .context("Failed to describe EMR cluster");
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let classified = classify_anyhow_error(&e);
                    if classified.is_not_found() {
                        debug!(cluster = %id, error = %classified, "Skipping vanished EMR cluster");
                        continue;
                    }
                    return Err(e);
                }
            };
            let Some(cluster) = response.cluster() else {
                continue;
            };
            let tags = emr_tags(cluster.tags());
            if let Some(mut node) = scoped_node(ResourceKind::ManagedCluster, &id, &tags, scope) {
                if node.name.is_none() {
                    node.name = cluster.name().map(str::to_string);
                }
                nodes.push(node);
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found EMR clusters");
        Ok(nodes)
    }

    pub async fn cluster_state(&self, cluster_id: &str) -> Result<Option<ClusterState>> {
        let response = self
            .client
            .describe_cluster()
            .cluster_id(cluster_id)
            .send()
            .await
            .context("Failed to describe EMR cluster")?;
        Ok(response
            .cluster()
            .and_then(|c| c.status())
            .and_then(|s| s.state())
            .cloned())
    }

    /// Request termination (the cluster shuts down asynchronously)
    pub async fn terminate_cluster(&self, cluster_id: &str) -> Result<()> {
        if is_terminated(self.cluster_state(cluster_id).await?.as_ref()) {
            return Err(ProviderError::not_found(format!("EMR cluster {cluster_id}")).into());
        }

        info!(cluster_id = %cluster_id, "Terminating EMR cluster");
        self.client
            .terminate_job_flows()
            .job_flow_ids(cluster_id)
            .send()
            .await
            .context("Failed to terminate EMR cluster")?;
        Ok(())
    }

    pub async fn is_cluster_terminated(&self, cluster_id: &str) -> Result<bool> {
        let state = self.cluster_state(cluster_id).await?;
        debug!(cluster_id = %cluster_id, state = ?state, "Polled EMR cluster state");
        Ok(is_terminated(state.as_ref()))
    }
}
