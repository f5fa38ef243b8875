//! Dependency-ordered teardown of a tenant environment
//!
//! A run discovers everything tagged with the scope, then deletes it one
//! [`ResourceKind`] at a time in [`TEARDOWN_ORDER`]. Within a kind, deletions
//! run through a bounded pool; the next kind starts only once every node of
//! the current kind has reached an outcome. Individual failures are recorded
//! in the [`TeardownReport`] and never abort the run, so an operator can
//! re-run teardown after fixing the cause and pick up where it stopped.

mod report;

pub use report::{DiscoveryFailure, Outcome, TeardownEntry, TeardownReport, TeardownSummary};

use crate::config::TeardownConfig;
use crate::provider::{Inventory, ProviderError, ResourceDeleter};
use crate::wait::{WaitError, wait_for_resource};
use backon::Retryable;
use futures::stream::{self, StreamExt};
use labenv_common::{ResourceKind, ResourceNode, ResourceScope, TEARDOWN_ORDER};
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to tear down
#[derive(Debug, Clone)]
pub struct TeardownPlan {
    pub scope: ResourceScope,
    /// Nodes known from elsewhere (an earlier report, deterministic names).
    ///
    /// Merged with discovered nodes so that a node which has already
    /// disappeared is reported as not found instead of silently omitted.
    pub known: Vec<ResourceNode>,
}

impl TeardownPlan {
    pub fn new(scope: ResourceScope) -> Self {
        Self {
            scope,
            known: Vec::new(),
        }
    }

    pub fn with_known(mut self, nodes: impl IntoIterator<Item = ResourceNode>) -> Self {
        self.known.extend(nodes);
        self
    }
}

/// Teardown engine over any provider
pub struct Teardown<P> {
    provider: P,
    config: TeardownConfig,
}

impl<P: Inventory + ResourceDeleter> Teardown<P> {
    pub fn new(provider: P, config: TeardownConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &TeardownConfig {
        &self.config
    }

    /// Tear down everything in `plan.scope`.
    ///
    /// Cancelling `cancel` stops new deletions from starting; deletions
    /// already sent (and their waits) run to completion and the remaining
    /// nodes are reported as skipped.
    pub async fn run(&self, plan: &TeardownPlan, cancel: &CancellationToken) -> TeardownReport {
        let mut report = TeardownReport::start(plan.scope.clone(), self.config.dry_run);
        info!(
            run_id = %report.run_id,
            scope = %plan.scope,
            dry_run = self.config.dry_run,
            concurrency = self.config.concurrency,
            "Starting teardown"
        );

        let mut by_kind = self.discover(plan, &mut report).await;
        let concurrency = self.config.concurrency.max(1);

        for kind in TEARDOWN_ORDER {
            let Some(nodes) = by_kind.remove(&kind) else {
                continue;
            };
            info!(kind = %kind, count = nodes.len(), "Tearing down stage");

            let mut entries: Vec<TeardownEntry> = stream::iter(nodes)
                .map(|node| async move {
                    let outcome = self.teardown_node(&node, cancel).await;
                    TeardownEntry { node, outcome }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
            entries.sort_by(|a, b| a.node.id.cmp(&b.node.id));
            report.entries.extend(entries);
        }

        let report = report.finish(cancel.is_cancelled());
        let summary = &report.summary;
        if summary.failed == 0 && summary.discovery_failures == 0 && !report.cancelled {
            info!(
                run_id = %report.run_id,
                deleted = summary.deleted,
                not_found = summary.not_found,
                skipped = summary.skipped,
                "Teardown finished"
            );
        } else {
            warn!(
                run_id = %report.run_id,
                deleted = summary.deleted,
                not_found = summary.not_found,
                failed = summary.failed,
                skipped = summary.skipped,
                discovery_failures = summary.discovery_failures,
                cancelled = report.cancelled,
                "Teardown finished with leftovers"
            );
        }
        report
    }

    /// Query every kind concurrently and merge in the caller's known nodes.
    ///
    /// Transient listing errors get the same bounded backoff as deletions; a
    /// kind is only recorded as a discovery failure once that is exhausted.
    async fn discover(
        &self,
        plan: &TeardownPlan,
        report: &mut TeardownReport,
    ) -> BTreeMap<ResourceKind, Vec<ResourceNode>> {
        let queries = TEARDOWN_ORDER.iter().map(|&kind| async move {
            let result = (|| self.provider.list_by_tag(&plan.scope, kind))
                .retry(self.config.retry.backoff())
                .when(ProviderError::is_retryable)
                .notify(|e, dur| {
                    warn!(kind = %kind, delay = ?dur, error = %e, "Discovery failed, retrying...");
                })
                .await;
            (kind, result)
        });
        let results = futures::future::join_all(queries).await;

        let mut seen: HashSet<(ResourceKind, String)> = HashSet::new();
        let mut by_kind: BTreeMap<ResourceKind, Vec<ResourceNode>> = BTreeMap::new();
        let mut admit = |node: ResourceNode, source: &str| {
            if !plan.scope.contains(&node.scope) {
                warn!(
                    node = %node.description(),
                    node_scope = %node.scope,
                    scope = %plan.scope,
                    source,
                    "Ignoring node outside the teardown scope"
                );
                return;
            }
            if seen.insert((node.kind, node.id.clone())) {
                by_kind.entry(node.kind).or_default().push(node);
            }
        };

        for (kind, result) in results {
            match result {
                Ok(nodes) => {
                    debug!(kind = %kind, count = nodes.len(), "Discovered");
                    for node in nodes {
                        admit(node, "inventory");
                    }
                }
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Discovery failed, kind left out of this run");
                    report.discovery_failures.push(DiscoveryFailure {
                        kind,
                        error: e.to_string(),
                    });
                }
            }
        }
        for node in &plan.known {
            admit(node.clone(), "known");
        }

        by_kind
    }

    async fn teardown_node(&self, node: &ResourceNode, cancel: &CancellationToken) -> Outcome {
        let description = node.description();

        if self.config.dry_run {
            info!(node = %description, "[DRY RUN] Would delete");
            return Outcome::Skipped {
                reason: "dry run".to_string(),
            };
        }
        if cancel.is_cancelled() {
            debug!(node = %description, "Not started, teardown cancelled");
            return Outcome::Skipped {
                reason: "cancelled".to_string(),
            };
        }

        info!(node = %description, "Deleting");
        let result = (|| self.provider.delete(node))
            .retry(self.config.retry.backoff())
            .when(ProviderError::is_retryable)
            .notify(|e, dur| {
                warn!(
                    node = %description,
                    delay = ?dur,
                    error = %e,
                    "Deletion failed, retrying..."
                );
            })
            .await;

        match result {
            Ok(()) if node.kind.deletion_is_async() => self.await_gone(node, &description).await,
            Ok(()) => {
                info!(node = %description, "Deleted");
                Outcome::Deleted
            }
            Err(e) if e.is_not_found() => {
                info!(node = %description, "Already deleted");
                Outcome::NotFound
            }
            Err(e) => {
                warn!(node = %description, error = %e, "Failed to delete");
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Poll until an accepted deletion has actually completed.
    ///
    /// Not tied to the run's cancellation token: a deletion already sent is
    /// seen through, bounded by the wait timeout.
    async fn await_gone(&self, node: &ResourceNode, description: &str) -> Outcome {
        match wait_for_resource(
            &self.config.wait,
            None,
            || self.provider.is_gone(node),
            description,
        )
        .await
        {
            Ok(()) => {
                info!(node = %description, "Deleted");
                Outcome::Deleted
            }
            Err(WaitError::Timeout { elapsed, .. }) => {
                warn!(node = %description, elapsed = ?elapsed, "Gave up waiting for deletion");
                Outcome::Failed {
                    reason: "timeout".to_string(),
                }
            }
            Err(e) => {
                warn!(node = %description, error = %e, "Failed waiting for deletion");
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
