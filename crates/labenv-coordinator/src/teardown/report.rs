//! Teardown outcomes and the per-run report

use chrono::{DateTime, Utc};
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What happened to one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    Deleted,
    /// Already absent when deletion was attempted
    NotFound,
    Failed { reason: String },
    /// Never attempted (dry run, or the run was cancelled first)
    Skipped { reason: String },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Deleted => "deleted",
            Outcome::NotFound => "not-found",
            Outcome::Failed { .. } => "failed",
            Outcome::Skipped { .. } => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Failed { reason } | Outcome::Skipped { reason } => {
                write!(f, "{}: {}", self.as_str(), reason)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownEntry {
    pub node: ResourceNode,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// A kind whose discovery query failed; its resources may still exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFailure {
    pub kind: ResourceKind,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownSummary {
    pub deleted: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
    pub discovery_failures: usize,
}

/// Result of one teardown run.
///
/// Entries are grouped by kind in teardown order and sorted by id within a
/// kind. Every node known to the run appears exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownReport {
    pub run_id: Uuid,
    pub scope: ResourceScope,
    pub dry_run: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<TeardownEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discovery_failures: Vec<DiscoveryFailure>,
    pub summary: TeardownSummary,
}

impl TeardownReport {
    pub(crate) fn start(scope: ResourceScope, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            scope,
            dry_run,
            cancelled: false,
            started_at: now,
            finished_at: now,
            entries: Vec::new(),
            discovery_failures: Vec::new(),
            summary: TeardownSummary::default(),
        }
    }

    pub(crate) fn finish(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self.finished_at = Utc::now();
        self.summary = self.entries.iter().fold(
            TeardownSummary {
                discovery_failures: self.discovery_failures.len(),
                ..Default::default()
            },
            |mut acc, entry| {
                match entry.outcome {
                    Outcome::Deleted => acc.deleted += 1,
                    Outcome::NotFound => acc.not_found += 1,
                    Outcome::Failed { .. } => acc.failed += 1,
                    Outcome::Skipped { .. } => acc.skipped += 1,
                }
                acc
            },
        );
        self
    }

    /// Entries whose deletion failed
    pub fn failed(&self) -> impl Iterator<Item = &TeardownEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    /// Every node the run knew about, for feeding into a later run
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.entries.iter().map(|e| &e.node)
    }

    pub fn entries_of(&self, kind: ResourceKind) -> impl Iterator<Item = &TeardownEntry> {
        self.entries.iter().filter(move |e| e.node.kind == kind)
    }

    pub fn outcome_of(&self, kind: ResourceKind, id: &str) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|e| e.node.key() == (kind, id))
            .map(|e| &e.outcome)
    }

    /// Nothing failed, nothing was skipped and every kind was discovered
    pub fn is_complete(&self) -> bool {
        self.summary.failed == 0 && self.summary.skipped == 0 && self.discovery_failures.is_empty()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: ResourceKind, id: &str) -> ResourceNode {
        ResourceNode::new(kind, id, ResourceScope::new("dlab", "alpha").unwrap())
    }

    fn report() -> TeardownReport {
        let mut report = TeardownReport::start(ResourceScope::new("dlab", "alpha").unwrap(), false);
        report.entries = vec![
            TeardownEntry {
                node: node(ResourceKind::Instance, "i-1"),
                outcome: Outcome::Deleted,
            },
            TeardownEntry {
                node: node(ResourceKind::SecurityGroup, "sg-1"),
                outcome: Outcome::Failed {
                    reason: "DependencyViolation".into(),
                },
            },
            TeardownEntry {
                node: node(ResourceKind::Bucket, "dlab-alpha-bucket"),
                outcome: Outcome::NotFound,
            },
        ];
        report.finish(false)
    }

    #[test]
    fn summary_counts_outcomes() {
        let report = report();
        assert_eq!(
            report.summary,
            TeardownSummary {
                deleted: 1,
                not_found: 1,
                failed: 1,
                skipped: 0,
                discovery_failures: 0,
            }
        );
        assert!(!report.is_complete());
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.nodes().count(), 3);
        assert_eq!(
            report.outcome_of(ResourceKind::Bucket, "dlab-alpha-bucket"),
            Some(&Outcome::NotFound)
        );
        assert!(report.duration() >= chrono::Duration::zero());
    }

    #[test]
    fn json_shape() {
        let report = report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["outcome"], "deleted");
        assert_eq!(json["entries"][0]["node"]["kind"], "instance");
        assert_eq!(json["entries"][1]["outcome"], "failed");
        assert_eq!(json["entries"][1]["reason"], "DependencyViolation");
        assert_eq!(json["summary"]["failed"], 1);
        assert!(json.get("discovery_failures").is_none());

        let back: TeardownReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.entries, report.entries);
        assert_eq!(back.run_id, report.run_id);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::NotFound.to_string(), "not-found");
        assert_eq!(
            Outcome::Skipped {
                reason: "dry run".into()
            }
            .to_string(),
            "skipped: dry run"
        );
    }
}
