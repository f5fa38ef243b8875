//! In-memory cloud for allocation and teardown tests
//!
//! [`SimulatedCloud`] keeps tagged resources in a map and implements the
//! coordinator's provider traits over it. It behaves like a real account in
//! the ways teardown cares about:
//!
//! - clusters and instances go through a "terminating" phase and only vanish
//!   after a few `is_gone` polls
//! - deleting a resource while something that depends on it still exists
//!   fails with a retryable `DependencyViolation` and is logged as a
//!   [`Violation`]
//! - per-resource [`Fault`]s inject throttling, rejections, stuck deletions
//!   and resources that vanish underneath the caller
//!
//! Every provider call is appended to a log so tests can check ordering.

use chrono::Utc;
use ipnet::Ipv4Net;
use labenv_common::tags::{TAG_CREATED_AT, TAG_NAME, TAG_STATUS, format_created_at, matches_scope, scope_tags, status};
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use labenv_coordinator::{Inventory, ProviderError, ResourceDeleter};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Key = (ResourceKind, String);

type DeleteHook = Box<dyn Fn(&ResourceNode) + Send + Sync>;

/// Injected misbehaviour for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Throttle this many delete calls, then behave normally
    Transient { times: u32 },
    /// Reject every delete call
    Fatal,
    /// Accept the deletion but never finish it
    Stuck,
    /// Disappear just before the delete call lands
    Vanish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    List,
    Delete,
    Poll,
}

/// One provider call, in the order the cloud saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub seq: usize,
    pub op: CallKind,
    pub kind: ResourceKind,
    pub id: Option<String>,
}

/// A delete attempted while a dependent resource still existed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ResourceKind,
    pub id: String,
    pub blocked_by: (ResourceKind, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live,
    Deleting { polls_left: u32 },
    Stuck,
}

#[derive(Debug, Clone)]
struct SimResource {
    node: ResourceNode,
    tags: HashMap<String, String>,
    network: Option<String>,
    phase: Phase,
}

/// Kinds whose live resources block deletion of `kind` in the same tenant
fn blocked_by(kind: ResourceKind) -> &'static [ResourceKind] {
    use ResourceKind::*;
    match kind {
        SecurityGroup | Subnet => &[ManagedCluster, Instance],
        Network => &[ManagedCluster, Instance, SecurityGroup, Subnet, RouteTable],
        IdentityPolicy => &[IdentityRole],
        ManagedCluster | Instance | RouteTable | Bucket | IdentityRole => &[],
    }
}

#[derive(Default)]
struct State {
    resources: BTreeMap<Key, SimResource>,
    networks: HashMap<String, Ipv4Net>,
    foreign_subnets: HashMap<String, Vec<Ipv4Net>>,
    faults: HashMap<Key, Fault>,
    /// Error plus how many more listings it fails (`None` = every one)
    list_faults: HashMap<ResourceKind, (ProviderError, Option<u32>)>,
    calls: Vec<Call>,
    violations: Vec<Violation>,
    in_flight: HashMap<ResourceKind, usize>,
    peak_in_flight: HashMap<ResourceKind, usize>,
}

impl State {
    fn record(&mut self, op: CallKind, kind: ResourceKind, id: Option<&str>) {
        let seq = self.calls.len();
        self.calls.push(Call {
            seq,
            op,
            kind,
            id: id.map(str::to_string),
        });
    }

    fn blocker_of(&self, key: &Key) -> Option<Key> {
        let tenant = self.resources.get(key)?.node.scope.tenant_scope();
        self.resources
            .iter()
            .find(|((kind, _), r)| {
                blocked_by(key.0).contains(kind) && r.node.scope.tenant_scope() == tenant
            })
            .map(|(k, _)| k.clone())
    }

    fn apply_delete(&mut self, key: &Key, async_polls: u32) -> Result<(), ProviderError> {
        let resource = format!("{} {}", key.0, key.1);
        match self.faults.get_mut(key) {
            Some(Fault::Transient { times }) if *times > 0 => {
                *times -= 1;
                return Err(ProviderError::Transient {
                    code: Some("Throttling".to_string()),
                    message: format!("Rate exceeded deleting {resource}"),
                });
            }
            Some(Fault::Fatal) => {
                return Err(ProviderError::Fatal {
                    code: Some("UnauthorizedOperation".to_string()),
                    message: format!("Not allowed to delete {resource}"),
                });
            }
            Some(Fault::Vanish) => {
                self.resources.remove(key);
            }
            _ => {}
        }

        let phase = match self.resources.get(key) {
            Some(r) => r.phase,
            None => return Err(ProviderError::not_found(resource)),
        };
        if phase != Phase::Live {
            return Ok(());
        }

        if let Some(blocker) = self.blocker_of(key) {
            let message = format!("{resource} has a dependent {} {}", blocker.0, blocker.1);
            self.violations.push(Violation {
                kind: key.0,
                id: key.1.clone(),
                blocked_by: blocker,
            });
            return Err(ProviderError::Transient {
                code: Some("DependencyViolation".to_string()),
                message,
            });
        }

        if key.0.deletion_is_async() {
            let next = if self.faults.get(key) == Some(&Fault::Stuck) {
                Phase::Stuck
            } else {
                Phase::Deleting {
                    polls_left: async_polls,
                }
            };
            if let Some(r) = self.resources.get_mut(key) {
                r.phase = next;
            }
        } else {
            self.resources.remove(key);
        }
        Ok(())
    }
}

/// In-memory provider implementing [`Inventory`] and [`ResourceDeleter`]
pub struct SimulatedCloud {
    state: Mutex<State>,
    delete_latency: Duration,
    async_polls: u32,
    on_delete: Option<DeleteHook>,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            delete_latency: Duration::ZERO,
            async_polls: 2,
            on_delete: None,
        }
    }

    /// Sleep this long inside every delete call
    pub fn with_delete_latency(mut self, latency: Duration) -> Self {
        self.delete_latency = latency;
        self
    }

    /// Number of "still terminating" polls before an async deletion completes
    pub fn with_async_polls(mut self, polls: u32) -> Self {
        self.async_polls = polls;
        self
    }

    /// Run `hook` at the start of every delete call
    pub fn on_delete(mut self, hook: impl Fn(&ResourceNode) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Box::new(hook));
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, node: ResourceNode, network: Option<&str>) -> ResourceNode {
        let mut tags: HashMap<String, String> = scope_tags(&node.scope)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        tags.insert(TAG_CREATED_AT.to_string(), format_created_at(Utc::now()));
        tags.insert(TAG_STATUS.to_string(), status::ACTIVE.to_string());
        if let Some(name) = &node.name {
            tags.insert(TAG_NAME.to_string(), name.clone());
        }

        self.state().resources.insert(
            (node.kind, node.id.clone()),
            SimResource {
                node: node.clone(),
                tags,
                network: network.map(str::to_string),
                phase: Phase::Live,
            },
        );
        node
    }

    /// Create a tagged resource
    pub fn add(&self, kind: ResourceKind, id: &str, scope: &ResourceScope) -> ResourceNode {
        self.insert(ResourceNode::new(kind, id, scope.clone()), None)
    }

    /// Create a tagged resource carrying a `Name` tag
    pub fn add_named(
        &self,
        kind: ResourceKind,
        id: &str,
        name: &str,
        scope: &ResourceScope,
    ) -> ResourceNode {
        self.insert(ResourceNode::new(kind, id, scope.clone()).with_name(name), None)
    }

    /// Create a tagged network with its address block
    pub fn add_network(&self, id: &str, cidr: Ipv4Net, scope: &ResourceScope) -> ResourceNode {
        self.state().networks.insert(id.to_string(), cidr);
        self.insert(
            ResourceNode::new(ResourceKind::Network, id, scope.clone()).with_cidr(cidr),
            None,
        )
    }

    /// Register a network owned by nobody we track, for allocation tests
    pub fn add_untracked_network(&self, id: &str, cidr: Ipv4Net) {
        self.state().networks.insert(id.to_string(), cidr);
    }

    /// Create a tagged subnet inside `network_id`
    pub fn add_subnet(
        &self,
        network_id: &str,
        id: &str,
        cidr: Ipv4Net,
        scope: &ResourceScope,
    ) -> ResourceNode {
        self.insert(
            ResourceNode::new(ResourceKind::Subnet, id, scope.clone()).with_cidr(cidr),
            Some(network_id),
        )
    }

    /// Occupy a block in `network_id` without any labenv tags
    pub fn add_foreign_subnet(&self, network_id: &str, cidr: Ipv4Net) {
        self.state()
            .foreign_subnets
            .entry(network_id.to_string())
            .or_default()
            .push(cidr);
    }

    pub fn inject(&self, kind: ResourceKind, id: &str, fault: Fault) {
        self.state().faults.insert((kind, id.to_string()), fault);
    }

    /// Make every `list_by_tag` call for `kind` fail with `error`
    pub fn fail_listing(&self, kind: ResourceKind, error: ProviderError) {
        self.state().list_faults.insert(kind, (error, None));
    }

    /// Fail the next `times` listings of `kind`, then list normally
    pub fn fail_listing_times(&self, kind: ResourceKind, error: ProviderError, times: u32) {
        if times > 0 {
            self.state().list_faults.insert(kind, (error, Some(times)));
        }
    }

    /// Number of `list_by_tag` calls made for `kind`
    pub fn list_calls(&self, kind: ResourceKind) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.op == CallKind::List && c.kind == kind)
            .count()
    }

    /// Whether a resource still exists (terminating counts as existing)
    pub fn contains(&self, kind: ResourceKind, id: &str) -> bool {
        self.state().resources.contains_key(&(kind, id.to_string()))
    }

    /// Every resource still present, in kind then id order
    pub fn remaining(&self) -> Vec<ResourceNode> {
        self.state()
            .resources
            .values()
            .map(|r| r.node.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of delete calls made for one resource, retries included
    pub fn delete_calls(&self, kind: ResourceKind, id: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.op == CallKind::Delete && c.kind == kind && c.id.as_deref() == Some(id))
            .count()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.state().violations.clone()
    }

    /// Most delete calls of `kind` that were in flight at the same time
    pub fn peak_in_flight(&self, kind: ResourceKind) -> usize {
        self.state().peak_in_flight.get(&kind).copied().unwrap_or(0)
    }

    /// Pairs `(delete, earlier_stage_call)` where a call touching an earlier
    /// teardown stage happened after a later stage had started deleting.
    ///
    /// Empty when every stage was fully resolved before the next one began.
    pub fn stage_order_violations(&self) -> Vec<(Call, Call)> {
        let calls = self.calls();
        let mut out = Vec::new();
        for later in calls.iter().filter(|c| c.op == CallKind::Delete) {
            let stage = later.kind.teardown_stage();
            for earlier in calls.iter().filter(|c| {
                c.op != CallKind::List && c.seq > later.seq && c.kind.teardown_stage() < stage
            }) {
                out.push((later.clone(), earlier.clone()));
            }
        }
        out
    }
}

impl Inventory for SimulatedCloud {
    async fn list_by_tag(
        &self,
        scope: &ResourceScope,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceNode>, ProviderError> {
        let mut state = self.state();
        state.record(CallKind::List, kind, None);
        if let Some((error, remaining)) = state.list_faults.get_mut(&kind) {
            let error = error.clone();
            let exhausted = remaining.as_mut().is_some_and(|n| {
                *n = n.saturating_sub(1);
                *n == 0
            });
            if exhausted {
                state.list_faults.remove(&kind);
            }
            return Err(error);
        }
        Ok(state
            .resources
            .values()
            .filter(|r| r.node.kind == kind && matches_scope(&r.tags, scope))
            .map(|r| r.node.clone())
            .collect())
    }

    async fn list_network_subnets(&self, network_id: &str) -> Result<Vec<Ipv4Net>, ProviderError> {
        let state = self.state();
        if !state.networks.contains_key(network_id) {
            return Err(ProviderError::not_found(network_id));
        }
        let tracked = state
            .resources
            .values()
            .filter(|r| r.network.as_deref() == Some(network_id))
            .filter_map(|r| r.node.cidr);
        let foreign = state
            .foreign_subnets
            .get(network_id)
            .into_iter()
            .flatten()
            .copied();
        Ok(tracked.chain(foreign).collect())
    }

    async fn network_block(&self, network_id: &str) -> Result<Ipv4Net, ProviderError> {
        self.state()
            .networks
            .get(network_id)
            .copied()
            .ok_or_else(|| ProviderError::not_found(network_id))
    }
}

impl ResourceDeleter for SimulatedCloud {
    async fn delete(&self, node: &ResourceNode) -> Result<(), ProviderError> {
        {
            let mut state = self.state();
            state.record(CallKind::Delete, node.kind, Some(&node.id));
            let in_flight = state.in_flight.entry(node.kind).or_default();
            *in_flight += 1;
            let now = *in_flight;
            let peak = state.peak_in_flight.entry(node.kind).or_default();
            *peak = (*peak).max(now);
        }

        if let Some(hook) = &self.on_delete {
            hook(node);
        }
        if !self.delete_latency.is_zero() {
            tokio::time::sleep(self.delete_latency).await;
        }

        let mut state = self.state();
        if let Some(in_flight) = state.in_flight.get_mut(&node.kind) {
            *in_flight -= 1;
        }
        state.apply_delete(&(node.kind, node.id.clone()), self.async_polls)
    }

    async fn is_gone(&self, node: &ResourceNode) -> Result<bool, ProviderError> {
        let key = (node.kind, node.id.clone());
        let mut state = self.state();
        state.record(CallKind::Poll, node.kind, Some(&node.id));

        let done = match state.resources.get_mut(&key).map(|r| &mut r.phase) {
            None => return Ok(true),
            Some(Phase::Deleting { polls_left }) if *polls_left == 0 => true,
            Some(Phase::Deleting { polls_left }) => {
                *polls_left -= 1;
                false
            }
            Some(Phase::Live | Phase::Stuck) => false,
        };
        if done {
            state.resources.remove(&key);
        }
        Ok(done)
    }
}
