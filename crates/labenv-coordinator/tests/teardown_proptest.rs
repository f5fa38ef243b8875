//! Property tests for teardown ordering and failure isolation
//!
//! Random environments (any mix of kinds, random injected faults, random
//! concurrency) are torn down against the simulated cloud. Whatever happens,
//! no stage may start while an earlier one still has calls outstanding, and
//! a dependency violation may only ever be caused by a resource the report
//! already marks as failed.

use labenv_common::{ResourceKind, TEARDOWN_ORDER};
use labenv_coordinator::{Outcome, Teardown, TeardownPlan};
use labenv_test_utils::{Fault, SimulatedCloud, fast_teardown_config, test_scope};
use proptest::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fault_strategy() -> impl Strategy<Value = Option<Fault>> {
    prop_oneof![
        6 => Just(None),
        1 => (1u32..4).prop_map(|times| Some(Fault::Transient { times })),
        1 => Just(Some(Fault::Fatal)),
        1 => Just(Some(Fault::Vanish)),
        1 => Just(Some(Fault::Stuck)),
    ]
}

/// Per kind (in teardown order): one optional fault per node
fn environment_strategy() -> impl Strategy<Value = Vec<Vec<Option<Fault>>>> {
    prop::collection::vec(
        prop::collection::vec(fault_strategy(), 0..4),
        TEARDOWN_ORDER.len(),
    )
}

fn node_id(kind: ResourceKind, i: usize) -> String {
    format!("{kind}-{i}")
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn teardown_respects_stage_order(
        env in environment_strategy(),
        concurrency in 1usize..6,
        async_polls in 0u32..3,
    ) {
        let cloud = SimulatedCloud::new().with_async_polls(async_polls);
        let scope = test_scope();
        let mut total = 0;
        for (kind, faults) in TEARDOWN_ORDER.iter().zip(&env) {
            for (i, fault) in faults.iter().enumerate() {
                let id = node_id(*kind, i);
                cloud.add(*kind, &id, &scope);
                if let Some(fault) = fault {
                    cloud.inject(*kind, &id, fault.clone());
                }
                total += 1;
            }
        }

        let mut config = fast_teardown_config();
        config.concurrency = concurrency;
        config.retry.max_times = 4;
        config.wait.timeout = Duration::from_millis(30);

        let report = runtime().block_on(
            Teardown::new(&cloud, config).run(&TeardownPlan::new(scope), &CancellationToken::new()),
        );

        // every node reached exactly one outcome
        prop_assert_eq!(report.entries.len(), total);

        let out_of_order = cloud.stage_order_violations();
        prop_assert!(out_of_order.is_empty(), "out of order calls: {:?}", out_of_order);

        for violation in cloud.violations() {
            let (kind, id) = &violation.blocked_by;
            let outcome = report.outcome_of(*kind, id);
            prop_assert!(
                outcome.is_some_and(Outcome::is_failed),
                "{:?} blocked by {:?} {} with outcome {:?}",
                violation, kind, id, outcome
            );
        }
        if report.summary.failed == 0 {
            prop_assert!(cloud.violations().is_empty());
            prop_assert!(cloud.remaining().is_empty());
        }

        for (kind, faults) in TEARDOWN_ORDER.iter().zip(&env) {
            for (i, fault) in faults.iter().enumerate() {
                let id = node_id(*kind, i);
                let outcome = report.outcome_of(*kind, &id).cloned();
                match fault {
                    Some(Fault::Fatal) => prop_assert!(outcome.as_ref().is_some_and(Outcome::is_failed)),
                    Some(Fault::Vanish) => prop_assert_eq!(outcome, Some(Outcome::NotFound)),
                    Some(Fault::Stuck) if kind.deletion_is_async() => {
                        prop_assert_eq!(outcome, Some(Outcome::Failed { reason: "timeout".to_string() }));
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn failures_are_isolated_to_their_node(
        counts in prop::collection::vec(1usize..4, TEARDOWN_ORDER.len()),
        hiccup_stage in 0usize..TEARDOWN_ORDER.len(),
        failing_index in 0usize..3,
    ) {
        // with one fatal failure in a kind nothing depends on, every other
        // node must still be deleted
        let failing_kind = ResourceKind::Bucket;
        let cloud = SimulatedCloud::new().with_async_polls(1);
        let scope = test_scope();
        let mut total = 0;
        for (kind, count) in TEARDOWN_ORDER.iter().zip(&counts) {
            for i in 0..*count {
                cloud.add(*kind, &node_id(*kind, i), &scope);
                total += 1;
            }
        }
        let bucket_count = counts[failing_kind.teardown_stage() as usize];
        let failing_id = node_id(failing_kind, failing_index % bucket_count);
        cloud.inject(failing_kind, &failing_id, Fault::Fatal);
        let hiccup_kind = TEARDOWN_ORDER[hiccup_stage];
        if hiccup_kind != failing_kind {
            cloud.inject(hiccup_kind, &node_id(hiccup_kind, 0), Fault::Transient { times: 1 });
        }

        let report = runtime().block_on(
            Teardown::new(&cloud, fast_teardown_config())
                .run(&TeardownPlan::new(scope), &CancellationToken::new()),
        );

        let failed: Vec<_> = report.failed().collect();
        prop_assert_eq!(failed.len(), 1);
        prop_assert_eq!(failed[0].node.key(), (failing_kind, failing_id.as_str()));
        prop_assert_eq!(report.summary.deleted, total - 1);
        prop_assert_eq!(cloud.remaining().len(), 1);
    }
}
