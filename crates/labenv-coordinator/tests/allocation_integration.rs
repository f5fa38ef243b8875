//! Name and subnet allocation against the simulated cloud, including the
//! allocate, create, tear down, tear down again round trip.

use labenv_common::{Ipv4Net, ResourceKind, ResourceScope};
use labenv_coordinator::{
    AllocationError, CandidateRange, IndexAllocator, Outcome, ProviderError, SubnetPlanner,
    Teardown, TeardownPlan,
};
use labenv_test_utils::{SimulatedCloud, fast_teardown_config, other_tenant_scope, test_scope};
use tokio_util::sync::CancellationToken;

fn net(s: &str) -> Ipv4Net {
    s.parse().unwrap()
}

fn notebooks(scope: &ResourceScope) -> ResourceScope {
    scope.clone().with_resource_type("nb").unwrap()
}

#[tokio::test]
async fn test_first_name_in_empty_scope() {
    let cloud = SimulatedCloud::new();
    let name = IndexAllocator::new(&cloud)
        .next_name(&notebooks(&test_scope()), ResourceKind::Instance)
        .await
        .unwrap();

    assert_eq!(name.to_string(), "dlab-alpha-nb-1");
    assert_eq!(name.index(), 1);
}

#[tokio::test]
async fn test_names_fill_the_lowest_gap() {
    let cloud = SimulatedCloud::new();
    let nb = notebooks(&test_scope());
    cloud.add_named(ResourceKind::Instance, "i-1", "dlab-alpha-nb-1", &nb);
    cloud.add_named(ResourceKind::Instance, "i-3", "dlab-alpha-nb-3", &nb);

    let name = IndexAllocator::new(&cloud)
        .next_name(&nb, ResourceKind::Instance)
        .await
        .unwrap();
    assert_eq!(name.to_string(), "dlab-alpha-nb-2");
}

#[tokio::test]
async fn test_names_ignore_other_tenants_and_malformed_names() {
    let cloud = SimulatedCloud::new();
    let nb = notebooks(&test_scope());
    cloud.add_named(ResourceKind::Instance, "i-1", "dlab-alpha-nb-1", &nb);
    cloud.add_named(ResourceKind::Instance, "i-2", "dlab-alpha-nb-two", &nb);
    cloud.add_named(ResourceKind::Instance, "i-3", "dlab-alpha-nb-", &nb);
    cloud.add_named(
        ResourceKind::Instance,
        "i-4",
        "dlab-beta-nb-2",
        &notebooks(&other_tenant_scope()),
    );
    cloud.add(ResourceKind::Instance, "i-5", &nb);

    let name = IndexAllocator::new(&cloud)
        .next_name(&nb, ResourceKind::Instance)
        .await
        .unwrap();
    assert_eq!(name.to_string(), "dlab-alpha-nb-2");
}

#[tokio::test]
async fn test_name_allocation_surfaces_inventory_errors() {
    let cloud = SimulatedCloud::new();
    cloud.fail_listing(
        ResourceKind::Instance,
        ProviderError::fatal("ec2:DescribeInstances denied"),
    );

    let err = IndexAllocator::new(&cloud)
        .next_name(&test_scope(), ResourceKind::Instance)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Inventory(ProviderError::Fatal { .. })));
}

#[tokio::test]
async fn test_not_found_listing_means_no_names_in_use() {
    let cloud = SimulatedCloud::new();
    cloud.fail_listing(
        ResourceKind::ManagedCluster,
        ProviderError::not_found("no clusters in account"),
    );

    let name = IndexAllocator::new(&cloud)
        .next_name(&notebooks(&test_scope()), ResourceKind::ManagedCluster)
        .await
        .unwrap();
    assert_eq!(name.to_string(), "dlab-alpha-nb-1");
}

#[tokio::test]
async fn test_subnet_allocation_skips_every_tenant() {
    let cloud = SimulatedCloud::new();
    let scope = test_scope();
    cloud.add_network("vpc-1", net("10.20.0.0/16"), &scope);
    cloud.add_subnet("vpc-1", "subnet-a", net("10.20.0.0/24"), &scope);
    cloud.add_subnet("vpc-1", "subnet-b", net("10.20.1.0/24"), &other_tenant_scope());
    cloud.add_foreign_subnet("vpc-1", net("10.20.2.0/23"));

    let block = SubnetPlanner::new(&cloud).allocate("vpc-1", 24, None).await.unwrap();
    assert_eq!(block, net("10.20.4.0/24"));
}

#[tokio::test]
async fn test_subnet_allocation_in_candidate_range() {
    let cloud = SimulatedCloud::new();
    let scope = test_scope();
    cloud.add_network("vpc-1", net("10.30.0.0/16"), &scope);
    for (i, cidr) in ["10.30.8.0/24", "10.30.9.0/24", "10.30.11.0/24"].iter().enumerate() {
        cloud.add_subnet("vpc-1", &format!("subnet-{i}"), net(cidr), &scope);
    }

    let range: CandidateRange = "10.30.8.0-10.30.11.255".parse().unwrap();
    let block = SubnetPlanner::new(&cloud)
        .allocate("vpc-1", 24, Some(&range))
        .await
        .unwrap();
    assert_eq!(block, net("10.30.10.0/24"));
}

#[tokio::test]
async fn test_subnet_allocation_until_exhausted() {
    let cloud = SimulatedCloud::new();
    let scope = test_scope();
    cloud.add_network("vpc-1", net("10.40.0.0/22"), &scope);

    let planner = SubnetPlanner::new(&cloud);
    let mut allocated = Vec::new();
    loop {
        match planner.allocate("vpc-1", 24, None).await {
            Ok(block) => {
                assert!(!allocated.contains(&block), "{block} handed out twice");
                cloud.add_subnet("vpc-1", &format!("subnet-{}", allocated.len()), block, &scope);
                allocated.push(block);
            }
            Err(AllocationError::NoSpaceAvailable { parent, prefix_len }) => {
                assert_eq!(parent, net("10.40.0.0/22"));
                assert_eq!(prefix_len, 24);
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(allocated.len() <= 4, "allocated more blocks than fit");
    }
    assert_eq!(allocated.len(), 4);
}

#[tokio::test]
async fn test_subnet_allocation_unknown_network() {
    let cloud = SimulatedCloud::new();
    let err = SubnetPlanner::new(&cloud)
        .allocate("vpc-missing", 24, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::Inventory(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn test_allocate_create_teardown_round_trip() {
    let cloud = SimulatedCloud::new();
    let scope = test_scope();
    let nb = notebooks(&scope);
    cloud.add_untracked_network("vpc-shared", net("10.50.0.0/16"));

    let name = IndexAllocator::new(&cloud)
        .next_name(&nb, ResourceKind::Instance)
        .await
        .unwrap();
    let block = SubnetPlanner::new(&cloud)
        .allocate("vpc-shared", 24, None)
        .await
        .unwrap();

    // "provision" with what we were handed
    cloud.add_subnet("vpc-shared", "subnet-nb", block, &nb);
    cloud.add_named(ResourceKind::Instance, "i-nb", &name.to_string(), &nb);

    let teardown = Teardown::new(&cloud, fast_teardown_config());
    let first = teardown
        .run(&TeardownPlan::new(scope.clone()), &CancellationToken::new())
        .await;
    assert_eq!(first.outcome_of(ResourceKind::Instance, "i-nb"), Some(&Outcome::Deleted));
    assert_eq!(first.outcome_of(ResourceKind::Subnet, "subnet-nb"), Some(&Outcome::Deleted));

    let second = teardown
        .run(
            &TeardownPlan::new(scope).with_known(first.nodes().cloned()),
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(second.outcome_of(ResourceKind::Instance, "i-nb"), Some(&Outcome::NotFound));
    assert_eq!(second.outcome_of(ResourceKind::Subnet, "subnet-nb"), Some(&Outcome::NotFound));

    // freed index and block are handed out again
    let again = IndexAllocator::new(&cloud)
        .next_name(&nb, ResourceKind::Instance)
        .await
        .unwrap();
    assert_eq!(again, name);
    let block_again = SubnetPlanner::new(&cloud)
        .allocate("vpc-shared", 24, None)
        .await
        .unwrap();
    assert_eq!(block_again, block);
}
