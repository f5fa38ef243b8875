//! AWS implementation of the provider traits

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::classify_anyhow_error;
use crate::aws::{Ec2Client, EmrClient, IamClient, S3Client};
use crate::provider::{Inventory, ProviderError, ResourceDeleter};
use ipnet::Ipv4Net;
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};

/// Inventory and deletion against one AWS account and region
pub struct AwsProvider {
    ec2: Ec2Client,
    emr: EmrClient,
    s3: S3Client,
    iam: IamClient,
    region: String,
}

impl FromAwsContext for AwsProvider {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            ec2: Ec2Client::from_context(ctx),
            emr: EmrClient::from_context(ctx),
            s3: S3Client::from_context(ctx),
            iam: IamClient::from_context(ctx),
            region: ctx.region().to_string(),
        }
    }
}

impl AwsProvider {
    pub fn region(&self) -> &str {
        &self.region
    }
}

fn classify<T>(result: anyhow::Result<T>) -> Result<T, ProviderError> {
    result.map_err(|e| classify_anyhow_error(&e))
}

impl Inventory for AwsProvider {
    async fn list_by_tag(
        &self,
        scope: &ResourceScope,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceNode>, ProviderError> {
        classify(match kind {
            ResourceKind::ManagedCluster => self.emr.list_clusters(scope).await,
            ResourceKind::Instance => self.ec2.list_instances(scope).await,
            ResourceKind::SecurityGroup => self.ec2.list_security_groups(scope).await,
            ResourceKind::Subnet => self.ec2.list_subnets(scope).await,
            ResourceKind::RouteTable => self.ec2.list_route_tables(scope).await,
            ResourceKind::Bucket => self.s3.list_buckets(scope).await,
            ResourceKind::IdentityRole => self.iam.list_roles(scope).await,
            ResourceKind::IdentityPolicy => self.iam.list_policies(scope).await,
            ResourceKind::Network => self.ec2.list_vpcs(scope).await,
        })
    }

    async fn list_network_subnets(&self, network_id: &str) -> Result<Vec<Ipv4Net>, ProviderError> {
        classify(self.ec2.subnet_blocks(network_id).await)
    }

    async fn network_block(&self, network_id: &str) -> Result<Ipv4Net, ProviderError> {
        classify(self.ec2.vpc_block(network_id).await)
    }
}

impl ResourceDeleter for AwsProvider {
    async fn delete(&self, node: &ResourceNode) -> Result<(), ProviderError> {
        let id = node.id.as_str();
        classify(match node.kind {
            ResourceKind::ManagedCluster => self.emr.terminate_cluster(id).await,
            ResourceKind::Instance => self.ec2.terminate_instance(id).await,
            ResourceKind::SecurityGroup => self.ec2.delete_security_group(id).await,
            ResourceKind::Subnet => self.ec2.delete_subnet(id).await,
            ResourceKind::RouteTable => self.ec2.delete_route_table(id).await,
            ResourceKind::Bucket => self.s3.delete_bucket(id).await,
            ResourceKind::IdentityRole => self.iam.delete_role(id).await,
            ResourceKind::IdentityPolicy => self.iam.delete_policy(id).await,
            ResourceKind::Network => self.ec2.delete_vpc(id).await,
        })
    }

    async fn is_gone(&self, node: &ResourceNode) -> Result<bool, ProviderError> {
        let id = node.id.as_str();
        classify(match node.kind {
            ResourceKind::ManagedCluster => self.emr.is_cluster_terminated(id).await,
            ResourceKind::Instance => self.ec2.is_instance_terminated(id).await,
            _ => Ok(true),
        })
    }
}
