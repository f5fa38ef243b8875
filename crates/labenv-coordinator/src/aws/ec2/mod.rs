//! EC2 discovery and deletion: instances, security groups and the network
//! (VPC, subnets, route tables, internet gateways)

mod instance;
mod network;
mod security_group;

use crate::aws::context::{AwsContext, FromAwsContext};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::Filter;

/// EC2 client for tenant compute and network resources
pub struct Ec2Client {
    pub(crate) client: Client,
}

impl FromAwsContext for Ec2Client {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }
}

fn vpc_filter(vpc_id: &str) -> Filter {
    Filter::builder().name("vpc-id").values(vpc_id).build()
}
