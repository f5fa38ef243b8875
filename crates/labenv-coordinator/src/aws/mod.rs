//! AWS adapter
//!
//! This module provides wrappers around AWS SDK clients for:
//! - EC2: Instances, security groups, subnets, route tables and VPCs
//! - EMR: Managed clusters
//! - S3: Buckets
//! - IAM: Roles (with instance profiles) and managed policies
//!
//! [`AwsProvider`] ties them together behind the provider traits.

pub mod context;
pub mod ec2;
pub mod emr;
pub mod error;
pub mod iam;
pub mod provider;
pub mod s3;
pub mod tags;

pub use context::{AwsContext, FromAwsContext};
pub use ec2::Ec2Client;
pub use emr::EmrClient;
pub use iam::IamClient;
pub use provider::AwsProvider;
pub use s3::S3Client;

pub use error::{classify_anyhow_error, classify_aws_error};
