//! AWS error classification
//!
//! Maps SDK errors onto [`ProviderError`] using the error code from
//! `ProvideErrorMetadata`, falling back to the Debug representation when the
//! chain holds no typed SDK error.

use crate::provider::ProviderError;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};

/// Error codes meaning the target does not exist
const NOT_FOUND_CODES: &[&str] = &[
    // EC2
    "InvalidInstanceID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidGroupId.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidAssociationID.NotFound",
    "InvalidVpcID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    // S3
    "NoSuchBucket",
    "NoSuchKey",
    // IAM
    "NoSuchEntity",
];

/// Error codes worth retrying with backoff
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
    "RequestTimeout",
    "RequestTimeoutException",
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    // Dependents (ENIs, attachments) still releasing
    "DependencyViolation",
    "DeleteConflict",
];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> ProviderError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound { resource: message },
        Some(c) if TRANSIENT_CODES.contains(&c) => ProviderError::Transient {
            code: Some(c.to_string()),
            message,
        },
        _ => ProviderError::Fatal {
            code: code.map(str::to_string),
            message,
        },
    }
}

macro_rules! classify_sdk_errors {
    ($cause:expr, $($sdk:ident :: $op:ident :: $err:ident),+ $(,)?) => {
        $(
            if let Some(e) = $cause.downcast_ref::<$sdk::error::SdkError<$sdk::operation::$op::$err>>() {
                return Some(classify_sdk_error(e));
            }
        )+
    };
}

fn classify_sdk_error<E, R>(e: &SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match e {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            ProviderError::transient(format!("{e}"))
        }
        SdkError::ServiceError(service) => {
            let err = service.err();
            classify_aws_error(err.code(), err.message())
        }
        _ => ProviderError::fatal(format!("{e}")),
    }
}

fn classify_typed(cause: &(dyn std::error::Error + 'static)) -> Option<ProviderError> {
    if let Some(e) = cause.downcast_ref::<ProviderError>() {
        return Some(e.clone());
    }
    classify_sdk_errors!(
        cause,
        aws_sdk_ec2::describe_instances::DescribeInstancesError,
        aws_sdk_ec2::terminate_instances::TerminateInstancesError,
        aws_sdk_ec2::describe_security_groups::DescribeSecurityGroupsError,
        aws_sdk_ec2::delete_security_group::DeleteSecurityGroupError,
        aws_sdk_ec2::describe_subnets::DescribeSubnetsError,
        aws_sdk_ec2::delete_subnet::DeleteSubnetError,
        aws_sdk_ec2::describe_route_tables::DescribeRouteTablesError,
        aws_sdk_ec2::disassociate_route_table::DisassociateRouteTableError,
        aws_sdk_ec2::delete_route_table::DeleteRouteTableError,
        aws_sdk_ec2::describe_vpcs::DescribeVpcsError,
        aws_sdk_ec2::describe_internet_gateways::DescribeInternetGatewaysError,
        aws_sdk_ec2::detach_internet_gateway::DetachInternetGatewayError,
        aws_sdk_ec2::delete_internet_gateway::DeleteInternetGatewayError,
        aws_sdk_ec2::delete_vpc::DeleteVpcError,
        aws_sdk_emr::list_clusters::ListClustersError,
        aws_sdk_emr::describe_cluster::DescribeClusterError,
        aws_sdk_emr::terminate_job_flows::TerminateJobFlowsError,
        aws_sdk_s3::list_buckets::ListBucketsError,
        aws_sdk_s3::get_bucket_tagging::GetBucketTaggingError,
        aws_sdk_s3::list_object_versions::ListObjectVersionsError,
        aws_sdk_s3::delete_object::DeleteObjectError,
        aws_sdk_s3::delete_bucket::DeleteBucketError,
        aws_sdk_iam::list_roles::ListRolesError,
        aws_sdk_iam::list_role_tags::ListRoleTagsError,
        aws_sdk_iam::list_instance_profiles_for_role::ListInstanceProfilesForRoleError,
        aws_sdk_iam::remove_role_from_instance_profile::RemoveRoleFromInstanceProfileError,
        aws_sdk_iam::delete_instance_profile::DeleteInstanceProfileError,
        aws_sdk_iam::list_role_policies::ListRolePoliciesError,
        aws_sdk_iam::delete_role_policy::DeleteRolePolicyError,
        aws_sdk_iam::list_attached_role_policies::ListAttachedRolePoliciesError,
        aws_sdk_iam::detach_role_policy::DetachRolePolicyError,
        aws_sdk_iam::delete_role::DeleteRoleError,
        aws_sdk_iam::list_policies::ListPoliciesError,
        aws_sdk_iam::list_policy_tags::ListPolicyTagsError,
        aws_sdk_iam::list_entities_for_policy::ListEntitiesForPolicyError,
        aws_sdk_iam::detach_user_policy::DetachUserPolicyError,
        aws_sdk_iam::detach_group_policy::DetachGroupPolicyError,
        aws_sdk_iam::list_policy_versions::ListPolicyVersionsError,
        aws_sdk_iam::delete_policy_version::DeletePolicyVersionError,
        aws_sdk_iam::delete_policy::DeletePolicyError,
    );
    None
}

/// Classify an error from an anyhow::Error by extracting the AWS error code.
///
/// Walks the error chain looking for a [`ProviderError`] or an SDK error
/// carrying `ProvideErrorMetadata`. Falls back to string matching on the
/// Debug representation if no typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> ProviderError {
    for cause in error.chain() {
        if let Some(classified) = classify_typed(cause) {
            return classified;
        }
    }

    let debug_str = format!("{error:?}");
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&format!("{error:#}")));
    }
    if debug_str.contains("DispatchFailure") || debug_str.contains("TimeoutError") {
        return ProviderError::transient(format!("{error:#}"));
    }

    ProviderError::fatal(format!("{error:#}"))
}

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    for code in NOT_FOUND_CODES.iter().chain(TRANSIENT_CODES) {
        if debug_str.contains(code) {
            return Some((*code).to_string());
        }
    }

    // Try to extract any code from `code: Some("...")` pattern
    let start = debug_str.find("code: Some(\"")?;
    let rest = &debug_str[start + 12..];
    rest.find('"').map(|end| rest[..end].to_string())
}
