//! S3 bucket discovery and deletion

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::classify_anyhow_error;
use crate::aws::tags::{s3_tags, scoped_node};
use crate::provider::ProviderError;
use anyhow::{Context, Result};
use aws_sdk_s3::Client;
use labenv_common::{ResourceKind, ResourceNode, ResourceScope};
use tracing::{debug, info};

fn is_untagged(err: &ProviderError) -> bool {
    matches!(err, ProviderError::Fatal { code: Some(code), .. } if code == "NoSuchTagSet")
}

/// S3 client for tenant buckets
pub struct S3Client {
    client: Client,
}

impl FromAwsContext for S3Client {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.s3_client(),
        }
    }
}

impl S3Client {
    /// Buckets tagged inside `scope`.
    ///
    /// Bucket names start with the scope prefix, which keeps the number of
    /// tag lookups small in accounts with many buckets.
    pub async fn list_buckets(&self, scope: &ResourceScope) -> Result<Vec<ResourceNode>> {
        let prefix = scope.prefix();
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .context("Failed to list buckets")?;

        let mut nodes = Vec::new();
        for bucket in response.buckets() {
            let Some(name) = bucket.name() else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }

            let tagging = self
                .client
                .get_bucket_tagging()
                .bucket(name)
                .send()
                .await
                .context("Failed to get bucket tags");
            let tags = match tagging {
                Ok(resp) => s3_tags(resp.tag_set()),
                Err(e) => {
                    let classified = classify_anyhow_error(&e);
                    if is_untagged(&classified) || classified.is_not_found() {
                        debug!(bucket = %name, error = %classified, "Skipping untagged or vanished bucket");
                        continue;
                    }
                    return Err(e);
                }
            };

            if let Some(mut node) = scoped_node(ResourceKind::Bucket, name, &tags, scope) {
                node.name = Some(name.to_string());
                nodes.push(node);
            }
        }

        debug!(scope = %scope, count = nodes.len(), "Found S3 buckets");
        Ok(nodes)
    }

    /// Delete a bucket and every object version in it
    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        info!(bucket = %bucket, "Deleting bucket and contents");

        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        let mut deleted = 0usize;
        loop {
            let response = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .context("Failed to list object versions")?;

            let versions = response
                .versions()
                .iter()
                .map(|v| (v.key(), v.version_id()))
                .chain(response.delete_markers().iter().map(|m| (m.key(), m.version_id())));
            for (key, version_id) in versions {
                let Some(key) = key else {
                    continue;
                };
                self.client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .set_version_id(version_id.map(str::to_string))
                    .send()
                    .await
                    .context("Failed to delete object")?;
                deleted += 1;
            }

            if response.is_truncated() == Some(true) {
                key_marker = response.next_key_marker().map(str::to_string);
                version_marker = response.next_version_id_marker().map(str::to_string);
            } else {
                break;
            }
        }
        debug!(bucket = %bucket, objects = deleted, "Bucket emptied");

        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .context("Failed to delete bucket")?;

        Ok(())
    }
}
