//! Object store module
//!
//! Defines the `ObjectStore` seam the pipeline publishes through, plus the
//! S3 implementation. Supports AWS S3 and S3-compatible services (Backblaze
//! B2, Cloudflare R2, MinIO) via custom endpoints.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::S3Config;
use crate::error::PipelineError;

/// Remote destination of normalized artifacts.
///
/// `exists` must report "not found" as a normal `Ok(false)`; only
/// transport-level failures are errors, so the driver can tell the two apart.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, PipelineError>;
    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), PipelineError>;
}

/// S3 provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Provider {
    /// Amazon Web Services S3
    AwsS3,
    /// Backblaze B2
    BackblazeB2,
    /// Cloudflare R2
    CloudflareR2,
    /// Generic S3-compatible service
    Generic,
}

impl S3Provider {
    /// Parse provider from string
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "aws" | "s3" | "aws-s3" => S3Provider::AwsS3,
            "b2" | "backblaze" | "backblaze-b2" => S3Provider::BackblazeB2,
            "r2" | "cloudflare" | "cloudflare-r2" => S3Provider::CloudflareR2,
            _ => S3Provider::Generic,
        }
    }
}

/// S3-compatible storage client
pub struct S3Store {
    client: S3Client,
    bucket: String,
}

impl S3Store {
    /// Create a new S3Store from configuration
    pub async fn new(config: S3Config) -> Result<Self> {
        let client = Self::create_client(&config)
            .await
            .context("Failed to create S3 client")?;

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    /// Create S3 client with custom configuration
    async fn create_client(config: &S3Config) -> Result<S3Client> {
        let provider = S3Provider::from_str(&config.provider);

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None, // session token
            None, // expiration
            "custom", // provider name
        );

        let region = config.region.clone().unwrap_or_else(|| match provider {
            S3Provider::AwsS3 => "us-east-1".to_string(),
            S3Provider::BackblazeB2 => "us-west-002".to_string(),
            S3Provider::CloudflareR2 => "auto".to_string(),
            S3Provider::Generic => "us-east-1".to_string(),
        });

        let region_provider = RegionProviderChain::first_try(Region::new(region));

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(config.force_path_style.unwrap_or(true));
        } else {
            match provider {
                S3Provider::AwsS3 => {
                    // AWS S3 uses virtual-hosted-style by default
                    s3_config_builder = s3_config_builder
                        .force_path_style(config.force_path_style.unwrap_or(false));
                }
                S3Provider::BackblazeB2 => {
                    bail!("Backblaze B2 requires an endpoint URL (e.g., https://s3.us-west-002.backblazeb2.com)");
                }
                S3Provider::CloudflareR2 => {
                    bail!("Cloudflare R2 requires an endpoint URL (e.g., https://<account-id>.r2.cloudflarestorage.com)");
                }
                S3Provider::Generic => {
                    warn!("Generic S3 provider without endpoint - will use AWS S3");
                }
            }
        }

        let s3_config = s3_config_builder.build();
        Ok(S3Client::from_conf(s3_config))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    /// Check whether an object exists via a HEAD request. A 404 is a normal
    /// `false`; any other failure is surfaced as `CheckFailed`.
    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        debug!("Checking if s3://{}/{} exists", self.bucket, key);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => {
                debug!("Object exists: {}", key);
                Ok(true)
            }
            Err(e) => {
                if e.to_string().contains("404") || e.to_string().contains("NotFound") {
                    debug!("Object does not exist: {}", key);
                    Ok(false)
                } else {
                    Err(PipelineError::CheckFailed {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Upload a local file to the bucket at `key`.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), PipelineError> {
        info!(
            "Uploading file {:?} to s3://{}/{}",
            local_path, self.bucket, key
        );

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| PipelineError::Upload {
                key: key.to_string(),
                reason: format!("failed to read local file {:?}: {}", local_path, e),
            })?;

        let response = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::Upload {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let etag = response.e_tag().unwrap_or("unknown").to_string();
        info!("Successfully uploaded {} (ETag: {})", key, etag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!(S3Provider::from_str("aws"), S3Provider::AwsS3);
        assert_eq!(S3Provider::from_str("s3"), S3Provider::AwsS3);
        assert_eq!(S3Provider::from_str("AWS-S3"), S3Provider::AwsS3);

        assert_eq!(S3Provider::from_str("b2"), S3Provider::BackblazeB2);
        assert_eq!(S3Provider::from_str("backblaze"), S3Provider::BackblazeB2);

        assert_eq!(S3Provider::from_str("r2"), S3Provider::CloudflareR2);
        assert_eq!(S3Provider::from_str("Cloudflare-R2"), S3Provider::CloudflareR2);

        assert_eq!(S3Provider::from_str("minio"), S3Provider::Generic);
        assert_eq!(S3Provider::from_str("other"), S3Provider::Generic);
    }
}
