//! MinIO/S3 storage client for fetching assignments

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::checker::{AssignmentSource, AssignmentSpec};

/// Object key of an assignment document
pub fn assignment_key(assignment_id: i64) -> String {
    format!("assignments/{}.json", assignment_id)
}

/// S3/MinIO storage client
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
}

impl StorageClient {
    /// Create a new storage client from environment variables
    pub async fn from_env() -> Result<Self> {
        let endpoint = std::env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "localhost".into());
        let port = std::env::var("MINIO_PORT").unwrap_or_else(|_| "9000".into());
        let access_key = std::env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".into());
        let secret_key = std::env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| "minioadmin".into());
        let bucket = std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "checker-assignments".into());
        let use_ssl = std::env::var("MINIO_USE_SSL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let protocol = if use_ssl { "https" } else { "http" };
        let endpoint_url = format!("{}://{}:{}", protocol, endpoint, port);

        info!("Connecting to MinIO at {} (bucket {})", endpoint_url, bucket);

        let credentials = Credentials::new(access_key, secret_key, None, None, "minio");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(&endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            bucket,
        })
    }

    /// Download an object from S3/MinIO
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", key))?;

        let data = response.body.collect().await?;
        Ok(data.into_bytes().to_vec())
    }

    /// Download and parse an assignment document
    pub async fn fetch_assignment_spec(&self, assignment_id: i64) -> Result<AssignmentSpec> {
        let key = assignment_key(assignment_id);
        let bytes = self.download(&key).await?;
        let spec = parse_assignment(&bytes)
            .with_context(|| format!("Invalid assignment document {}", key))?;
        debug!(
            "Loaded assignment {} with {} test cases",
            assignment_id,
            spec.test_cases.len()
        );
        Ok(spec)
    }
}

fn parse_assignment(bytes: &[u8]) -> Result<AssignmentSpec> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl AssignmentSource for StorageClient {
    async fn fetch_assignment(&self, assignment_id: i64) -> Result<AssignmentSpec> {
        self.fetch_assignment_spec(assignment_id).await
    }
}
