// src/s3_client.rs
//
//! Per-run S3 clients. Every run builds its own client with the run's
//! temporary credential bound onto it; nothing here is process-wide.

use std::env;
use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Region, Client};
use tracing::debug;

use crate::constants::CREDENTIAL_REGION;
use crate::credential::AwsCredential;

/// Connection settings shared by every client of a process.
#[derive(Debug, Clone)]
pub struct S3ClientSettings {
    /// S3-compatible endpoint (MinIO, Ceph, ...). Forces path-style addressing.
    pub endpoint_url: Option<String>,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
}

impl Default for S3ClientSettings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(120),
        }
    }
}

impl S3ClientSettings {
    /// Defaults plus `AWS_ENDPOINT_URL` when set.
    pub fn from_env() -> Self {
        Self {
            endpoint_url: env::var("AWS_ENDPOINT_URL").ok().filter(|e| !e.is_empty()),
            ..Self::default()
        }
    }
}

/// Build a client. With a credential, it and the fixed credential region are
/// bound onto this client only; without one the default provider chain
/// (environment, profile) is used.
pub async fn scoped_client(credential: Option<&AwsCredential>, settings: &S3ClientSettings) -> Client {
    let region = RegionProviderChain::first_try(env::var("AWS_REGION").ok().map(Region::new))
        .or_else(Region::new(CREDENTIAL_REGION));

    let timeouts = TimeoutConfig::builder()
        .connect_timeout(settings.connect_timeout)
        .operation_timeout(settings.operation_timeout)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .timeout_config(timeouts);
    if let Some(endpoint) = &settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    // Path-style addressing: S3-compatible services reject virtual-hosted buckets.
    let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true);
    if let Some(credential) = credential {
        debug!(access_key = %credential, "binding run credential onto S3 client");
        builder = credential.attach_to(builder);
    }
    Client::from_conf(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credential_region_wins_over_environment() {
        let cred = AwsCredential::new("AKID", "SECRET", None);
        let settings = S3ClientSettings {
            endpoint_url: Some("http://127.0.0.1:9000".into()),
            ..S3ClientSettings::default()
        };
        let client = scoped_client(Some(&cred), &settings).await;
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some(CREDENTIAL_REGION)
        );
    }
}
