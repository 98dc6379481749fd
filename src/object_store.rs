// src/object_store.rs
//
// URI-based object storage seam. Supported schemes: s3://, file://
// Backends stream in both directions; an upload hands back a CompletionSignal
// that settles when the backend reports the object written.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::completion::CompletionSignal;
use crate::constants::{DEFAULT_EXISTS_MAX_ATTEMPTS, DEFAULT_EXISTS_POLL_INTERVAL};

/// Streaming object body.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    S3,
    File,
    Unknown,
}

impl Scheme {
    pub fn prefix(self) -> &'static str {
        match self {
            Scheme::S3 => "s3://",
            Scheme::File => "file://",
            Scheme::Unknown => "",
        }
    }
}

/// Best-effort scheme inference from a URI.
pub fn infer_scheme(uri: &str) -> Scheme {
    if uri.starts_with("s3://") {
        Scheme::S3
    } else if uri.starts_with("file://") {
        Scheme::File
    } else {
        Scheme::Unknown
    }
}

/// URI for `key` inside `bucket`. For `file://` the bucket is a base directory.
pub fn location_uri(scheme: Scheme, bucket: &str, key: &str) -> String {
    format!(
        "{}{}/{}",
        scheme.prefix(),
        bucket.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Polling policy for read-after-write confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistencePolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ExistencePolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_EXISTS_POLL_INTERVAL,
            max_attempts: DEFAULT_EXISTS_MAX_ATTEMPTS,
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn scheme(&self) -> Scheme;

    /// Full URIs of every object whose URI starts with `uri_prefix`, sorted.
    async fn list(&self, uri_prefix: &str) -> Result<Vec<String>>;

    /// Open a streaming reader over the object body.
    async fn get_stream(&self, uri: &str) -> Result<ObjectReader>;

    /// Start uploading `body` to `uri`. Returns once the upload is under way;
    /// the signal settles when the backend reports success or failure.
    async fn put_stream(&self, uri: &str, body: ObjectReader) -> Result<CompletionSignal>;

    /// HEAD-like check. A missing object is `Ok(false)`, not an error.
    async fn exists(&self, uri: &str) -> Result<bool>;

    /// Poll `exists` until the object is visible or the attempts run out.
    async fn wait_until_exists(&self, uri: &str, policy: &ExistencePolicy) -> Result<()> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            if self.exists(uri).await? {
                debug!(uri, attempt, "object visible");
                return Ok(());
            }
            if attempt < attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        bail!("{uri} not visible after {attempts} existence checks")
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn scheme(&self) -> Scheme {
        (**self).scheme()
    }

    async fn list(&self, uri_prefix: &str) -> Result<Vec<String>> {
        (**self).list(uri_prefix).await
    }

    async fn get_stream(&self, uri: &str) -> Result<ObjectReader> {
        (**self).get_stream(uri).await
    }

    async fn put_stream(&self, uri: &str, body: ObjectReader) -> Result<CompletionSignal> {
        (**self).put_stream(uri, body).await
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        (**self).exists(uri).await
    }

    async fn wait_until_exists(&self, uri: &str, policy: &ExistencePolicy) -> Result<()> {
        (**self).wait_until_exists(uri, policy).await
    }
}

/// Build the backend for `uri`'s scheme. S3 needs a configured client, so it
/// is only available when one is supplied.
pub fn store_for_uri(uri: &str, s3: Option<aws_sdk_s3::Client>) -> Result<Arc<dyn ObjectStore>> {
    match infer_scheme(uri) {
        Scheme::S3 => match s3 {
            Some(client) => Ok(Arc::new(crate::s3_store::S3ObjectStore::new(client))),
            None => bail!("no S3 client configured for {uri}"),
        },
        Scheme::File => Ok(Arc::new(crate::file_store::FileSystemObjectStore::new())),
        Scheme::Unknown => bail!("Unable to infer backend from URI: {uri}"),
    }
}
