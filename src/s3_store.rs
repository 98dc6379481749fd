// src/s3_store.rs
//
// S3 adapter for the ObjectStore seam. Holds the run's scoped client; reads
// and writes stream, small outputs go up in one PUT and larger ones through a
// multipart upload.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

use crate::completion::{CompletionSignal, EVENT_SUCCESS, EVENT_UPLOADED};
use crate::error::EtlError;
use crate::multipart::{MultipartUploadConfig, MultipartUploadSink};
use crate::object_store::{ObjectReader, ObjectStore, Scheme};

/// Split `s3://bucket/key` into its parts. The key may be empty.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let trimmed = uri.strip_prefix("s3://").context("URI must start with s3://")?;
    let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if bucket.is_empty() {
        anyhow::bail!("URI must name a bucket: {uri}");
    }
    Ok((bucket.to_owned(), key.to_owned()))
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    multipart: MultipartUploadConfig,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            multipart: MultipartUploadConfig::default(),
        }
    }

    pub fn with_multipart(mut self, multipart: MultipartUploadConfig) -> Self {
        self.multipart = multipart;
        self
    }
}

/// Read up to `size` bytes; shorter only at end of body.
async fn read_chunk(body: &mut ObjectReader, size: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(size);
    (&mut *body).take(size as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Upload `body`, returning the event name the upload finished with.
async fn upload(
    client: Client,
    bucket: String,
    key: String,
    mut body: ObjectReader,
    cfg: MultipartUploadConfig,
) -> Result<&'static str> {
    let first = read_chunk(&mut body, cfg.part_size)
        .await
        .context("reading upload body failed")?;

    if first.len() < cfg.part_size {
        let mut req = client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(first));
        if let Some(ct) = &cfg.content_type {
            req = req.content_type(ct);
        }
        req.send().await.context("PutObject failed")?;
        return Ok(EVENT_SUCCESS);
    }

    let mut sink = MultipartUploadSink::new(client, &bucket, &key, &cfg).await?;
    let pumped = async {
        let mut chunk = first;
        loop {
            let last = chunk.len() < cfg.part_size;
            if !chunk.is_empty() {
                sink.write_part(chunk).await?;
            }
            if last {
                return Ok::<_, anyhow::Error>(());
            }
            chunk = read_chunk(&mut body, cfg.part_size)
                .await
                .context("reading upload body failed")?;
        }
    }
    .await;

    match pumped {
        Ok(()) => {
            let info = sink.finish().await?;
            debug!(%bucket, %key, parts = info.parts, bytes = info.total_bytes, "multipart upload complete");
            Ok(EVENT_UPLOADED)
        }
        Err(e) => {
            sink.abort().await;
            Err(e)
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn scheme(&self) -> Scheme {
        Scheme::S3
    }

    async fn list(&self, uri_prefix: &str) -> Result<Vec<String>> {
        let (bucket, key_prefix) = parse_s3_uri(uri_prefix)?;
        let mut uris = Vec::new();
        let mut cont: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&bucket).prefix(&key_prefix);
            if let Some(token) = &cont {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.context("ListObjectsV2 failed")?;
            for obj in resp.contents() {
                if let Some(k) = obj.key() {
                    uris.push(format!("s3://{bucket}/{k}"));
                }
            }
            match resp.next_continuation_token() {
                Some(token) => cont = Some(token.to_string()),
                None => break,
            }
        }
        uris.sort();
        Ok(uris)
    }

    async fn get_stream(&self, uri: &str) -> Result<ObjectReader> {
        let (bucket, key) = parse_s3_uri(uri)?;
        let out = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("GetObject {uri} failed"))?;
        Ok(Box::pin(out.body.into_async_read()))
    }

    async fn put_stream(&self, uri: &str, body: ObjectReader) -> Result<CompletionSignal> {
        let (bucket, key) = parse_s3_uri(uri)?;
        let (emitter, signal) = CompletionSignal::channel();
        let client = self.client.clone();
        let cfg = self.multipart.clone();
        let uri = uri.to_string();

        tokio::spawn(async move {
            match upload(client, bucket, key, body, cfg).await {
                Ok(event) => {
                    emitter.emit(event);
                }
                Err(e) => {
                    error!(%uri, error = %e, "upload failed");
                    emitter.fail(EtlError::transport(format!("PUT {uri}"), e));
                }
            }
        });
        Ok(signal)
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let (bucket, key) = parse_s3_uri(uri)?;
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("HeadObject {uri} failed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_bucket_and_key() {
        assert_eq!(
            parse_s3_uri("s3://bucket/a/b.gz").unwrap(),
            ("bucket".to_string(), "a/b.gz".to_string())
        );
        assert_eq!(parse_s3_uri("s3://bucket").unwrap().1, "");
        assert!(parse_s3_uri("s3:///key").is_err());
        assert!(parse_s3_uri("file:///x").is_err());
    }

    #[tokio::test]
    async fn read_chunk_stops_at_size_or_end() {
        let mut body: ObjectReader = Box::pin(Cursor::new(vec![7u8; 10]));
        assert_eq!(read_chunk(&mut body, 4).await.unwrap().len(), 4);
        assert_eq!(read_chunk(&mut body, 4).await.unwrap().len(), 4);
        assert_eq!(read_chunk(&mut body, 4).await.unwrap().len(), 2);
        assert!(read_chunk(&mut body, 4).await.unwrap().is_empty());
    }
}
