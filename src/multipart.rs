// src/multipart.rs
//
// Streaming, concurrent Multipart Upload (MPU) for outputs that outgrow a
// single PUT.
//
// - MultipartUploadConfig configures part sizing and concurrency.
// - MultipartUploadSink:
//     - write_part(Vec<u8>) waits for a free slot, then schedules UploadPart
//     - finish() waits for every part and issues CompleteMultipartUpload
//     - abort() aborts the MPU; Drop does the same if neither ran

use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_PART_UPLOADS_IN_FLIGHT, DEFAULT_S3_MULTIPART_PART_SIZE, MIN_S3_MULTIPART_PART_SIZE,
};

#[derive(Clone, Debug)]
pub struct MultipartUploadConfig {
    /// Target size of each part in bytes (AWS minimum is 5 MiB).
    pub part_size: usize,
    /// Maximum number of concurrent in-flight part uploads.
    pub max_in_flight: usize,
    pub content_type: Option<String>,
}

impl Default for MultipartUploadConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_S3_MULTIPART_PART_SIZE,
            max_in_flight: DEFAULT_PART_UPLOADS_IN_FLIGHT,
            content_type: Some("application/gzip".to_string()),
        }
    }
}

impl MultipartUploadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.part_size < MIN_S3_MULTIPART_PART_SIZE {
            bail!("part_size must be at least 5 MiB for S3 Multipart Upload");
        }
        if self.max_in_flight == 0 {
            bail!("max_in_flight must be >= 1");
        }
        Ok(())
    }
}

/// Result info returned by finish()
#[derive(Clone, Debug)]
pub struct MultipartCompleteInfo {
    pub e_tag: Option<String>,
    pub total_bytes: u64,
    pub parts: usize,
    pub started_at: SystemTime,
    pub completed_at: SystemTime,
}

pub struct MultipartUploadSink {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,

    next_part_number: i32,
    total_bytes: u64,
    started_at: SystemTime,

    sem: Arc<Semaphore>,
    tasks: JoinSet<Result<(i32, String)>>,
    completed: Vec<(i32, String)>,

    finished: bool,
}

impl Drop for MultipartUploadSink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Can't await here; hand the abort to the runtime if there is one.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(upload_id = %self.upload_id, "multipart upload left open: no runtime to abort it");
            return;
        };
        let request = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id);
        handle.spawn(async move {
            let _ = request.send().await;
        });
    }
}

impl MultipartUploadSink {
    /// Issue CreateMultipartUpload for bucket + key.
    pub async fn new(client: Client, bucket: &str, key: &str, cfg: &MultipartUploadConfig) -> Result<Self> {
        cfg.validate()?;

        let mut req = client.create_multipart_upload().bucket(bucket).key(key);
        if let Some(ct) = &cfg.content_type {
            req = req.content_type(ct);
        }
        let resp = req.send().await.context("CreateMultipartUpload failed")?;
        let upload_id = resp.upload_id().unwrap_or_default().to_string();
        if upload_id.is_empty() {
            bail!("CreateMultipartUpload returned empty upload_id");
        }
        debug!(bucket, key, %upload_id, "multipart upload started");

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            next_part_number: 1,
            total_bytes: 0,
            started_at: SystemTime::now(),
            sem: Arc::new(Semaphore::new(cfg.max_in_flight)),
            tasks: JoinSet::new(),
            completed: Vec::new(),
            finished: false,
        })
    }

    /// Schedule one part. Waits while `max_in_flight` parts are uploading so
    /// the caller never buffers more than that many parts.
    pub async fn write_part(&mut self, bytes: Vec<u8>) -> Result<()> {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .context("part upload slots closed")?;

        // Surface failures of parts that already finished.
        while let Some(joined) = self.tasks.try_join_next() {
            self.completed.push(joined.context("part task join failed")??);
        }

        let part_number = self.next_part_number;
        self.next_part_number += 1;
        self.total_bytes += bytes.len() as u64;

        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(bytes));

        self.tasks.spawn(async move {
            let _permit = permit;
            let resp = request.send().await.context("UploadPart failed")?;
            let etag = resp.e_tag().unwrap_or_default().to_string();
            if etag.is_empty() {
                bail!("UploadPart returned empty ETag");
            }
            Ok((part_number, etag))
        });
        Ok(())
    }

    pub async fn finish(&mut self) -> Result<MultipartCompleteInfo> {
        if self.finished {
            bail!("finish() called more than once");
        }
        while let Some(joined) = self.tasks.join_next().await {
            self.completed.push(joined.context("part task join failed")??);
        }

        let mut parts = std::mem::take(&mut self.completed);
        parts.sort_by_key(|(pn, _)| *pn);
        let part_count = parts.len();
        let completed_parts: Vec<CompletedPart> = parts
            .into_iter()
            .map(|(pn, etag)| CompletedPart::builder().e_tag(etag).part_number(pn).build())
            .collect();

        let cmu = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(cmu)
            .send()
            .await
            .context("CompleteMultipartUpload failed")?;

        self.finished = true;

        Ok(MultipartCompleteInfo {
            e_tag: resp.e_tag().map(str::to_string),
            total_bytes: self.total_bytes,
            parts: part_count,
            started_at: self.started_at,
            completed_at: SystemTime::now(),
        })
    }

    /// Stop outstanding parts and abort the MPU. Best effort.
    pub async fn abort(&mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}

        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
        {
            warn!(key = %self.key, error = %e, "AbortMultipartUpload failed");
        }
        self.finished = true;
    }
}
