// src/pipeline.rs
//
// Per-object transform: gunzip -> decode -> decompose -> encode -> gzip ->
// upload -> confirm visible. Records flow in order; the encoder hands batches
// to the uploader over a bounded channel, so a slow upload suspends decoding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_compression::tokio::bufread::{GzipDecoder, GzipEncoder};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use futures_util::StreamExt;
use tokio::io::BufReader;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::codec::{self, EnrichedRecord};
use crate::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_DELIMITER, DEFAULT_ESCAPE, DEFAULT_READ_BUFFER_SIZE,
    ENCODE_BATCH_ROWS,
};
use crate::error::{EtlError, Result};
use crate::job_client::JobId;
use crate::name_decomposer::decompose;
use crate::object_store::{ExistencePolicy, ObjectStore};

/// What to do with a row that does not decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Fail the object.
    #[default]
    Reject,
    /// Log it, leave it out of the output and the row count.
    SkipAndLog,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Field delimiter for one object. The coordinator sets it from the run
    /// descriptor.
    pub delimiter: u8,
    pub escape: u8,
    /// Encoded batches buffered ahead of the uploader.
    pub channel_capacity: usize,
    pub exists_policy: ExistencePolicy,
    pub decode_policy: DecodePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            escape: DEFAULT_ESCAPE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            exists_policy: ExistencePolicy::default(),
            decode_policy: DecodePolicy::default(),
        }
    }
}

/// One source object and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub source_uri: String,
    pub destination_uri: String,
}

impl ObjectKey {
    /// Replace the leading `source_location` of `source_uri` with
    /// `destination_location`. A key outside the source location is an error.
    pub fn derive(source_uri: &str, source_location: &str, destination_location: &str) -> Result<Self> {
        let rest = source_uri.strip_prefix(source_location).ok_or_else(|| {
            EtlError::config(format!(
                "listed object {source_uri} is not under source prefix {source_location}"
            ))
        })?;
        Ok(Self {
            source_uri: source_uri.to_string(),
            destination_uri: format!("{destination_location}{rest}"),
        })
    }
}

/// Outcome of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReport {
    pub source_uri: String,
    pub destination_uri: String,
    pub rows: u64,
    pub skipped: u64,
    /// Event the upload finished with (`end`, `success` or `uploaded`).
    pub completion_event: String,
}

type Chunk = std::io::Result<Bytes>;

async fn send_batch(
    tx: &mut mpsc::Sender<Chunk>,
    batch: &mut Vec<EnrichedRecord>,
    delimiter: u8,
) -> Result<bool> {
    if batch.is_empty() {
        return Ok(true);
    }
    let bytes = codec::encode(batch, delimiter)?;
    batch.clear();
    // A closed channel means the upload already ended; its signal says why.
    Ok(tx.send(Ok(Bytes::from(bytes))).await.is_ok())
}

/// Transform one object. `rows` is the run-wide counter and is bumped once
/// per record that makes it into the output.
pub async fn transform_object(
    store: Arc<dyn ObjectStore>,
    key: ObjectKey,
    query_job_id: JobId,
    rows: Arc<AtomicU64>,
    options: Arc<PipelineOptions>,
) -> Result<ObjectReport> {
    let ObjectKey {
        source_uri,
        destination_uri,
    } = key;
    debug!(source = %source_uri, destination = %destination_uri, "object pipeline starting");

    let source = store
        .get_stream(&source_uri)
        .await
        .map_err(|e| EtlError::transport(format!("GET {source_uri}"), e))?;
    let mut gunzip = GzipDecoder::new(BufReader::with_capacity(DEFAULT_READ_BUFFER_SIZE, source));
    gunzip.multiple_members(true);
    let mut records = Box::pin(codec::decode(
        gunzip,
        source_uri.clone(),
        options.delimiter,
        options.escape,
    ));

    let (mut tx, rx) = mpsc::channel::<Chunk>(options.channel_capacity.max(1));
    let body = GzipEncoder::new(StreamReader::new(rx));
    let signal = store
        .put_stream(&destination_uri, Box::pin(body))
        .await
        .map_err(|e| EtlError::transport(format!("PUT {destination_uri}"), e))?;

    let mut batch = Vec::with_capacity(ENCODE_BATCH_ROWS);
    let mut count = 0u64;
    let mut skipped = 0u64;
    let mut upload_open = true;

    let produced: Result<()> = async {
        while let Some(next) = records.next().await {
            let raw = match next {
                Ok(raw) => raw,
                Err(e) if e.is_decode() && options.decode_policy == DecodePolicy::SkipAndLog => {
                    warn!(error = %e, "skipping malformed record");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let name = decompose(&raw.full_name);
            batch.push(EnrichedRecord::new(query_job_id, raw, name));
            rows.fetch_add(1, Ordering::SeqCst);
            count += 1;

            if batch.len() >= ENCODE_BATCH_ROWS {
                upload_open = send_batch(&mut tx, &mut batch, options.delimiter).await?;
                if !upload_open {
                    return Ok(());
                }
            }
        }
        upload_open = send_batch(&mut tx, &mut batch, options.delimiter).await?;
        Ok(())
    }
    .await;

    if let Err(e) = produced {
        // Fail the upload body so no truncated object is committed.
        let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
        return Err(e);
    }
    drop(tx);

    let completion_event = signal.await?;
    if !upload_open {
        debug!(destination = %destination_uri, "upload finished before the encoder");
    }

    store
        .wait_until_exists(&destination_uri, &options.exists_policy)
        .await
        .map_err(|e| EtlError::transport(format!("confirm {destination_uri}"), e))?;

    info!(source = %source_uri, rows = count, skipped, event = %completion_event, "object transformed");
    Ok(ObjectReport {
        source_uri,
        destination_uri,
        rows: count,
        skipped,
        completion_event,
    })
}
