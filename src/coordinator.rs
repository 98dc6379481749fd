// src/coordinator.rs
//
// Fans the transform out over every object of the dump and folds the results.
// The first failure fails the run at once. Objects already running are not
// cancelled; they are detached and finish (or fail) on their own. With a cap
// on in-flight objects, queued objects that have not started yet are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{EtlError, Result};
use crate::job_client::JobId;
use crate::object_store::{location_uri, ObjectStore};
use crate::pipeline::{transform_object, ObjectKey, ObjectReport, PipelineOptions};
use crate::run_descriptor::RunDescriptor;

#[derive(Debug, Clone, Default)]
pub struct CoordinatorOptions {
    /// `None`: one task per object, all started at once.
    pub max_in_flight: Option<usize>,
    pub pipeline: PipelineOptions,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The input descriptor with `row_count` set.
    pub descriptor: RunDescriptor,
    /// One report per object, ordered by source URI.
    pub objects: Vec<ObjectReport>,
    /// COPY job that loaded the output, when the run got that far.
    pub copy_job_id: Option<JobId>,
}

impl RunSummary {
    pub fn rows(&self) -> u64 {
        self.descriptor.row_count.unwrap_or_default()
    }
}

/// List the dump, transform every object, and set the run's row count.
pub async fn run(
    mut descriptor: RunDescriptor,
    store: Arc<dyn ObjectStore>,
    options: &CoordinatorOptions,
) -> Result<RunSummary> {
    let scheme = store.scheme();
    let source_location = location_uri(scheme, &descriptor.bucket, &descriptor.source_prefix);
    let destination_location =
        location_uri(scheme, &descriptor.bucket, &descriptor.destination_prefix);

    let listed = store
        .list(&source_location)
        .await
        .map_err(|e| EtlError::transport(format!("LIST {source_location}"), e))?;
    let keys = listed
        .iter()
        .map(|uri| ObjectKey::derive(uri, &source_location, &destination_location))
        .collect::<Result<Vec<_>>>()?;
    info!(objects = keys.len(), source = %source_location, "transforming objects");

    let query_job_id = descriptor.query_job_id.unwrap_or_default();
    let rows = Arc::new(AtomicU64::new(0));
    // The descriptor's delimiter is the one the dump was written with.
    let pipeline = Arc::new(PipelineOptions {
        delimiter: descriptor.delimiter,
        ..options.pipeline.clone()
    });
    let stop = CancellationToken::new();
    let slots = options.max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1))));

    let mut pending = FuturesUnordered::new();
    for key in keys {
        let store = Arc::clone(&store);
        let rows = Arc::clone(&rows);
        let pipeline = Arc::clone(&pipeline);
        let stop = stop.clone();
        let slots = slots.clone();

        pending.push(tokio::spawn(async move {
            let _permit = match slots {
                Some(slots) => tokio::select! {
                    biased;
                    _ = stop.cancelled() => return Ok(None),
                    permit = slots.acquire_owned() => Some(
                        permit.map_err(|e| EtlError::transport("acquire object slot", e))?,
                    ),
                },
                None => None,
            };
            if stop.is_cancelled() {
                debug!(source = %key.source_uri, "not started: run already failed");
                return Ok(None);
            }
            let outcome = transform_object(store, key, query_job_id, rows, pipeline).await;
            // Stop queued objects before this slot is released.
            if outcome.is_err() {
                stop.cancel();
            }
            outcome.map(Some)
        }));
    }

    let mut objects = Vec::with_capacity(pending.len());
    while let Some(joined) = pending.next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => Err(EtlError::transport("object task", e)),
        };
        match outcome {
            Ok(Some(report)) => objects.push(report),
            Ok(None) => {}
            Err(e) => {
                stop.cancel();
                error!(error = %e, remaining = pending.len(), "object failed, abandoning run");
                // Dropping `pending` detaches the JoinHandles; running tasks carry on.
                return Err(e);
            }
        }
    }

    objects.sort_by(|a, b| a.source_uri.cmp(&b.source_uri));
    let total = rows.load(Ordering::SeqCst);
    descriptor.row_count = Some(total);
    info!(objects = objects.len(), rows = total, "all objects transformed");

    Ok(RunSummary {
        descriptor,
        objects,
        copy_job_id: None,
    })
}
