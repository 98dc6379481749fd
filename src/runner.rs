// src/runner.rs
//
// End-to-end run: UNLOAD the name column, transform the dump, COPY the result
// back. Each query is polled to completion before the next phase starts.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use crate::config::RunConfig;
use crate::coordinator::{self, RunSummary};
use crate::credential::AwsCredential;
use crate::error::{EtlError, QueryStateError, Result};
use crate::job_client::{JobApi, JobId};
use crate::object_store::ObjectStore;
use crate::run_descriptor::RunDescriptor;
use crate::s3_client::{scoped_client, S3ClientSettings};
use crate::s3_store::S3ObjectStore;
use crate::sql;
use crate::table::{SourceTable, Table};

/// Builds the run's storage handle once its credential has been issued.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn store_for(&self, credential: &AwsCredential) -> Result<Arc<dyn ObjectStore>>;
}

/// S3 stores on a client scoped to the run credential.
#[derive(Debug, Clone, Default)]
pub struct S3StoreFactory {
    settings: S3ClientSettings,
}

impl S3StoreFactory {
    pub fn new(settings: S3ClientSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl StoreFactory for S3StoreFactory {
    async fn store_for(&self, credential: &AwsCredential) -> Result<Arc<dyn ObjectStore>> {
        let client = scoped_client(Some(credential), &self.settings).await;
        Ok(Arc::new(S3ObjectStore::new(client)))
    }
}

pub struct Runner {
    jobs: Arc<dyn JobApi>,
    stores: Arc<dyn StoreFactory>,
}

impl Runner {
    pub fn new(jobs: Arc<dyn JobApi>, stores: Arc<dyn StoreFactory>) -> Self {
        Self { jobs, stores }
    }

    /// Validate `config`, then run every phase in order.
    pub async fn run(&self, config: &RunConfig) -> Result<RunSummary> {
        config.validate()?;
        let started = Instant::now();
        let mut descriptor = describe(config)?;
        info!(
            source = %descriptor.source_table,
            destination = %descriptor.destination_table,
            bucket = %descriptor.bucket,
            prefix = %descriptor.prefix,
            "starting run"
        );

        let credential = self
            .jobs
            .create_temporary_credentials(config.credential_duration)
            .await?;
        info!(credential = %credential, "temporary credentials issued");
        let store = self.stores.store_for(&credential).await?;
        descriptor.credential = Some(credential);

        let unload = sql::unload_sql(&descriptor)?;
        let unload_job = self.execute(&unload, config).await?;
        descriptor.query_job_id = Some(unload_job);
        info!(job = unload_job, prefix = %descriptor.source_prefix, "unload finished");

        let mut summary = coordinator::run(descriptor, store, &config.coordinator_options()).await?;

        let copy = sql::copy_sql(&summary.descriptor)?;
        let copy_job = self.execute(&copy, config).await?;
        summary.copy_job_id = Some(copy_job);
        info!(
            job = copy_job,
            rows = summary.rows(),
            table = %summary.descriptor.destination_table,
            elapsed = ?started.elapsed(),
            "copy finished"
        );
        Ok(summary)
    }

    /// Submit `sql` and wait for it to succeed.
    async fn execute(&self, sql: &str, config: &RunConfig) -> Result<JobId> {
        let job_id = self.jobs.create_query_job(sql).await?;
        info!(job = job_id, "query submitted");
        self.jobs
            .delay_until_query_completion(job_id, config.poll_interval)
            .await
            .map_err(|e| with_submitted_sql(e, sql))?;
        Ok(job_id)
    }
}

/// Tables and run folder for `config`.
pub fn describe(config: &RunConfig) -> Result<RunDescriptor> {
    let source = SourceTable::parse(&config.table_name, &config.id_column, &config.name_column)?;
    let destination = Table::destination_for(&source.table, config.destination.as_deref())?;
    let descriptor = match &config.run_folder {
        Some(folder) => RunDescriptor::with_prefix(
            source,
            destination,
            &config.bucket_name,
            folder.trim_end_matches('/'),
            chrono::Local::now(),
        ),
        None => RunDescriptor::new(source, destination, &config.bucket_name),
    };
    Ok(descriptor.with_delimiter(config.delimiter))
}

// The job API does not always echo the SQL back; report what was sent.
fn with_submitted_sql(err: EtlError, submitted: &str) -> EtlError {
    match err {
        EtlError::QueryState(QueryStateError::Failed {
            job_id,
            exception,
            sql,
        }) if sql.is_empty() => QueryStateError::Failed {
            job_id,
            exception,
            sql: submitted.to_string(),
        }
        .into(),
        other => other,
    }
}
