// src/job_client.rs
//
// Client for the job API that runs SQL against the warehouse and issues
// temporary storage credentials. Queries are asynchronous: a job is created,
// then polled at a fixed interval until it reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::constants::{DEFAULT_API_BASE_URL, DEFAULT_CREDENTIAL_DURATION, DEFAULT_PREVIEW_ROWS};
use crate::credential::AwsCredential;
use crate::error::{EtlError, QueryStateError, Result};
use crate::http::{HttpClientConfig, build_http_client};

pub type JobId = u64;

/// State reported for a query job. Unknown states keep their raw text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Other(String),
}

impl From<String> for JobState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Other(s),
        }
    }
}

impl JobState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Other(s) => s,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryJob {
    pub id: JobId,
    pub state: JobState,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
}

impl QueryJob {
    /// Map a terminal state to the run outcome; `None` while still pending.
    pub fn outcome(&self) -> Option<Result<()>> {
        match &self.state {
            JobState::Succeeded => Some(Ok(())),
            JobState::Queued | JobState::Running => None,
            JobState::Cancelled => Some(Err(QueryStateError::Cancelled { job_id: self.id }.into())),
            JobState::Failed => Some(Err(QueryStateError::Failed {
                job_id: self.id,
                exception: self.exception.clone().unwrap_or_default(),
                sql: self.sql.clone().unwrap_or_default(),
            }
            .into())),
            JobState::Other(state) => Some(Err(QueryStateError::Unrecognized {
                job_id: self.id,
                state: state.clone(),
            }
            .into())),
        }
    }
}

/// Operations the run needs from the job API.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submit SQL and return the new job's id.
    async fn create_query_job(&self, sql: &str) -> Result<JobId>;

    async fn get_query_job(&self, job_id: JobId) -> Result<QueryJob>;

    /// Issue temporary storage credentials valid for `duration`.
    async fn create_temporary_credentials(&self, duration: Duration) -> Result<AwsCredential>;

    /// Poll `job_id` every `interval` until it succeeds, retrying without limit
    /// while it is queued or running.
    async fn delay_until_query_completion(&self, job_id: JobId, interval: Duration) -> Result<QueryJob> {
        let mut job = self.get_query_job(job_id).await?;
        loop {
            match job.outcome() {
                Some(Ok(())) => return Ok(job),
                Some(Err(e)) => return Err(e),
                None => {
                    info!("Query {} is {}, delaying {:?} ...", job_id, job.state.as_str(), interval);
                    tokio::time::sleep(interval).await;
                    debug!("...and trying query {} again", job_id);
                    job = self.get_query_job(job_id).await?;
                }
            }
        }
    }
}

#[async_trait]
impl<T: JobApi + ?Sized> JobApi for Arc<T> {
    async fn create_query_job(&self, sql: &str) -> Result<JobId> {
        (**self).create_query_job(sql).await
    }

    async fn get_query_job(&self, job_id: JobId) -> Result<QueryJob> {
        (**self).get_query_job(job_id).await
    }

    async fn create_temporary_credentials(&self, duration: Duration) -> Result<AwsCredential> {
        (**self).create_temporary_credentials(duration).await
    }
}

// -----------------------------------------------------------------------------
// Wire types
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateQueryRequest<'a> {
    database: u64,
    preview_rows: u32,
    sql: &'a str,
}

#[derive(Debug, Serialize)]
struct TemporaryCredentialRequest {
    duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemporaryCredentialResponse {
    access_key: String,
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
}

/// Connection settings for [`CivisClient`].
#[derive(Debug, Clone)]
pub struct CivisConfig {
    pub base_url: String,
    pub api_key: String,
    pub preview_rows: u32,
    pub http: HttpClientConfig,
}

impl CivisConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: api_key.into(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            http: HttpClientConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// HTTP implementation of [`JobApi`].
///
/// The database id and the S3 credential id are looked up on first use and
/// cached for the lifetime of the client.
pub struct CivisClient {
    client: Client,
    base_url: Url,
    api_key: String,
    preview_rows: u32,
    database_id: OnceCell<u64>,
    s3_credential_id: OnceCell<u64>,
}

impl CivisClient {
    pub fn new(config: CivisConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(EtlError::config("apiKey must be specified"));
        }
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| EtlError::config(format!("invalid job API base URL `{}`: {e}", config.base_url)))?;
        let client = build_http_client(&config.http)?;
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            preview_rows: config.preview_rows,
            database_id: OnceCell::new(),
            s3_credential_id: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| EtlError::config(format!("invalid job API path `{path}`: {e}")))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self
            .client
            .request(method, self.url(path)?)
            .bearer_auth(&self.api_key)
            .header("Version", "1"))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(EtlError::Api { status: status.as_u16(), message });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// First database visible to the API key.
    pub async fn database_id(&self) -> Result<u64> {
        self.database_id
            .get_or_try_init(|| async {
                let dbs: Vec<IdOnly> = self.send_json(self.request(reqwest::Method::GET, "databases")?).await?;
                let id = dbs
                    .first()
                    .map(|d| d.id)
                    .ok_or_else(|| EtlError::Api { status: 200, message: "no databases visible to this API key".into() })?;
                debug!("Using database {}", id);
                Ok::<_, EtlError>(id)
            })
            .await
            .copied()
    }

    async fn s3_credential_id(&self) -> Result<u64> {
        self.s3_credential_id
            .get_or_try_init(|| async {
                let req = self
                    .request(reqwest::Method::GET, "credentials")?
                    .query(&[("type", "Amazon Web Services S3")]);
                let creds: Vec<IdOnly> = self.send_json(req).await?;
                creds.first().map(|c| c.id).ok_or_else(|| EtlError::Api {
                    status: 200,
                    message: "No AWS S3 credentials have been loaded to Civis".into(),
                })
            })
            .await
            .copied()
    }
}

#[async_trait]
impl JobApi for CivisClient {
    async fn create_query_job(&self, sql: &str) -> Result<JobId> {
        let database = self.database_id().await?;
        let body = CreateQueryRequest { database, preview_rows: self.preview_rows, sql };
        let job: IdOnly = self
            .send_json(self.request(reqwest::Method::POST, "queries")?.json(&body))
            .await?;
        info!("Created query job {}", job.id);
        Ok(job.id)
    }

    async fn get_query_job(&self, job_id: JobId) -> Result<QueryJob> {
        self.send_json(self.request(reqwest::Method::GET, &format!("queries/{job_id}"))?)
            .await
    }

    async fn create_temporary_credentials(&self, duration: Duration) -> Result<AwsCredential> {
        let cred_id = self.s3_credential_id().await?;
        let duration = if duration.is_zero() { DEFAULT_CREDENTIAL_DURATION } else { duration };
        let body = TemporaryCredentialRequest { duration: duration.as_secs() };
        let temp: TemporaryCredentialResponse = self
            .send_json(
                self.request(reqwest::Method::POST, &format!("credentials/{cred_id}/temporary"))?
                    .json(&body),
            )
            .await?;
        Ok(AwsCredential::new(temp.access_key, temp.secret_access_key, temp.session_token))
    }
}
