// src/error.rs
//
// Error taxonomy shared by the whole run: configuration, transport, query
// state and record decoding failures.

use thiserror::Error;

use crate::job_client::JobId;

/// Library result type.
pub type Result<T> = std::result::Result<T, EtlError>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum EtlError {
    /// A required run parameter is missing or malformed. Raised before any I/O.
    #[error("{0}")]
    Configuration(String),

    /// A list/get/put/stream failure against storage or the job API transport.
    #[error("{operation} failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    QueryState(#[from] QueryStateError),

    /// A malformed record row.
    #[error("malformed record {record} in {uri}: {reason}")]
    Decode {
        uri: String,
        record: u64,
        reason: String,
    },

    /// The job API answered with a non-success status.
    #[error("job API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON serialization/deserialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A query job reached a terminal state other than `succeeded`.
#[derive(Debug, Error)]
pub enum QueryStateError {
    #[error("Query was inadvertently cancelled: job {job_id} was cancelled")]
    Cancelled { job_id: JobId },

    #[error("Exception: {exception}\n        Query: {sql}")]
    Failed {
        job_id: JobId,
        exception: String,
        sql: String,
    },

    #[error("Unrecognized query state: {state} (job {job_id})")]
    Unrecognized { job_id: JobId, state: String },
}

impl QueryStateError {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Cancelled { job_id }
            | Self::Failed { job_id, .. }
            | Self::Unrecognized { job_id, .. } => *job_id,
        }
    }
}

impl EtlError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Wrap a lower level failure, keeping it reachable through `source()`.
    pub fn transport(operation: impl Into<String>, err: impl Into<anyhow::Error>) -> Self {
        let err: anyhow::Error = err.into();
        Self::Transport {
            operation: operation.into(),
            source: BoxError::from(err),
        }
    }

    pub fn decode(uri: impl Into<String>, record: u64, reason: impl Into<String>) -> Self {
        Self::Decode {
            uri: uri.into(),
            record,
            reason: reason.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport("job API request", err)
    }
}
