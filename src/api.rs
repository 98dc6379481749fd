// src/api.rs
//! # parsed-names public API
//!
//! The stable surface of the crate, re-exported at the crate root.
//!
//! ## Core Concepts
//!
//! - **Runner**: one full run, UNLOAD -> transform -> COPY, driven through a [`JobApi`]
//! - **Coordinator**: the transform stage alone, over any [`ObjectStore`]
//! - **decompose**: the name heuristics on their own
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parsed_names::api::{decompose, transform, CoordinatorOptions, FileSystemObjectStore, RunDescriptor, SourceTable, Table};
//!
//! # async fn example() -> parsed_names::Result<()> {
//! let name = decompose("Dr. John Q. Public Jr.");
//! assert_eq!(name.last.as_deref(), Some("Public"));
//!
//! let source = SourceTable::parse("crm.people", "id", "full_name")?;
//! let destination = Table::destination_for(&source.table, None)?;
//! let run = RunDescriptor::new(source, destination, "/data/dumps");
//! let summary = transform(run, Arc::new(FileSystemObjectStore::new()), &CoordinatorOptions::default()).await?;
//! println!("{} rows", summary.rows());
//! # Ok(())
//! # }
//! ```

/// Name decomposition
pub use crate::name_decomposer::{decompose, NameDecomposition};

/// Records
pub use crate::codec::{EnrichedRecord, RawRecord};

/// Run values
pub use crate::config::RunConfig;
pub use crate::credential::AwsCredential;
pub use crate::run_descriptor::RunDescriptor;
pub use crate::table::{SourceColumns, SourceTable, Table};

/// Storage
pub use crate::completion::{CompletionSignal, EventVocabulary, SignalEmitter};
pub use crate::file_store::FileSystemObjectStore;
pub use crate::object_store::{store_for_uri, ExistencePolicy, ObjectReader, ObjectStore, Scheme};
pub use crate::s3_client::{scoped_client, S3ClientSettings};
pub use crate::s3_store::S3ObjectStore;

/// Transform stage
pub use crate::coordinator::{run as transform, CoordinatorOptions, RunSummary};
pub use crate::pipeline::{DecodePolicy, ObjectKey, ObjectReport, PipelineOptions};

/// Job API and orchestration
pub use crate::job_client::{CivisClient, CivisConfig, JobApi, JobId, JobState, QueryJob};
pub use crate::runner::{Runner, S3StoreFactory, StoreFactory};

/// Errors
pub use crate::error::{EtlError, QueryStateError, Result};
