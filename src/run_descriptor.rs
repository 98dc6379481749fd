// src/run_descriptor.rs
//
// State accumulated over one run: where the dump lives, where the transformed
// rows go, and what each stage produced.

use chrono::{DateTime, Local};

use crate::constants::{
    DEFAULT_DELIMITER, DEFAULT_DESTINATION_LEAF, DEFAULT_SOURCE_LEAF, RUN_FOLDER_ROOT,
    RUN_FOLDER_TIME_FORMAT,
};
use crate::credential::AwsCredential;
use crate::job_client::JobId;
use crate::table::{SourceTable, Table};

#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub source_table: SourceTable,
    pub destination_table: Table,
    /// Bucket name (S3) or base directory (local files).
    pub bucket: String,
    /// Run folder, e.g. `parsed-names/20240131-154500`.
    pub prefix: String,
    pub source_prefix: String,
    pub destination_prefix: String,
    pub delimiter: u8,
    /// Set once, after every object has been transformed.
    pub row_count: Option<u64>,
    /// Id of the UNLOAD job; written into every output row.
    pub query_job_id: Option<JobId>,
    pub credential: Option<AwsCredential>,
    pub start_time: DateTime<Local>,
}

impl RunDescriptor {
    pub fn new(source_table: SourceTable, destination_table: Table, bucket: impl Into<String>) -> Self {
        let start_time = Local::now();
        let prefix = format!("{}/{}", RUN_FOLDER_ROOT, start_time.format(RUN_FOLDER_TIME_FORMAT));
        Self::with_prefix(source_table, destination_table, bucket, prefix, start_time)
    }

    pub fn with_prefix(
        source_table: SourceTable,
        destination_table: Table,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        start_time: DateTime<Local>,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            source_table,
            destination_table,
            bucket: bucket.into(),
            source_prefix: format!("{prefix}/{DEFAULT_SOURCE_LEAF}"),
            destination_prefix: format!("{prefix}/{DEFAULT_DESTINATION_LEAF}"),
            prefix,
            delimiter: DEFAULT_DELIMITER,
            row_count: None,
            query_job_id: None,
            credential: None,
            start_time,
        }
    }

    /// Descriptor for the transform stage alone, over an existing dump. The
    /// tables are left empty; only the UNLOAD/COPY statements need them.
    pub fn for_prefixes(
        bucket: impl Into<String>,
        source_prefix: impl Into<String>,
        destination_prefix: impl Into<String>,
    ) -> Self {
        let mut descriptor = Self::with_prefix(
            SourceTable::default(),
            Table::default(),
            bucket,
            String::new(),
            Local::now(),
        );
        descriptor.source_prefix = source_prefix.into();
        descriptor.destination_prefix = destination_prefix.into();
        descriptor
    }

    /// Replace the leaf names under the run folder.
    pub fn with_leaves(mut self, source_leaf: &str, destination_leaf: &str) -> Self {
        self.source_prefix = format!("{}/{}", self.prefix, source_leaf);
        self.destination_prefix = format!("{}/{}", self.prefix, destination_leaf);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn delimiter_char(&self) -> char {
        char::from(self.delimiter)
    }
}
