// src/config.rs
//
// Parameters of one run, validated before any I/O.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CREDENTIAL_DURATION, DEFAULT_DELIMITER, DEFAULT_ESCAPE,
    DEFAULT_POLL_INTERVAL,
};
use crate::coordinator::CoordinatorOptions;
use crate::error::{EtlError, Result};
use crate::object_store::ExistencePolicy;
use crate::pipeline::{DecodePolicy, PipelineOptions};

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Source table, `schema.name` or `"schema"."name"`.
    pub table_name: String,
    pub id_column: String,
    pub name_column: String,
    pub bucket_name: String,
    /// Destination table; defaults to `parsed_names` in the source schema.
    pub destination: Option<String>,
    /// Run folder override; defaults to `parsed-names/<timestamp>`.
    pub run_folder: Option<String>,
    pub delimiter: u8,
    pub poll_interval: Duration,
    pub credential_duration: Duration,
    pub max_in_flight: Option<usize>,
    pub channel_capacity: usize,
    pub exists_policy: ExistencePolicy,
    pub decode_policy: DecodePolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            id_column: String::new(),
            name_column: String::new(),
            bucket_name: String::new(),
            destination: None,
            run_folder: None,
            delimiter: DEFAULT_DELIMITER,
            poll_interval: DEFAULT_POLL_INTERVAL,
            credential_duration: DEFAULT_CREDENTIAL_DURATION,
            max_in_flight: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            exists_policy: ExistencePolicy::default(),
            decode_policy: DecodePolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn new(
        table_name: impl Into<String>,
        id_column: impl Into<String>,
        name_column: impl Into<String>,
        bucket_name: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            id_column: id_column.into(),
            name_column: name_column.into(),
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            (&self.table_name, "tableName is required"),
            (&self.id_column, "idColumn is required"),
            (&self.name_column, "nameColumn is required"),
            (&self.bucket_name, "bucketName is required"),
        ];
        for (value, message) in required {
            if value.trim().is_empty() {
                return Err(EtlError::config(message));
            }
        }
        if matches!(self.delimiter, b'\n' | b'\r') || self.delimiter == DEFAULT_ESCAPE {
            return Err(EtlError::config(format!(
                "delimiter {:?} cannot separate fields",
                char::from(self.delimiter)
            )));
        }
        if self.max_in_flight == Some(0) {
            return Err(EtlError::config("maxInFlight must be at least 1"));
        }
        Ok(())
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            max_in_flight: self.max_in_flight,
            pipeline: PipelineOptions {
                delimiter: self.delimiter,
                channel_capacity: self.channel_capacity,
                exists_policy: self.exists_policy,
                decode_policy: self.decode_policy,
                ..PipelineOptions::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(cfg: &RunConfig) -> String {
        match cfg.validate() {
            Err(EtlError::Configuration(m)) => m,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn each_required_parameter_is_named() {
        let ok = RunConfig::new("crm.people", "id", "full_name", "bucket");
        assert!(ok.validate().is_ok());

        let mut c = ok.clone();
        c.table_name.clear();
        assert_eq!(message(&c), "tableName is required");

        let mut c = ok.clone();
        c.id_column = "  ".into();
        assert_eq!(message(&c), "idColumn is required");

        let mut c = ok.clone();
        c.name_column.clear();
        assert_eq!(message(&c), "nameColumn is required");

        let mut c = ok.clone();
        c.bucket_name.clear();
        assert_eq!(message(&c), "bucketName is required");
    }

    #[test]
    fn rejects_unusable_delimiters_and_zero_parallelism() {
        let mut c = RunConfig::new("crm.people", "id", "full_name", "bucket");
        c.delimiter = b'\n';
        assert!(c.validate().is_err());

        let mut c = RunConfig::new("crm.people", "id", "full_name", "bucket");
        c.max_in_flight = Some(0);
        assert!(c.validate().is_err());
    }

    #[test]
    fn options_carry_the_run_settings() {
        let mut c = RunConfig::new("crm.people", "id", "full_name", "bucket");
        c.delimiter = b'\t';
        c.max_in_flight = Some(3);
        c.decode_policy = DecodePolicy::SkipAndLog;
        let o = c.coordinator_options();
        assert_eq!(o.max_in_flight, Some(3));
        assert_eq!(o.pipeline.delimiter, b'\t');
        assert_eq!(o.pipeline.escape, DEFAULT_ESCAPE);
        assert_eq!(o.pipeline.decode_policy, DecodePolicy::SkipAndLog);
    }
}
