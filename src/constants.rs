// src/constants.rs
//
// Centralized constants for parsed-names to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Field delimiter used for both the UNLOAD dump and the re-uploaded rows.
pub const DEFAULT_DELIMITER: u8 = b'|';

/// Escape character handed to the record decoder. NUL never appears in an
/// UNLOAD dump, so in practice no byte is ever treated as an escape.
pub const DEFAULT_ESCAPE: u8 = b'\0';

/// Folder that groups all objects of one run: `parsed-names/<YYYYMMDD-HHmmss>`.
pub const RUN_FOLDER_ROOT: &str = "parsed-names";

/// Timestamp format of the run folder (chrono strftime syntax).
pub const RUN_FOLDER_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Default leaf of the UNLOAD target under the run folder.
pub const DEFAULT_SOURCE_LEAF: &str = "input";

/// Default leaf of the transformed output under the run folder.
pub const DEFAULT_DESTINATION_LEAF: &str = "output";

/// Destination table name used when none is given.
pub const DEFAULT_DESTINATION_TABLE: &str = "parsed_names";

/// Region the temporary storage credentials are issued for.
pub const CREDENTIAL_REGION: &str = "us-east-1";

/// Default base URL of the job API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.civisanalytics.com/";

/// Lifetime requested for temporary storage credentials (1 hour).
pub const DEFAULT_CREDENTIAL_DURATION: Duration = Duration::from_secs(60 * 60);

/// Number of preview rows requested when a query job is created.
pub const DEFAULT_PREVIEW_ROWS: u32 = 1;

/// Fixed delay between two query-state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay between two existence checks after an upload (S3 `ObjectExists` waiter default).
pub const DEFAULT_EXISTS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Existence checks before an uploaded object is declared missing.
pub const DEFAULT_EXISTS_MAX_ATTEMPTS: u32 = 20;

/// Encoded batches buffered between the record encoder and the uploader.
/// A full channel suspends the encoder until the uploader drains it.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Records encoded together into one chunk handed to the uploader.
pub const ENCODE_BATCH_ROWS: usize = 1024;

/// Buffer size of the reader in front of the decompressor (64 KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Objects up to this size are sent with one PUT; larger ones use multipart upload (8 MB).
pub const DEFAULT_S3_MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

/// Minimum S3 multipart upload part size (5 MB - AWS requirement)
pub const MIN_S3_MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum number of concurrent in-flight part uploads per object.
pub const DEFAULT_PART_UPLOADS_IN_FLIGHT: usize = 4;

/// Environment variable holding the job API key.
pub const ENV_API_KEY: &str = "CIVIS_API_KEY";

/// Environment variable overriding the job API base URL.
pub const ENV_API_BASE_URL: &str = "CIVIS_API_BASE_URL";

/// Environment variable capping concurrent object pipelines.
pub const ENV_MAX_IN_FLIGHT: &str = "PARSED_NAMES_MAX_IN_FLIGHT";

/// Read the pipeline cap from the environment, `None` meaning unbounded fan-out.
pub fn max_in_flight_from_env() -> Option<usize> {
    std::env::var(ENV_MAX_IN_FLIGHT)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
}
