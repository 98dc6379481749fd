// src/lib.rs
//
// Crate root: public re-exports plus the module tree.

// ===== Core Public API =====
pub mod api;

pub use api::*;

// ===== Internal Modules (Implementation) =====
// Public for the binary and the integration tests; may change without notice.

pub mod constants;
pub mod config;
pub mod error;

// Run values
pub mod credential;
pub mod run_descriptor;
pub mod table;

// Transform stage
pub mod codec;
pub mod completion;
pub mod coordinator;
pub mod name_decomposer;
pub mod pipeline;

// Storage backends
pub mod file_store;
pub mod multipart;
pub mod object_store;
pub mod s3_client;
pub mod s3_store;

// Job API and orchestration
pub mod http;
pub mod job_client;
pub mod runner;
pub mod sql;
