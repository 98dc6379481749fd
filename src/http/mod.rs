// src/http/mod.rs
//
// HTTP client setup for the job API

pub mod client;

pub use client::{build_http_client, HttpClientConfig};
