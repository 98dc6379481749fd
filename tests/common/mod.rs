// tests/common/mod.rs
//
// Shared fixtures: gzip helpers, a counting / fault-injecting store over the
// local filesystem, and a scripted job API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::watch;

use parsed_names::{
    AwsCredential, CompletionSignal, ExistencePolicy, FileSystemObjectStore, JobApi, JobId,
    JobState, ObjectReader, ObjectStore, QueryJob, Result, Scheme, StoreFactory,
};

// ----------------------------------------------------------------------------
// gzip fixtures
// ----------------------------------------------------------------------------

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

pub fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    MultiGzDecoder::new(bytes).read_to_end(&mut out).unwrap();
    out
}

/// `id|name` rows, newline terminated.
pub fn rows(rows: &[(&str, &str)]) -> Vec<u8> {
    rows.iter()
        .map(|(id, name)| format!("{id}|{name}\n"))
        .collect::<String>()
        .into_bytes()
}

/// Write a gzipped dump part at `base/key`.
pub fn write_part(base: &Path, key: &str, body: &[u8]) {
    let path = base.join(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, gzip(body)).unwrap();
}

/// Decompressed lines of the object at `base/key`.
pub fn read_output(base: &Path, key: &str) -> Vec<String> {
    let bytes = std::fs::read(base.join(key)).unwrap();
    String::from_utf8(gunzip(&bytes))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn fast_exists() -> ExistencePolicy {
    ExistencePolicy {
        interval: Duration::from_millis(5),
        max_attempts: 20,
    }
}

pub fn base_uri(base: &Path) -> String {
    format!("file://{}", base.display())
}

// ----------------------------------------------------------------------------
// Counting / fault-injecting store
// ----------------------------------------------------------------------------

/// Wraps a FileSystemObjectStore, counting calls and injecting failures.
pub struct CountingStore {
    inner: FileSystemObjectStore,
    pub lists: AtomicUsize,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub exists_checks: AtomicUsize,
    /// GETs of URIs containing one of these fail at once.
    fail_get: Vec<String>,
    /// Other GETs wait until the gate opens.
    gate: watch::Sender<bool>,
    /// Number of `false` answers per URI before the real one.
    stale_exists: usize,
    seen_exists: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: FileSystemObjectStore::new(),
            lists: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            exists_checks: AtomicUsize::new(0),
            fail_get: Vec::new(),
            gate,
            stale_exists: 0,
            seen_exists: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing_get(mut self, uri_part: &str) -> Self {
        self.fail_get.push(uri_part.to_string());
        self
    }

    pub fn gated(self) -> Self {
        self.gate.send_replace(false);
        self
    }

    pub fn with_stale_exists(mut self, misses: usize) -> Self {
        self.stale_exists = misses;
        self
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn exists_checks(&self) -> usize {
        self.exists_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    fn scheme(&self) -> Scheme {
        Scheme::File
    }

    async fn list(&self, uri_prefix: &str) -> anyhow::Result<Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(uri_prefix).await
    }

    async fn get_stream(&self, uri: &str) -> anyhow::Result<ObjectReader> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.iter().any(|p| uri.contains(p.as_str())) {
            bail!("injected GET failure for {uri}");
        }
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.inner.get_stream(uri).await
    }

    async fn put_stream(&self, uri: &str, body: ObjectReader) -> anyhow::Result<CompletionSignal> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_stream(uri, body).await
    }

    async fn exists(&self, uri: &str) -> anyhow::Result<bool> {
        self.exists_checks.fetch_add(1, Ordering::SeqCst);
        {
            let mut seen = self.seen_exists.lock().unwrap();
            let n = seen.entry(uri.to_string()).or_insert(0);
            *n += 1;
            if *n <= self.stale_exists {
                return Ok(false);
            }
        }
        self.inner.exists(uri).await
    }
}

// ----------------------------------------------------------------------------
// Scripted job API
// ----------------------------------------------------------------------------

/// Each created job walks through the next script in line; the last state of
/// a script repeats. Jobs without a script succeed at once.
pub struct ScriptedJobApi {
    scripts: Mutex<VecDeque<Vec<JobState>>>,
    jobs: Mutex<HashMap<JobId, VecDeque<JobState>>>,
    pub submitted: Mutex<Vec<String>>,
    fetches: Mutex<HashMap<JobId, usize>>,
    next_id: AtomicU64,
    pub credential_requests: AtomicUsize,
    pub exception: String,
}

impl ScriptedJobApi {
    pub fn new(scripts: Vec<Vec<JobState>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            jobs: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            fetches: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(100),
            credential_requests: AtomicUsize::new(0),
            exception: "relation \"crm.people\" does not exist".to_string(),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Vec::new())
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fetches(&self, job: JobId) -> usize {
        self.fetches.lock().unwrap().get(&job).copied().unwrap_or(0)
    }
}

#[async_trait]
impl JobApi for ScriptedJobApi {
    async fn create_query_job(&self, sql: &str) -> Result<JobId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(sql.to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![JobState::Succeeded]);
        self.jobs.lock().unwrap().insert(id, script.into());
        Ok(id)
    }

    async fn get_query_job(&self, job_id: JobId) -> Result<QueryJob> {
        *self.fetches.lock().unwrap().entry(job_id).or_insert(0) += 1;
        let state = {
            let mut jobs = self.jobs.lock().unwrap();
            let states = jobs.get_mut(&job_id).expect("unknown job");
            if states.len() > 1 {
                states.pop_front().unwrap()
            } else {
                states.front().cloned().unwrap()
            }
        };
        Ok(QueryJob {
            id: job_id,
            exception: (state == JobState::Failed).then(|| self.exception.clone()),
            state,
            sql: None,
        })
    }

    async fn create_temporary_credentials(&self, _duration: Duration) -> Result<AwsCredential> {
        self.credential_requests.fetch_add(1, Ordering::SeqCst);
        Ok(AwsCredential::new("AKIATEST", "secret-test-key", Some("session".into())))
    }
}

/// Hands out the same store for every run, recording the credential it got.
pub struct FixedStoreFactory {
    pub store: Arc<dyn ObjectStore>,
    pub seen: Mutex<Vec<AwsCredential>>,
}

impl FixedStoreFactory {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StoreFactory for FixedStoreFactory {
    async fn store_for(&self, credential: &AwsCredential) -> Result<Arc<dyn ObjectStore>> {
        self.seen.lock().unwrap().push(credential.clone());
        Ok(Arc::clone(&self.store))
    }
}
