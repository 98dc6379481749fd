// tests/test_runner.rs
//
// Full runs against a scripted job API and the local filesystem store.

mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parsed_names::{EtlError, JobState, ObjectStore, QueryStateError, RunConfig, Runner};
use tempfile::TempDir;

use common::*;

fn config(base: &Path) -> RunConfig {
    let mut cfg = RunConfig::new(
        "\"crm\".\"people\"",
        "person_id",
        "display_name",
        base.display().to_string(),
    );
    cfg.run_folder = Some("run1".into());
    cfg.poll_interval = Duration::from_millis(5);
    cfg.exists_policy = fast_exists();
    cfg
}

/// What the UNLOAD would have left behind.
fn write_dump(base: &Path) {
    write_part(base, "run1/input0000_part_00", &rows(&[("1", "Jane Doe"), ("2", "Ms. Smith")]));
    write_part(base, "run1/input0001_part_00", &rows(&[("3", "Dr. John Q. Public Jr.")]));
}

fn runner(jobs: &Arc<ScriptedJobApi>, stores: &Arc<FixedStoreFactory>) -> Runner {
    Runner::new(Arc::clone(jobs) as _, Arc::clone(stores) as _)
}

fn file_stores(store: &Arc<CountingStore>) -> Arc<FixedStoreFactory> {
    Arc::new(FixedStoreFactory::new(Arc::clone(store) as Arc<dyn ObjectStore>))
}

#[tokio::test]
async fn unload_transform_copy() {
    let dir = TempDir::new().unwrap();
    write_dump(dir.path());
    let jobs = Arc::new(ScriptedJobApi::succeeding());
    let store = Arc::new(CountingStore::new());
    let stores = file_stores(&store);

    let summary = runner(&jobs, &stores).run(&config(dir.path())).await.unwrap();

    let submitted = jobs.submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted[0].starts_with("UNLOAD("));
    assert!(submitted[0].contains("run1/input"));
    assert!(submitted[0].contains("\"person_id\""));
    assert!(submitted[1].starts_with("COPY \"crm\".\"parsed_names\""));
    assert!(submitted[1].contains("run1/output"));
    assert!(submitted[1].contains("aws_access_key_id=AKIATEST"));

    assert_eq!(summary.descriptor.query_job_id, Some(100));
    assert_eq!(summary.copy_job_id, Some(101));
    assert_eq!(summary.rows(), 3);
    assert_eq!(jobs.credential_requests.load(Ordering::SeqCst), 1);
    assert_eq!(stores.seen.lock().unwrap().len(), 1);

    assert_eq!(
        read_output(dir.path(), "run1/output0000_part_00"),
        vec!["100|1|Jane Doe||Jane||Doe|", "100|2|Ms. Smith|Ms.|||Smith|"]
    );
}

#[tokio::test]
async fn missing_parameters_fail_before_any_request() {
    let dir = TempDir::new().unwrap();
    let jobs = Arc::new(ScriptedJobApi::succeeding());
    let store = Arc::new(CountingStore::new());

    let mut cfg = config(dir.path());
    cfg.bucket_name.clear();
    let err = runner(&jobs, &file_stores(&store)).run(&cfg).await.unwrap_err();

    match err {
        EtlError::Configuration(message) => assert_eq!(message, "bucketName is required"),
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert!(jobs.submitted().is_empty());
    assert_eq!(jobs.credential_requests.load(Ordering::SeqCst), 0);
    assert_eq!(store.lists.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn queued_then_succeeded_polls_twice() {
    let dir = TempDir::new().unwrap();
    write_dump(dir.path());
    let jobs = Arc::new(ScriptedJobApi::new(vec![vec![JobState::Queued, JobState::Succeeded]]));
    let store = Arc::new(CountingStore::new());

    runner(&jobs, &file_stores(&store)).run(&config(dir.path())).await.unwrap();

    assert_eq!(jobs.fetches(100), 2);
    assert_eq!(jobs.fetches(101), 1);
}

#[tokio::test]
async fn cancelled_unload_stops_the_run() {
    let dir = TempDir::new().unwrap();
    write_dump(dir.path());
    let jobs = Arc::new(ScriptedJobApi::new(vec![vec![JobState::Running, JobState::Cancelled]]));
    let store = Arc::new(CountingStore::new());

    let err = runner(&jobs, &file_stores(&store))
        .run(&config(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EtlError::QueryState(QueryStateError::Cancelled { job_id: 100 })
    ));
    assert!(err.to_string().contains("cancelled"));
    assert_eq!(jobs.submitted().len(), 1);
    assert_eq!(store.gets(), 0);
}

#[tokio::test]
async fn failed_copy_reports_exception_and_sql() {
    let dir = TempDir::new().unwrap();
    write_dump(dir.path());
    let jobs = Arc::new(ScriptedJobApi::new(vec![
        vec![JobState::Succeeded],
        vec![JobState::Failed],
    ]));
    let store = Arc::new(CountingStore::new());

    let err = runner(&jobs, &file_stores(&store))
        .run(&config(dir.path()))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("relation \"crm.people\" does not exist"), "{message}");
    assert!(message.contains("COPY \"crm\".\"parsed_names\""), "{message}");
}

#[tokio::test]
async fn transform_failure_skips_the_copy() {
    let dir = TempDir::new().unwrap();
    write_dump(dir.path());
    let jobs = Arc::new(ScriptedJobApi::succeeding());
    let store = Arc::new(CountingStore::new().failing_get("input0001"));

    let err = runner(&jobs, &file_stores(&store))
        .run(&config(dir.path()))
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(jobs.submitted().len(), 1);
}

#[tokio::test]
async fn destination_override_is_used_by_copy() {
    let dir = TempDir::new().unwrap();
    write_dump(dir.path());
    let jobs = Arc::new(ScriptedJobApi::succeeding());
    let store = Arc::new(CountingStore::new());

    let mut cfg = config(dir.path());
    cfg.destination = Some("analytics.names".into());
    let summary = runner(&jobs, &file_stores(&store)).run(&cfg).await.unwrap();

    assert_eq!(summary.descriptor.destination_table.to_string(), "\"analytics\".\"names\"");
    assert!(jobs.submitted()[1].starts_with("COPY \"analytics\".\"names\""));
}
