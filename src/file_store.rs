// src/file_store.rs
//
// FileSystemObjectStore: the ObjectStore seam over a local directory tree.
// Used for local runs of the transform stage and throughout the tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::completion::{CompletionSignal, EVENT_END};
use crate::error::EtlError;
use crate::object_store::{ObjectReader, ObjectStore, Scheme};

/// Marker of in-progress uploads; such files are never listed.
const PARTIAL_SUFFIX: &str = ".partial";

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// URI Mapping: `file:///absolute/path` -> `/absolute/path`.
#[derive(Debug, Clone, Default)]
pub struct FileSystemObjectStore;

impl FileSystemObjectStore {
    pub fn new() -> Self {
        Self
    }

    fn uri_to_path(uri: &str) -> Result<PathBuf> {
        match uri.strip_prefix("file://") {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => bail!("FileSystemObjectStore expects file:// URI, got: {uri}"),
        }
    }

    fn path_to_uri(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn partial_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        path.with_file_name(format!(".{name}.{}.{seq}{PARTIAL_SUFFIX}", std::process::id()))
    }

    async fn collect_files_recursive(dir: &Path, results: &mut Vec<PathBuf>) -> Result<()> {
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("read_dir {} failed", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                Box::pin(Self::collect_files_recursive(&path, results)).await?;
            } else if !path.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                results.push(path);
            }
        }
        Ok(())
    }

    /// Copy `body` to a hidden sibling, then rename over `path`.
    async fn write_atomically(path: &Path, mut body: ObjectReader) -> Result<u64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create_dir_all {} failed", parent.display()))?;
        }
        let partial = Self::partial_path(path);
        let written = async {
            let mut file = fs::File::create(&partial).await?;
            let n = tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(n)
        }
        .await;

        match written {
            Ok(n) => {
                fs::rename(&partial, path)
                    .await
                    .with_context(|| format!("rename into {} failed", path.display()))?;
                Ok(n)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                Err(e).with_context(|| format!("writing {} failed", path.display()))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    fn scheme(&self) -> Scheme {
        Scheme::File
    }

    /// Every file under the prefix's directory whose path starts with the
    /// prefix, so `file:///d/run/input` matches `/d/run/input0000_part_00`.
    async fn list(&self, uri_prefix: &str) -> Result<Vec<String>> {
        let prefix = Self::uri_to_path(uri_prefix)?;
        let prefix_str = prefix.to_string_lossy().into_owned();
        let base = if prefix_str.ends_with('/') {
            prefix.clone()
        } else {
            prefix.parent().map(Path::to_path_buf).unwrap_or_else(|| prefix.clone())
        };

        if !fs::try_exists(&base).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        Self::collect_files_recursive(&base, &mut files).await?;
        let mut uris: Vec<String> = files
            .iter()
            .filter(|p| p.to_string_lossy().starts_with(&prefix_str))
            .map(|p| Self::path_to_uri(p))
            .collect();
        uris.sort();
        Ok(uris)
    }

    async fn get_stream(&self, uri: &str) -> Result<ObjectReader> {
        let path = Self::uri_to_path(uri)?;
        let file = fs::File::open(&path)
            .await
            .with_context(|| format!("open {} failed", path.display()))?;
        Ok(Box::pin(file))
    }

    async fn put_stream(&self, uri: &str, body: ObjectReader) -> Result<CompletionSignal> {
        let path = Self::uri_to_path(uri)?;
        let (emitter, signal) = CompletionSignal::channel();
        let uri = uri.to_string();

        tokio::spawn(async move {
            match Self::write_atomically(&path, body).await {
                Ok(bytes) => {
                    debug!(%uri, bytes, "file written");
                    emitter.emit(EVENT_END);
                }
                Err(e) => {
                    error!(%uri, error = %e, "file upload failed");
                    emitter.fail(EtlError::transport(format!("PUT {uri}"), e));
                }
            }
        });
        Ok(signal)
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = Self::uri_to_path(uri)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("stat {} failed", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::ExistencePolicy;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn uri(dir: &Path, rel: &str) -> String {
        format!("file://{}/{rel}", dir.display())
    }

    #[tokio::test]
    async fn put_then_get_round_trip_signals_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemObjectStore::new();
        let target = uri(dir.path(), "run/output0000_part_00.gz");

        let signal = store
            .put_stream(&target, Box::pin(Cursor::new(b"hello".to_vec())))
            .await
            .unwrap();
        assert_eq!(signal.await.unwrap(), EVENT_END);
        assert!(store.exists(&target).await.unwrap());

        let mut body = Vec::new();
        store.get_stream(&target).await.unwrap().read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn list_matches_key_prefix_not_just_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemObjectStore::new();
        for rel in ["run/input0000_part_00", "run/input0001_part_00", "run/output0000_part_00", "other/x"] {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"x").unwrap();
        }
        std::fs::write(dir.path().join("run/.input9.1.0.partial"), b"x").unwrap();

        let listed = store.list(&uri(dir.path(), "run/input")).await.unwrap();
        assert_eq!(
            listed,
            vec![uri(dir.path(), "run/input0000_part_00"), uri(dir.path(), "run/input0001_part_00")]
        );
        assert!(store.list(&uri(dir.path(), "missing/input")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemObjectStore::new();
        let target = uri(dir.path(), "nope");
        assert!(!store.exists(&target).await.unwrap());
        assert!(store.get_stream(&target).await.is_err());

        let policy = ExistencePolicy {
            interval: Duration::from_millis(1),
            max_attempts: 3,
        };
        let err = store.wait_until_exists(&target, &policy).await.unwrap_err();
        assert!(err.to_string().contains("3 existence checks"));
    }

    #[tokio::test]
    async fn failed_body_leaves_no_object() {
        struct Broken;
        impl tokio::io::AsyncRead for Broken {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
                _: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::other("upstream failed")))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemObjectStore::new();
        let target = uri(dir.path(), "out/part");
        let signal = store.put_stream(&target, Box::pin(Broken)).await.unwrap();
        assert!(signal.await.unwrap_err().is_transport());
        assert!(!store.exists(&target).await.unwrap());
        assert!(store.list(&uri(dir.path(), "out/")).await.unwrap().is_empty());
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(FileSystemObjectStore::uri_to_path("s3://b/k").is_err());
        assert!(FileSystemObjectStore::uri_to_path("file://").is_err());
    }
}
