//! Directory-backed store: one file per key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::store::{page_keys, ListRequest, ListResult, ObjectStore};
use crate::error::{LabError, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores each object as a file named after its key under `root`.
///
/// Keys containing `/` map to subdirectories.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root`; the directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(LabError::Storage(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LabError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        Ok(())
    }

    /// Temp sibling of `path`, distinct per call and per process.
    fn unique_tmp(path: &Path) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
        path.with_file_name(format!("{name}.{}-{n}.tmp", std::process::id()))
    }

    async fn write_tmp(tmp: &Path, body: &[u8]) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(tmp)
            .await
            .map_err(|e| LabError::Storage(format!("create {}: {e}", tmp.display())))?;
        file.write_all(body)
            .await
            .map_err(|e| LabError::Storage(format!("write {}: {e}", tmp.display())))?;
        file.sync_all()
            .await
            .map_err(|e| LabError::Storage(format!("sync {}: {e}", tmp.display())))?;
        Ok(())
    }

    /// Every key under the root, relative with `/` separators.
    async fn all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(LabError::Storage(format!("read {}: {e}", dir.display()))),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| LabError::Storage(format!("read {}: {e}", dir.display())))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| LabError::Storage(format!("stat {}: {e}", path.display())))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if !key.ends_with(".tmp") {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;

        // Write then rename so readers never see a partial object.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| LabError::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| LabError::Storage(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, body: Bytes, _content_type: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;

        // The key only appears once its full body is on disk; a failed
        // write leaves at most a `.tmp` file, which listings skip.
        let tmp = Self::unique_tmp(&path);
        let published = match Self::write_tmp(&tmp, &body).await {
            Ok(()) => match tokio::fs::hard_link(&tmp, &path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(LabError::Storage(format!("link {}: {e}", path.display()))),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            if e.kind() != ErrorKind::NotFound {
                debug!(path = %tmp.display(), error = %e, "leftover temp file");
            }
        }
        published
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(e) => {
                debug!(key, error = %e, "unaddressable key reads as absent");
                return Ok(None);
            }
        };
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LabError::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    async fn list(&self, request: &ListRequest) -> Result<ListResult> {
        let keys = self.all_keys().await?;
        Ok(page_keys(keys.iter(), request))
    }

    fn name(&self) -> &'static str {
        "fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store.put("session_2.json", Bytes::from_static(b"{}"), "application/json").await.unwrap();
        store.put("session_1.json", Bytes::from_static(b"{}"), "application/json").await.unwrap();
        store.put("idempotency/k.json", Bytes::from_static(b"{}"), "application/json").await.unwrap();

        let all = store
            .list(&ListRequest {
                max_keys: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.keys, vec!["idempotency/k.json", "session_1.json", "session_2.json"]);
        assert_eq!(
            store.get("session_1.json").await.unwrap().unwrap(),
            Bytes::from_static(b"{}")
        );
    }

    #[tokio::test]
    async fn test_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("not-yet"));
        let page = store
            .list(&ListRequest {
                max_keys: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.keys.is_empty());
        assert!(store.get("session_1.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conditional_create_and_key_checks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.put_if_absent("a.json", Bytes::from_static(b"1"), "").await.unwrap());
        assert!(!store.put_if_absent("a.json", Bytes::from_static(b"2"), "").await.unwrap());
        assert!(store.put_if_absent("../escape.json", Bytes::new(), "").await.is_err());
    }

    #[tokio::test]
    async fn test_unaddressable_key_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("root"));
        tokio::fs::write(dir.path().join("escape.json"), b"outside").await.unwrap();
        assert!(store.get("../escape.json").await.unwrap().is_none());
        assert!(store.get("a//b.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conditional_create_leaves_no_partial_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        // A temp file from an interrupted claim neither blocks the key nor lists.
        tokio::fs::create_dir_all(dir.path().join("idempotency")).await.unwrap();
        tokio::fs::write(dir.path().join("idempotency/k.json.1-0.tmp"), b"").await.unwrap();
        assert!(store.get("idempotency/k.json").await.unwrap().is_none());

        assert!(store
            .put_if_absent("idempotency/k.json", Bytes::from_static(b"{\"sessionId\":\"s1\"}"), "")
            .await
            .unwrap());
        assert!(!store
            .put_if_absent("idempotency/k.json", Bytes::from_static(b"{\"sessionId\":\"s2\"}"), "")
            .await
            .unwrap());
        assert_eq!(
            store.get("idempotency/k.json").await.unwrap().unwrap(),
            Bytes::from_static(b"{\"sessionId\":\"s1\"}")
        );

        let page = store
            .list(&ListRequest {
                max_keys: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.keys, vec!["idempotency/k.json"]);

        // Only the stale leftover remains beside the published key.
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path().join("idempotency")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(names, vec!["k.json", "k.json.1-0.tmp"]);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let claims = (0..8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .put_if_absent("claim.json", Bytes::from(format!("{i}")), "")
                    .await
                    .unwrap()
            })
        });
        let won: Vec<bool> = futures::future::try_join_all(claims).await.unwrap();
        assert_eq!(won.iter().filter(|w| **w).count(), 1);
        let body = store.get("claim.json").await.unwrap().unwrap();
        assert!(!body.is_empty());
    }
}
