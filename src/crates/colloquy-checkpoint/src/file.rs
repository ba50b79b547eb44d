//! File-backed checkpoint store
//!
//! One file per thread under a root directory:
//!
//! ```text
//! <root>/
//!   ├── 7468726561642d31.json      thread "thread-1"
//!   └── 6c6573736f6e2d3432.json    thread "lesson-42"
//! ```
//!
//! File names are the hex encoding of the thread id, so any caller-chosen id
//! maps to a safe file name. Writes go to a temporary sibling first and are
//! moved into place with a rename, so a reader never observes a half-written
//! checkpoint.
//!
//! Every store opened on the same root, in this process or another, sees the
//! same locks:
//!
//! - `<id>.lease` is locked exclusively for the lifetime of a [`ThreadLease`];
//!   a second lease fails at once with [`CheckpointError::ThreadBusy`].
//! - `<id>.lock` is locked around the read, version check and rename of a
//!   put (and around deletes), so two writers cannot both pass the check.
//!
//! Lock files stay in place after a thread is deleted. Unlinking a lock file
//! another process may hold would let a third process lock a fresh one.

use crate::{
    checkpoint::Checkpoint,
    error::{CheckpointError, Result},
    lease::ThreadLease,
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{check_version, CheckpointSaver},
};
use async_trait::async_trait;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

const EXTENSION: &str = "json";
const LEASE_EXTENSION: &str = "lease";
const WRITE_LOCK_EXTENSION: &str = "lock";

#[derive(Debug, Clone)]
pub struct FileCheckpointSaver<S = JsonSerializer> {
    root: PathBuf,
    serializer: S,
    ttl: Option<Duration>,
}

impl FileCheckpointSaver<JsonSerializer> {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_serializer(root, JsonSerializer::pretty()).await
    }
}

impl<S: SerializerProtocol> FileCheckpointSaver<S> {
    pub async fn with_serializer(root: impl Into<PathBuf>, serializer: S) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "opened file checkpoint store");

        Ok(Self {
            root,
            serializer,
            ttl: None,
        })
    }

    /// Expire threads whose last checkpoint is older than `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.sibling(thread_id, EXTENSION)
    }

    fn sibling(&self, thread_id: &str, extension: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", encode_thread_id(thread_id), extension))
    }

    /// Block until this thread's write lock is held. Released when the
    /// returned file is dropped.
    async fn lock_for_write(&self, thread_id: &str) -> Result<File> {
        let path = self.sibling(thread_id, WRITE_LOCK_EXTENSION);
        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            file.lock_exclusive()?;
            Ok::<_, CheckpointError>(file)
        })
        .await
        .map_err(|e| CheckpointError::Storage(format!("write lock task failed: {e}")))?
    }

    async fn read(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(thread_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = self.serializer.loads(&bytes)?;
        if checkpoint.thread_id != thread_id {
            return Err(CheckpointError::Invalid(format!(
                "{} holds thread '{}', expected '{}'",
                path.display(),
                checkpoint.thread_id,
                thread_id
            )));
        }

        match self.ttl {
            Some(ttl) if checkpoint.is_expired(ttl, chrono::Utc::now()) => Ok(None),
            _ => Ok(Some(checkpoint)),
        }
    }

    /// Remove the files of every expired thread, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        if self.ttl.is_none() {
            return Ok(0);
        }

        let mut removed = 0;
        for thread_id in self.thread_ids_on_disk().await? {
            let _guard = self.lock_for_write(&thread_id).await?;
            if self.read(&thread_id).await?.is_none() {
                remove_if_exists(&self.path_for(&thread_id)).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "purged expired threads");
        }
        Ok(removed)
    }

    async fn thread_ids_on_disk(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let decoded = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_thread_id);
            match decoded {
                Some(id) => ids.push(id),
                None => tracing::warn!(path = %path.display(), "skipping foreign file"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl<S: SerializerProtocol> CheckpointSaver for FileCheckpointSaver<S> {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        self.read(thread_id).await
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let _guard = self.lock_for_write(&checkpoint.thread_id).await?;

        let stored = self.read(&checkpoint.thread_id).await?;
        check_version(stored.as_ref(), &checkpoint)?;

        let path = self.path_for(&checkpoint.thread_id);
        let tmp = path.with_extension(format!("{}.{}.tmp", EXTENSION, checkpoint.id));
        let bytes = self.serializer.dumps(&checkpoint)?;

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::trace!(
            thread_id = %checkpoint.thread_id,
            version = checkpoint.version,
            status = %checkpoint.status,
            bytes = bytes.len(),
            "checkpoint written"
        );
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let _guard = self.lock_for_write(thread_id).await?;
        remove_if_exists(&self.path_for(thread_id)).await
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let mut live = Vec::new();
        for thread_id in self.thread_ids_on_disk().await? {
            if self.read(&thread_id).await?.is_some() {
                live.push(thread_id);
            }
        }
        Ok(live)
    }

    fn try_lease(&self, thread_id: &str) -> Result<ThreadLease> {
        let file = open_lock_file(&self.sibling(thread_id, LEASE_EXTENSION))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(ThreadLease::file_locked(thread_id, file)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!(thread_id, "lease rejected, thread busy");
                Err(CheckpointError::ThreadBusy(thread_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn encode_thread_id(thread_id: &str) -> String {
    thread_id.bytes().map(|b| format!("{:02x}", b)).collect()
}

fn decode_thread_id(stem: &str) -> Option<String> {
    if stem.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..stem.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(stem.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::ThreadStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn initial(thread: &str) -> Checkpoint {
        Checkpoint::initial(
            thread,
            json!({"query": "X"}).as_object().cloned().unwrap(),
            "reporter",
        )
    }

    #[test]
    fn test_thread_id_encoding() {
        for id in ["thread-1", "../../etc/passwd", "ünïcode", ""] {
            let encoded = encode_thread_id(id);
            assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(decode_thread_id(&encoded).as_deref(), Some(id));
        }
        assert_eq!(decode_thread_id("abc"), None);
        assert_eq!(decode_thread_id("zz"), None);
    }

    #[tokio::test]
    async fn test_put_and_get_across_instances() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let first = initial("thread-1");
        saver.put(first.clone()).await.unwrap();

        let mut second = first.successor();
        second.status = ThreadStatus::Paused;
        second.next = Some("human".into());
        saver.put(second.clone()).await.unwrap();

        let reopened = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let loaded = reopened.get("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(reopened.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_conflict_between_instances() {
        let dir = TempDir::new().unwrap();
        let a = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let b = FileCheckpointSaver::open(dir.path()).await.unwrap();

        let first = initial("thread-1");
        a.put(first.clone()).await.unwrap();
        a.put(first.successor()).await.unwrap();

        let err = b.put(first.successor()).await.unwrap_err();
        assert!(matches!(err, CheckpointError::VersionConflict { found: 2, .. }));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        saver.put(initial("thread-1")).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let stem = encode_thread_id("thread-1");
        assert_eq!(names, vec![format!("{stem}.json"), format!("{stem}.lock")]);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_across_instances() {
        let dir = TempDir::new().unwrap();
        let a = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let b = FileCheckpointSaver::open(dir.path()).await.unwrap();

        let lease = a.try_lease("thread-1").unwrap();
        let err = b.try_lease("thread-1").unwrap_err();
        assert!(matches!(err, CheckpointError::ThreadBusy(ref id) if id == "thread-1"));
        assert!(a.try_lease("thread-1").is_err());
        assert!(b.try_lease("thread-2").is_ok());

        drop(lease);
        assert!(b.try_lease("thread-1").is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_writers_on_one_directory() {
        let dir = TempDir::new().unwrap();
        let a = FileCheckpointSaver::open(dir.path()).await.unwrap();
        let b = FileCheckpointSaver::open(dir.path()).await.unwrap();

        for round in 0..50 {
            let thread = format!("thread-{round}");
            let first = initial(&thread);
            a.put(first.clone()).await.unwrap();

            let (left, right) = tokio::join!(
                tokio::spawn({
                    let a = a.clone();
                    let next = first.successor();
                    async move { a.put(next).await }
                }),
                tokio::spawn({
                    let b = b.clone();
                    let next = first.successor();
                    async move { b.put(next).await }
                }),
            );
            let results = [left.unwrap(), right.unwrap()];

            let accepted = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(accepted, 1, "round {round}: exactly one writer may win");
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(CheckpointError::VersionConflict { found: 2, .. }))));
            assert_eq!(a.get(&thread).await.unwrap().unwrap().version, 2);
        }
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        saver.put(initial("b")).await.unwrap();
        saver.put(initial("a")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(saver.list_threads().await.unwrap(), vec!["a", "b"]);
        saver.delete_thread("a").await.unwrap();
        saver.delete_thread("a").await.unwrap();
        assert_eq!(saver.list_threads().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_ttl_expiry_and_purge() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path())
            .await
            .unwrap()
            .with_ttl(Duration::from_secs(60));

        let mut old = initial("old");
        old.ts = chrono::Utc::now() - chrono::Duration::seconds(300);
        saver.put(old).await.unwrap();
        saver.put(initial("fresh")).await.unwrap();

        assert!(saver.get("old").await.unwrap().is_none());
        assert_eq!(saver.list_threads().await.unwrap(), vec!["fresh"]);
        assert_eq!(saver.purge_expired().await.unwrap(), 1);
        assert!(!saver.path_for("old").exists());
    }

    #[tokio::test]
    async fn test_mismatched_thread_in_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        saver.put(initial("a")).await.unwrap();
        std::fs::rename(saver.path_for("a"), saver.path_for("b")).unwrap();

        let err = saver.get("b").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
    }
}
