//! Backing stores the working tree is synchronized with.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::StoreError;

/// One entry of a stored subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoredEntry {
    Directory,
    File {
        #[serde(with = "crate::encoding::base64_bytes")]
        bytes: Vec<u8>,
    },
    Symlink {
        target: String,
    },
}

/// Contents of a subtree keyed by relative path. Parents sort before
/// their children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub entries: BTreeMap<String, StoredEntry>,
}

impl StoreSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Storage a mounted subtree is pulled from and pushed to.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    async fn load(&self) -> Result<StoreSnapshot, StoreError>;

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError>;
}

/// Store kept in memory. Used when no state directory is available.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot.lock().clone()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        *self.snapshot.lock() = snapshot.clone();
        Ok(())
    }
}

/// Persistent store: one JSON snapshot file in the state directory.
///
/// Writes go to a temporary file that replaces the snapshot while an
/// exclusive lock on `home.lock` is held.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    const SNAPSHOT_FILE: &'static str = "home.json";
    const LOCK_FILE: &'static str = "home.lock";

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(Self::SNAPSHOT_FILE)
    }

    fn write_locked(dir: &Path, encoded: &[u8]) -> Result<(), StoreError> {
        let lock_path = dir.join(Self::LOCK_FILE);
        let lock = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        lock.lock_exclusive().map_err(|e| StoreError::Lock {
            path: lock_path.clone(),
            source: e,
        })?;
        let _unlock = scopeguard::guard(&lock, |lock| {
            let _ = FileExt::unlock(lock);
        });

        let target = dir.join(Self::SNAPSHOT_FILE);
        let staging = dir.join(format!("{}.tmp", Self::SNAPSHOT_FILE));
        std::fs::write(&staging, encoded).map_err(|e| StoreError::io(&staging, e))?;
        std::fs::rename(&staging, &target).map_err(|e| StoreError::io(&target, e))?;
        Ok(())
    }
}

#[async_trait]
impl BackingStore for SnapshotStore {
    fn describe(&self) -> String {
        self.snapshot_path().display().to_string()
    }

    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        let path = self.snapshot_path();
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot yet");
                return Ok(StoreSnapshot::default());
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_slice(&content).map_err(|e| StoreError::Decode { path, source: e })
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(snapshot).map_err(StoreError::Encode)?;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || Self::write_locked(&dir, &encoded))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// A real host directory mirrored into the working tree.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn walk(&self) -> Result<StoreSnapshot, StoreError> {
        let mut snapshot = StoreSnapshot::default();
        let mut pending = vec![(self.root.clone(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::io(&dir, e))?
            {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    debug!(path = %entry.path().display(), "skipping non-UTF-8 name");
                    continue;
                };
                let relative = if prefix.is_empty() {
                    name
                } else {
                    format!("{}/{}", prefix, name)
                };
                let host_path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StoreError::io(&host_path, e))?;
                let stored = if file_type.is_symlink() {
                    let target = tokio::fs::read_link(&host_path)
                        .await
                        .map_err(|e| StoreError::io(&host_path, e))?;
                    StoredEntry::Symlink {
                        target: target.to_string_lossy().into_owned(),
                    }
                } else if file_type.is_dir() {
                    pending.push((host_path, relative.clone()));
                    StoredEntry::Directory
                } else {
                    let bytes = tokio::fs::read(&host_path)
                        .await
                        .map_err(|e| StoreError::io(&host_path, e))?;
                    StoredEntry::File { bytes }
                };
                snapshot.entries.insert(relative, stored);
            }
        }
        Ok(snapshot)
    }

    async fn remove_host_entry(&self, relative: &str) -> Result<(), StoreError> {
        let host_path = self.root.join(relative);
        let metadata = match tokio::fs::symlink_metadata(&host_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io(&host_path, e)),
        };
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&host_path).await
        } else {
            tokio::fs::remove_file(&host_path).await
        };
        result.map_err(|e| StoreError::io(&host_path, e))
    }
}

#[async_trait]
impl BackingStore for DirectoryStore {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        self.walk().await
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let current = self.walk().await?;

        // Deepest first, so directories go after their contents.
        for (relative, existing) in current.entries.iter().rev() {
            let keep = match (snapshot.entries.get(relative), existing) {
                (Some(StoredEntry::Directory), StoredEntry::Directory) => true,
                (Some(StoredEntry::File { .. }), StoredEntry::File { .. }) => true,
                (Some(StoredEntry::Symlink { target: a }), StoredEntry::Symlink { target: b }) => {
                    a == b
                }
                _ => false,
            };
            if !keep {
                self.remove_host_entry(relative).await?;
            }
        }

        for (relative, entry) in &snapshot.entries {
            let host_path = self.root.join(relative);
            match entry {
                StoredEntry::Directory => {
                    tokio::fs::create_dir_all(&host_path)
                        .await
                        .map_err(|e| StoreError::io(&host_path, e))?;
                }
                StoredEntry::File { bytes } => {
                    let unchanged = matches!(
                        current.entries.get(relative),
                        Some(StoredEntry::File { bytes: old }) if old == bytes
                    );
                    if !unchanged {
                        tokio::fs::write(&host_path, bytes)
                            .await
                            .map_err(|e| StoreError::io(&host_path, e))?;
                    }
                }
                StoredEntry::Symlink { target } => {
                    if current.entries.get(relative) != Some(entry) {
                        create_symlink(target, &host_path).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn create_symlink(target: &str, link: &Path) -> Result<(), StoreError> {
    tokio::fs::symlink(target, link)
        .await
        .map_err(|e| StoreError::io(link, e))
}

#[cfg(not(unix))]
async fn create_symlink(target: &str, link: &Path) -> Result<(), StoreError> {
    tracing::warn!(target, link = %link.display(), "symlinks are not supported on this host");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoreSnapshot {
        let mut snapshot = StoreSnapshot::default();
        snapshot
            .entries
            .insert("src".into(), StoredEntry::Directory);
        snapshot.entries.insert(
            "src/top.v".into(),
            StoredEntry::File {
                bytes: b"module top; endmodule\n".to_vec(),
            },
        );
        snapshot
    }

    #[tokio::test]
    async fn snapshot_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(store.load().await.unwrap().is_empty());

        store.save(&sample()).await.unwrap();

        let reopened = SnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load().await.unwrap(), sample());
        assert!(dir.path().join("home.lock").exists());
    }

    #[tokio::test]
    async fn snapshot_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("home.json"), b"not json").unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load().await,
            Err(StoreError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn directory_store_mirrors_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stale.txt"), b"old").unwrap();
        let store = DirectoryStore::new(dir.path());

        store.save(&sample()).await.unwrap();

        assert!(!dir.path().join("stale.txt").exists());
        assert_eq!(
            std::fs::read(dir.path().join("src/top.v")).unwrap(),
            b"module top; endmodule\n"
        );
        assert_eq!(store.load().await.unwrap(), sample());
    }
}
