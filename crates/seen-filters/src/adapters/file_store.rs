//! File-backed filter store.
//!
//! The whole set is bincode-encoded into one file. Writes go to
//! `<path>.tmp`, are fsynced, then renamed over `<path>`, so a crash leaves
//! either the old set or the new one. An exclusive `fs2` lock on
//! `<path>.lock` keeps two processes from writing at once.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::domain::{StoredFilterSet, STORE_ENTRY};
use crate::error::StoreError;
use crate::ports::outbound::FilterStore;

#[derive(Clone, Debug)]
pub struct FileFilterStore {
    path: PathBuf,
}

impl FileFilterStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    fn read_blocking(path: &Path) -> Result<Option<StoredFilterSet>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let set: StoredFilterSet =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if set.entry != STORE_ENTRY {
            return Err(StoreError::Serialization(format!(
                "unexpected entry {:?} in {}",
                set.entry,
                path.display()
            )));
        }
        Ok(Some(set))
    }

    fn write_blocking(
        path: &Path,
        tmp_path: &Path,
        lock_path: &Path,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock = Self::acquire_lock(lock_path)?;

        let mut file = File::create(tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(tmp_path, path)?;

        Self::release_lock(&lock, lock_path);
        Ok(())
    }

    /// The set is already on disk, so a failed unlock is only logged. The
    /// lock also goes away when `lock` is closed.
    fn release_lock(lock: &File, lock_path: &Path) {
        if let Err(e) = lock.unlock() {
            warn!(path = %lock_path.display(), error = %e, "Failed to release store lock");
        }
    }

    fn acquire_lock(lock_path: &Path) -> Result<File, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(StoreError::Locked(lock_path.display().to_string()))
            }
            Err(e) => {
                // fs2 maps EWOULDBLOCK to an OS error on some platforms
                if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    Err(StoreError::Locked(lock_path.display().to_string()))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    fn remove_blocking(path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Unavailable(format!("storage task failed: {}", e))
}

#[async_trait]
impl FilterStore for FileFilterStore {
    async fn read(&self) -> Result<Option<StoredFilterSet>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_blocking(&path))
            .await
            .map_err(join_error)?
    }

    async fn write(&self, set: &StoredFilterSet) -> Result<(), StoreError> {
        let bytes =
            bincode::serialize(set).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.path.clone();
        let tmp_path = self.sibling(".tmp");
        let lock_path = self.sibling(".lock");
        let len = bytes.len();

        tokio::task::spawn_blocking(move || {
            Self::write_blocking(&path, &tmp_path, &lock_path, &bytes)
        })
        .await
        .map_err(join_error)??;

        debug!(path = %self.path.display(), bytes = len, "Filter set written");
        Ok(())
    }

    async fn remove(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::remove_blocking(&path))
            .await
            .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FilterMode, StoredFilter};
    use tempfile::TempDir;

    fn sample_set() -> StoredFilterSet {
        StoredFilterSet::new(
            FilterMode::Multiple,
            vec![
                StoredFilter {
                    threshold: 0,
                    size_param: 6,
                    compressed: false,
                    bytes: vec![0b1010_0000, 0, 0, 0, 0, 0, 0, 1],
                    last_downloaded: 10,
                    last_generated: 9,
                    next_generated: 20,
                    filename: "hn-0.blob".to_string(),
                },
                StoredFilter {
                    threshold: 10,
                    size_param: 3,
                    compressed: false,
                    bytes: vec![0xff],
                    last_downloaded: 10,
                    last_generated: 9,
                    next_generated: 20,
                    filename: "hn-10.blob".to_string(),
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FileFilterStore::new(dir.path().join("filters.bin"));

        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FileFilterStore::new(dir.path().join("nested").join("filters.bin"));
        let set = sample_set();

        store.write(&set).await.unwrap();

        assert_eq!(store.read().await.unwrap(), Some(set));
        assert!(!dir.path().join("nested").join("filters.bin.tmp").exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_set() {
        let dir = TempDir::new().unwrap();
        let store = FileFilterStore::new(dir.path().join("filters.bin"));

        store.write(&sample_set()).await.unwrap();
        let smaller = StoredFilterSet::new(FilterMode::Single, vec![sample_set().records[0].clone()]);
        store.write(&smaller).await.unwrap();

        assert_eq!(store.read().await.unwrap(), Some(smaller));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filters.bin");
        fs::write(&path, b"\x01\x02garbage").unwrap();

        let store = FileFilterStore::new(&path);

        assert!(matches!(store.read().await, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileFilterStore::new(dir.path().join("filters.bin"));

        store.write(&sample_set()).await.unwrap();
        store.remove().await.unwrap();
        store.remove().await.unwrap();

        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_releases_lock() {
        let dir = TempDir::new().unwrap();
        let store = FileFilterStore::new(dir.path().join("filters.bin"));

        store.write(&sample_set()).await.unwrap();

        let other = FileFilterStore::acquire_lock(&store.sibling(".lock")).unwrap();
        FileFilterStore::release_lock(&other, &store.sibling(".lock"));
        store.write(&sample_set()).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_fails_while_lock_held_elsewhere() {
        let dir = TempDir::new().unwrap();
        let store = FileFilterStore::new(dir.path().join("filters.bin"));

        let held = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(store.sibling(".lock"))
            .unwrap();
        held.lock_exclusive().unwrap();

        let result = store.write(&sample_set()).await;

        assert!(matches!(result, Err(StoreError::Locked(_))));
        held.unlock().unwrap();
    }
}
