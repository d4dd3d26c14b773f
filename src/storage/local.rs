use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::storage::{FileStorage, StorageError};

const TEMP_PREFIX: &str = ".upload-";

/// Files stored flat under a single directory.
pub struct LocalStorage {
    root: PathBuf,
    temp_seq: AtomicU64,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn temp_path(&self) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!("{}{}-{}", TEMP_PREFIX, std::process::id(), seq))
    }
}

/// Names must stay inside the storage directory.
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with(TEMP_PREFIX);
    if bad {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

async fn is_regular_file(path: &Path) -> Result<bool, StorageError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn write_temp(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

async fn remove_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove temp file {:?}: {}", path, e);
        }
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn create(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.file_path(name)?;
        if fs::symlink_metadata(&path).await.is_ok() {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }

        fs::create_dir_all(&self.root).await?;

        // Write aside, then link into place so readers never see a partial file
        let temp = self.temp_path();
        if let Err(e) = write_temp(&temp, data).await {
            remove_temp(&temp).await;
            return Err(e.into());
        }

        let placed = match fs::hard_link(&temp, &path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(name.to_string()))
            }
            Err(e) => {
                debug!("hard link unavailable ({}), falling back to rename", e);
                if fs::symlink_metadata(&path).await.is_ok() {
                    Err(StorageError::AlreadyExists(name.to_string()))
                } else {
                    fs::rename(&temp, &path).await.map_err(StorageError::from)
                }
            }
        };

        remove_temp(&temp).await;
        placed?;
        debug!("stored {} ({} bytes)", name, data.len());
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.file_path(name)?;
        if !is_regular_file(&path).await? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.file_path(name)?;
        if !is_regular_file(&path).await? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.file_path(name)?;
        is_regular_file(&path).await
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            if entry.file_type().await?.is_file() {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}
