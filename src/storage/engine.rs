use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unusable file name: {0:?}")]
    InvalidName(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named-file storage. Existence of the file is the source of truth;
/// identifiers live elsewhere.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Never overwrites an existing file.
    async fn create(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, name: &str) -> Result<(), StorageError>;

    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    async fn list(&self) -> Result<Vec<String>, StorageError>;
}
