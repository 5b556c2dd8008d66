use persisted::PersistError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading, writing, or watching group files
#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse group file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to watch group file: {0}")]
    Watch(#[from] notify::Error),
    #[error("Key '{key}' not found in group '{group}'")]
    NotFound { group: String, key: String },
}

impl FileStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

impl From<FileStoreError> for PersistError {
    fn from(e: FileStoreError) -> Self {
        PersistError::storage(e)
    }
}
