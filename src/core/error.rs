use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("manifest corrupt: {0}")]
    ManifestCorrupt(String),

    #[error("journal corrupt: {0}")]
    JournalCorrupt(String),

    #[error("writer lock timeout after {0:?}")]
    LockTimeout(std::time::Duration),

    #[error("storage full: {0}")]
    StorageFull(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Io(format!("poisoned lock: {err}"))
    }
}
