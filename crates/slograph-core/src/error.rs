use thiserror::Error;

#[derive(Error, Debug)]
pub enum SloGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service not found: {0}")]
    NotFound(String),

    #[error("Service has no dependency edges: {0}")]
    NoDependencies(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Snapshot version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

impl SloGraphError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SloGraphError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        SloGraphError::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SloGraphError>;
