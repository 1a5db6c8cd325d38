use thiserror::Error;

/// Errors from state-store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("CAS conflict: expected version {expected}, found {found}")]
    CasConflict { expected: u64, found: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
