use thiserror::Error;

use super::executor::ExecutorError;
use crate::storage::DatabaseError;

/// Errors that can occur in the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Action executor failed: {0}")]
    Executor(#[from] ExecutorError),
}

impl ServiceError {
    pub(crate) fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Lifts storage lookups that came back empty into [`ServiceError::NotFound`].
    pub(crate) fn from_storage(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity, key } => Self::NotFound { entity, key },
            other => Self::Storage(other),
        }
    }

    /// Returns true if a record lookup came back empty.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
