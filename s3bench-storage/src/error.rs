use std::time::Duration;

use thiserror::Error;

/// Errors returned by storage backends and the per-worker handles wrapping them.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operation did not finish within the caller-supplied timeout and was canceled.
    #[error("operation canceled after {0:?}")]
    Timeout(Duration),

    /// The requested object does not exist.
    #[error("no such key: {0}")]
    NotFound(String),

    /// Errors stemming from the storage SDK.
    ///
    /// These can be network errors encountered when sending requests, but can also indicate
    /// errors returned by the service itself.
    #[error("storage sdk error: {context}")]
    Sdk {
        /// What the backend was doing when the error occurred.
        context: String,
        /// The underlying SDK error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors related to payload handling.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend could not be set up with the given configuration.
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Wraps an SDK error with a short description of the failed operation.
    pub fn sdk<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sdk {
            context: context.into(),
            cause: Box::new(cause),
        }
    }

    /// Returns `true` if the operation was canceled by a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
