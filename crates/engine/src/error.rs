//! The module contains the errors the sync layer can return.
//!
//! - [`SyncError`] is what callers of [`ExpenseSync`] see.
//! - [`StoreError`] is what a [`RemoteStore`] reports; it is folded into a
//!   [`SyncError`] at the operation boundary.
//! - [`ReportError`] is returned by the CSV export.
//!
//!  [`ExpenseSync`]: super::sync::ExpenseSync
//!  [`RemoteStore`]: super::store::RemoteStore
use thiserror::Error;

/// Errors returned by the synchronization layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("no authenticated user")]
    Unauthenticated,
    #[error("failed to read expenses: {0}")]
    RemoteReadFailed(String),
    #[error("failed to write expense: {0}")]
    RemoteWriteFailed(String),
    #[error("invalid input: {0}")]
    ValidationFailed(String),
}

impl SyncError {
    /// Folds a store error coming from a read.
    pub(crate) fn read(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized => Self::Unauthenticated,
            other => Self::RemoteReadFailed(other.message()),
        }
    }

    /// Folds a store error coming from a write.
    pub(crate) fn write(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized => Self::Unauthenticated,
            other => Self::RemoteWriteFailed(other.message()),
        }
    }
}

/// Errors reported by a remote store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unauthorized")]
    Unauthorized,
    /// Signed in, but the backend refused the row (e.g. a row level policy).
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// The store's own message, without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized => "unauthorized".to_string(),
            Self::NotFound => "not found".to_string(),
            Self::Forbidden(msg)
            | Self::Conflict(msg)
            | Self::Validation(msg)
            | Self::Server(msg)
            | Self::Transport(msg) => msg.clone(),
        }
    }
}

/// Errors of the CSV report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("nothing to export")]
    Empty,
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_store_error_means_unauthenticated() {
        assert_eq!(SyncError::read(StoreError::Unauthorized), SyncError::Unauthenticated);
        assert_eq!(SyncError::write(StoreError::Unauthorized), SyncError::Unauthenticated);
    }

    #[test]
    fn store_message_is_carried_verbatim() {
        assert_eq!(
            SyncError::write(StoreError::Server("row level security".to_string())),
            SyncError::RemoteWriteFailed("row level security".to_string())
        );
        assert_eq!(
            SyncError::write(StoreError::Forbidden("row level security".to_string())),
            SyncError::RemoteWriteFailed("row level security".to_string())
        );
        assert_eq!(
            SyncError::read(StoreError::Transport("timed out".to_string())),
            SyncError::RemoteReadFailed("timed out".to_string())
        );
    }
}
