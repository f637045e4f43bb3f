use engine::{ReportError, StoreError, SyncError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
    #[error("auth error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Input(String),
    /// A refused add/edit/delete, already worded for the user.
    #[error("{0}")]
    Mutation(String),
}
