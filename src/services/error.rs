use thiserror::Error;

use crate::response::AppError;

/// Failure taxonomy for engine operations. Storage errors keep their source
/// for logging but are never exposed verbatim to clients.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user {0} not found")]
    NotFound(i64),
    #[error("storage operation timed out")]
    Timeout,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(id) => AppError::not_found(format!("user {id} not found")),
            EngineError::Timeout => AppError::timeout("storage operation timed out"),
            EngineError::Invalid(message) => AppError::bad_request(message),
            EngineError::Db(source) => {
                tracing::error!(error = %source, "storage error");
                AppError::internal(source.to_string())
            }
        }
    }
}
