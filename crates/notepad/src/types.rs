use crate::source::SourceError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the server from starting
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Service error: {0}")]
    Service(#[from] notepad_runtime::service::ServiceError),
}
