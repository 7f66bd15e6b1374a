use thiserror::Error;

/// Errors a transport under test may return to the harness.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Stream open failed: {0}")]
    OpenFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TransportError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        TransportError::Closed("outbound frame queue closed".into())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
