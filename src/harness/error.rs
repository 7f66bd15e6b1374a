use thiserror::Error;

use crate::transport::TransportError;

/// Setup step that failed before a workload could start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Listen,
    Accept,
    Dial,
    WrapDialer,
    WrapListener,
}

impl std::fmt::Display for SetupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupStage::Listen => write!(f, "listen"),
            SetupStage::Accept => write!(f, "accept"),
            SetupStage::Dial => write!(f, "dial"),
            SetupStage::WrapDialer => write!(f, "wrap dialer conn"),
            SetupStage::WrapListener => write!(f, "wrap listener conn"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("setup failed at {stage}: {source}")]
    Setup {
        stage: SetupStage,
        #[source]
        source: TransportError,
    },

    #[error("failed to open stream: {0}")]
    OpenStream(#[source] TransportError),

    #[error("write of message {index} failed: {source}")]
    Write {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("read of message {index} failed ({expected_len} bytes expected): {source}")]
    Read {
        index: usize,
        expected_len: usize,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "message {index} not equal: sent {expected_len} bytes ({expected_prefix}..) \
         got {actual_len} bytes ({actual_prefix}..)"
    )]
    Mismatch {
        index: usize,
        expected_len: usize,
        actual_len: usize,
        expected_prefix: String,
        actual_prefix: String,
    },

    #[error("worker task failed: {0}")]
    TaskFailed(String),

    #[error("invalid message size {size} (pool holds {max} bytes)")]
    InvalidMessageSize { size: usize, max: usize },

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl HarnessError {
    pub fn setup(stage: SetupStage, source: impl Into<TransportError>) -> Self {
        HarnessError::Setup {
            stage,
            source: source.into(),
        }
    }

    /// Errors after which no meaningful workload can proceed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Setup { .. }
                | HarnessError::InvalidOptions(_)
                | HarnessError::InvalidMessageSize { .. }
        )
    }
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(err: tokio::task::JoinError) -> Self {
        HarnessError::TaskFailed(err.to_string())
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
