use thiserror::Error;

use crate::jobs::{Lane, RequestId};

/// Error taxonomy for dispatch, fan-out and transport failures.
///
/// Dispatcher rejections (`QueueFull`, `DuplicateRequest`) are terminal for
/// that submission; retry is a caller policy choice.
#[derive(Error, Debug)]
pub enum CaskError {
    #[error("invalid locator '{input}': {reason}")]
    InvalidLocator { input: String, reason: String },

    #[error("{lane} lane is at capacity")]
    QueueFull { lane: Lane },

    #[error("request {0} is already in flight or was recently completed")]
    DuplicateRequest(RequestId),

    #[error("execution failed: {0}")]
    ExecutionFailure(String),

    #[error("transport failure talking to {host}:{port}: {reason}")]
    TransportFailure {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("local initialization failed: {0}")]
    LocalInitFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaskError {
    pub fn execution(reason: impl Into<String>) -> Self {
        CaskError::ExecutionFailure(reason.into())
    }

    pub fn transport(host: &str, port: u16, reason: impl ToString) -> Self {
        CaskError::TransportFailure {
            host: host.to_string(),
            port,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaskError>;
