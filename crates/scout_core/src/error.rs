use std::fmt;

use thiserror::Error;

/// How a failed fetch is treated by the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeout, rate limiting, temporary unavailability. Retried with backoff.
    Transient,
    /// The page came back but could not be used. Permanent for that task.
    Malformed,
    /// Authentication rejected or the source changed shape. Aborts the run.
    Fatal,
    /// The fetch was interrupted by an immediate abort.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Malformed => write!(f, "malformed"),
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} fetch failure: {message}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "fetch cancelled")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("per-attempt timeout must be greater than zero")]
    ZeroTimeout,
    #[error("page_limit must be at least 1 (query {keyword:?})")]
    ZeroPageLimit { keyword: String },
}
