use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Malformed event {path}: {reason}")]
    MalformedEvent { path: String, reason: String },

    #[error("Batch of {size} writes exceeds the atomic limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Cron parsing error: {0}")]
    Cron(#[from] cron::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Whether a failed invocation is worth retrying as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient: a later trigger, sweep or transaction attempt may succeed.
    Retryable,
    /// Retrying without a code or data change will fail the same way.
    Terminal,
}

impl StrataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StrataError::Conflict(_) | StrataError::Unavailable(_) | StrataError::Io(_) => {
                ErrorKind::Retryable
            }
            _ => ErrorKind::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StrataError::MalformedEvent {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_retryable() {
        assert!(StrataError::Conflict("doc changed".into()).is_retryable());
        assert!(StrataError::Unavailable("busy".into()).is_retryable());
    }

    #[test]
    fn test_application_errors_are_terminal() {
        assert_eq!(
            StrataError::Projection("boom".into()).kind(),
            ErrorKind::Terminal
        );
        assert_eq!(
            StrataError::malformed("a/b", "missing field").kind(),
            ErrorKind::Terminal
        );
    }
}
