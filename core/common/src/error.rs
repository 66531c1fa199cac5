//! Common error types for omnistore.

use std::fmt;
use thiserror::Error;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Adapter configuration is missing a required field or is malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No adapter constructor is registered under the requested type name.
    #[error("Unknown adapter type: {0}")]
    UnknownAdapter(String),

    /// Object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more objects in a batch operation failed.
    #[error("Batch operation failed: {0}")]
    Batch(BatchFailures),

    /// Failure reported by the backend or its transport.
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The default store was used before it was initialized.
    #[error("Default store is not initialized")]
    Uninitialized,

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Whether this error means "the object does not exist".
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this error was caused by cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

/// A single failed item of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Object key the failure belongs to.
    pub object: String,
    /// Backend message for this object.
    pub message: String,
}

/// Per-object failures collected from a batch operation.
///
/// Items that succeeded are not listed and are not rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFailures {
    failures: Vec<BatchFailure>,
}

impl BatchFailures {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `object`.
    pub fn push(&mut self, object: impl Into<String>, message: impl fmt::Display) {
        self.failures.push(BatchFailure {
            object: object.into(),
            message: message.to_string(),
        });
    }

    /// Failed items in the order they were recorded.
    pub fn failures(&self) -> &[BatchFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(())` when nothing failed, otherwise `Error::Batch`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Batch(self))
        }
    }
}

impl fmt::Display for BatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.object, failure.message)?;
        }
        Ok(())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failures_display() {
        let mut failures = BatchFailures::new();
        failures.push("a.txt", "permission denied");
        failures.push("b/c.txt", "timeout");

        assert_eq!(failures.to_string(), "a.txt: permission denied; b/c.txt: timeout");
        assert_eq!(failures.failures()[1].object, "b/c.txt");
    }

    #[test]
    fn test_empty_batch_is_ok() {
        assert!(BatchFailures::new().into_result().is_ok());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(Error::NotFound("x".to_string()).is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::from(io).is_not_found());
        assert!(!Error::Backend("boom".to_string()).is_not_found());
        assert!(Error::DeadlineExceeded.is_cancellation());
    }
}
