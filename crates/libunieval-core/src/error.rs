use std::time::Duration;

use thiserror::Error;

use crate::types::ErrorKind;

/// Run-level error type for unieval operations
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("backend '{backend}' does not support the {pattern} pattern")]
    UnsupportedPattern { backend: String, pattern: String },

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// Get the error code for JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            EvalError::Config(_) => "configuration_error",
            EvalError::UnsupportedPattern { .. } => "configuration_error",
            EvalError::Transfer(e) => e.kind().as_code(),
            EvalError::Internal(_) => "internal_error",
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            EvalError::Config(_) => 2,
            EvalError::UnsupportedPattern { .. } => 2,
            EvalError::Transfer(_) => 3,
            EvalError::Internal(_) => 1,
        }
    }
}

/// Failure of a single in-flight transfer
///
/// Every variant maps onto exactly one [`ErrorKind`], which is what ends up
/// on the sealed outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote error [{status}]: {message}")]
    Remote { status: String, message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::ConnectionRefused(_) => ErrorKind::ConnectionRefused,
            TransferError::Timeout(_) => ErrorKind::Timeout,
            TransferError::Protocol(_) => ErrorKind::ProtocolError,
            TransferError::Remote { .. } => ErrorKind::RemoteError,
            TransferError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Create a Remote error, truncating the message to keep logs readable
    pub fn remote(status: impl Into<String>, message: impl AsRef<str>) -> Self {
        const MAX_MESSAGE: usize = 200;
        let message = message.as_ref();
        let message = if message.len() > MAX_MESSAGE {
            let mut end = MAX_MESSAGE;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &message[..end])
        } else {
            message.to_string()
        };
        TransferError::Remote {
            status: status.into(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            TransferError::ConnectionRefused("x".into()).kind(),
            ErrorKind::ConnectionRefused
        );
        assert_eq!(
            TransferError::Timeout(Duration::from_secs(5)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(TransferError::Protocol("x".into()).kind(), ErrorKind::ProtocolError);
        assert_eq!(TransferError::remote("500", "boom").kind(), ErrorKind::RemoteError);
        assert_eq!(TransferError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_remote_message_truncated() {
        let body = "é".repeat(300);
        match TransferError::remote("502", &body) {
            TransferError::Remote { status, message } => {
                assert_eq!(status, "502");
                assert!(message.ends_with("..."));
                assert!(message.len() <= 203);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_display() {
        let e = TransferError::Timeout(Duration::from_millis(5000));
        assert_eq!(e.to_string(), "request timed out after 5000ms");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EvalError::Config("x".into()).exit_code(), 2);
        assert_eq!(EvalError::Config("x".into()).error_code(), "configuration_error");
        let e = EvalError::from(TransferError::Cancelled);
        assert_eq!(e.exit_code(), 3);
        assert_eq!(e.error_code(), "CANCELLED");
    }
}
