use std::fmt;

use crate::status_code::{self, status_code_t, MetaCode, StatusCode, TransactionCode};

/// Coarse classification of a [`Status`], used by callers to decide whether
/// to retry, surface the error to an end user, or treat it as a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An operation other than mkfs ran against an unformatted filesystem.
    NotFormatted,
    /// Duplicate volume name or directory.
    AlreadyExists,
    /// Unknown volume, missing parent directory or unknown backend name.
    NotFound,
    /// The substrate round trip was interrupted and the outcome is unknown.
    Indeterminate,
    /// The substrate is unreachable, lost quorum or kept conflicting.
    SubstrateUnavailable,
    /// Malformed input rejected before touching the substrate.
    InvalidArgument,
    Other,
}

/// A status value carrying a code and optional message.
///
/// The `#[must_use]` attribute ensures callers do not silently ignore error
/// statuses.
#[derive(Debug, Clone)]
#[must_use]
pub struct Status {
    code: status_code_t,
    message: Option<String>,
}

impl Status {
    /// Create a status with just a code.
    pub fn new(code: status_code_t) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Create a status with a code and a descriptive message.
    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(msg.into()),
        }
    }

    /// Return the numeric status code.
    pub fn code(&self) -> status_code_t {
        self.code
    }

    /// Return the optional message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether this status represents success (code == OK).
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// Classify the code into an [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self.code {
            MetaCode::NOT_FORMATTED => ErrorKind::NotFormatted,
            MetaCode::EXISTS => ErrorKind::AlreadyExists,
            MetaCode::NOT_FOUND | MetaCode::BACKEND_NOT_FOUND => ErrorKind::NotFound,
            TransactionCode::MAYBE_COMMITTED => ErrorKind::Indeterminate,
            TransactionCode::NETWORK_ERROR
            | TransactionCode::FAILED
            | TransactionCode::CONFLICT
            | TransactionCode::TOO_OLD
            | MetaCode::OPERATION_TIMEOUT => ErrorKind::SubstrateUnavailable,
            StatusCode::INVALID_ARG | MetaCode::NAME_TOO_LONG | MetaCode::IS_DIRECTORY => {
                ErrorKind::InvalidArgument
            }
            _ => ErrorKind::Other,
        }
    }

    /// Whether the caller may safely retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::SubstrateUnavailable
    }

    /// Produce a human-readable description like `"Meta::NotFound(3000) volume missing"`.
    pub fn describe(&self) -> String {
        let name = status_code::to_string(self.code);
        match &self.message {
            Some(msg) => format!("{}({}) {}", name, self.code, msg),
            None => format!("{}({})", name, self.code),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ok() {
        let s = Status::new(StatusCode::OK);
        assert!(s.is_ok());
        assert_eq!(s.code(), 0);
        assert!(s.message().is_none());
        assert_eq!(s.describe(), "OK(0)");
    }

    #[test]
    fn test_status_with_message() {
        let s = Status::with_message(MetaCode::NOT_FOUND, "volume not found");
        assert!(!s.is_ok());
        assert_eq!(s.code(), 3000);
        assert_eq!(s.message(), Some("volume not found"));
        assert_eq!(s.describe(), "Meta::NotFound(3000) volume not found");
    }

    #[test]
    fn test_status_display() {
        let s = Status::new(TransactionCode::MAYBE_COMMITTED);
        assert_eq!(format!("{}", s), "Transaction::MaybeCommitted(1006)");
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(Status::new(MetaCode::NOT_FORMATTED).kind(), ErrorKind::NotFormatted);
        assert_eq!(Status::new(MetaCode::EXISTS).kind(), ErrorKind::AlreadyExists);
        assert_eq!(Status::new(MetaCode::NOT_FOUND).kind(), ErrorKind::NotFound);
        assert_eq!(Status::new(MetaCode::BACKEND_NOT_FOUND).kind(), ErrorKind::NotFound);
        assert_eq!(
            Status::new(TransactionCode::MAYBE_COMMITTED).kind(),
            ErrorKind::Indeterminate
        );
        assert_eq!(
            Status::new(TransactionCode::NETWORK_ERROR).kind(),
            ErrorKind::SubstrateUnavailable
        );
        assert_eq!(Status::new(StatusCode::INVALID_ARG).kind(), ErrorKind::InvalidArgument);
        assert_eq!(Status::new(StatusCode::DATA_CORRUPTION).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_indeterminate_is_not_retryable() {
        assert!(Status::new(TransactionCode::NETWORK_ERROR).is_retryable());
        assert!(Status::new(MetaCode::OPERATION_TIMEOUT).is_retryable());
        assert!(!Status::new(TransactionCode::MAYBE_COMMITTED).is_retryable());
        assert!(!Status::new(MetaCode::EXISTS).is_retryable());
    }

    #[test]
    fn test_status_from_code() {
        let s: Status = StatusCode::INVALID_ARG.into();
        assert_eq!(s.code(), 3);
        let e: &dyn std::error::Error = &s;
        assert!(e.to_string().contains("InvalidArg"));
    }
}
