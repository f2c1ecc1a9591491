use serde::Serialize;

/// Coarse classification shared by every error type in the workspace.
///
/// Callers branch on the kind rather than on crate-specific variants: saga
/// participants swallow `PreconditionFailed`, the event channel redelivers on
/// `Transient`, and the HTTP layer maps each kind to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input. Never retried.
    Validation,
    /// The entity is absent.
    NotFound,
    /// A conditional write's expected prior state did not hold.
    PreconditionFailed,
    /// The store or channel could not be reached in time.
    Transient,
}

impl ErrorKind {
    /// Returns the kind as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::Transient => "TRANSIENT",
        }
    }

    /// Returns true if the same call may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
