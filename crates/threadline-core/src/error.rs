//! Error types shared across the Threadline crates.

use thiserror::Error;

/// Result type alias for Threadline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Domain-level error type.
///
/// Note on not-found vs. not-visible: callers at the API boundary collapse
/// both into absence. These variants exist for internal diagnostics and must
/// never be serialized verbatim to an untrusted caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Org not found: {0}")]
    OrgNotFound(i64),

    #[error("Thread not found: {0}")]
    ThreadNotFound(i64),

    #[error("Message not found: {0}")]
    MessageNotFound(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Viewer has no user identity")]
    MissingViewerIdentity,

    #[error("Viewer has no org scope")]
    MissingOrgScope,

    #[error("Viewer has no platform application")]
    MissingApplicationScope,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a caller precondition violation (programming
    /// error in the surrounding request layer, not bad user input).
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingViewerIdentity
                | Self::MissingOrgScope
                | Self::MissingApplicationScope
                | Self::MissingField(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_classification() {
        assert!(Error::MissingViewerIdentity.is_precondition());
        assert!(Error::MissingOrgScope.is_precondition());
        assert!(!Error::ThreadNotFound(1).is_precondition());
        assert!(!Error::PermissionDenied("nope".into()).is_precondition());
    }

    #[test]
    fn display_messages_are_descriptive() {
        let e = Error::InvalidArgument("limit must be at least 1".into());
        assert!(e.to_string().contains("limit must be at least 1"));
        assert_eq!(
            Error::MissingOrgScope.to_string(),
            "Viewer has no org scope"
        );
    }
}
