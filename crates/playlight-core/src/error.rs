//! Error types shared by the core and the browser bindings.
//!
//! Nothing in the SDK is allowed to throw into the host page, so these errors
//! mostly travel up to a phase boundary where they are logged and dropped.

use thiserror::Error;

/// Failure while reading or mutating the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The document has no `<body>` (yet).
    #[error("document has no body")]
    MissingBody,
    /// A node handle no longer refers to a live node.
    #[error("node is detached or unknown")]
    Detached,
    /// The node is not a child of the expected parent.
    #[error("node is not a child of the given parent")]
    NotAChild,
    /// The platform rejected the operation.
    #[error("dom operation failed: {0}")]
    Platform(String),
}

/// Failure while intercepting or rewriting a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    /// Rules could not be read because the sheet is cross-origin.
    #[error("stylesheet {href} is cross-origin and cannot be read")]
    CrossOrigin {
        /// Location of the blocked sheet.
        href: String,
    },
    /// The sheet has no owner node to take over.
    #[error("stylesheet has no owner node")]
    NoOwner,
    /// Writing the rewritten text failed.
    #[error("stylesheet write failed: {0}")]
    Write(String),
    /// Underlying DOM failure.
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Failure of the network transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),
    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),
    /// Server answered with a non-success status.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server provided message, or the status code as text.
        message: String,
    },
}

/// Invalid configuration input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The merged configuration did not match the schema.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Invalid(err.to_string())
    }
}

/// Top-level SDK error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    /// `init` was called twice.
    #[error("sdk is already initialized")]
    AlreadyInitialized,
    /// An action was called before `init`.
    #[error("sdk is not initialized")]
    NotInitialized,
    /// Event registration used a name outside the fixed set.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    /// Button position outside the fixed set.
    #[error("invalid position '{0}'")]
    InvalidPosition(String),
    /// A registered callback failed.
    #[error("callback failed: {0}")]
    Callback(String),
    /// Dom failure.
    #[error(transparent)]
    Dom(#[from] DomError),
    /// Stylesheet failure.
    #[error(transparent)]
    Style(#[from] StyleError),
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Run one phase of a multi-step operation, logging instead of propagating.
///
/// Returns `true` when the phase succeeded. Setup and teardown call this for
/// every step so one failing step never aborts the rest.
pub fn guard_phase<E: std::fmt::Display>(phase: &str, result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(phase, error = %err, "phase failed, continuing");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(DomError::MissingBody.to_string(), "document has no body");
        assert_eq!(
            StyleError::CrossOrigin {
                href: "https://cdn.example/a.css".to_string()
            }
            .to_string(),
            "stylesheet https://cdn.example/a.css is cross-origin and cannot be read"
        );
        assert_eq!(
            SdkError::UnknownEvent("boom".to_string()).to_string(),
            "unknown event 'boom'"
        );
    }

    #[test]
    fn test_transparent_wrapping() {
        let err: SdkError = StyleError::from(DomError::Detached).into();
        assert_eq!(err.to_string(), "node is detached or unknown");
    }

    #[test]
    fn test_guard_phase() {
        assert!(guard_phase::<DomError>("ok", Ok(())));
        assert!(!guard_phase("fail", Err(DomError::NotAChild)));
    }
}
