//! Error types and result aliases for pod operations.
//!
//! Provides a unified error type that covers all failure surfaces across
//! the pod crates, with enough structure that callers can tell user
//! errors from environment failures from bugs.

use std::sync::Arc;

use thiserror::Error;

/// Unified error type for all pod operations
#[derive(Error, Debug)]
pub enum PodError {
    // Document errors
    #[error("{message}")]
    Parse { message: String },

    #[error("lockfile is corrupt: {message}")]
    LockFileCorrupt { message: String },

    // Resolution errors
    #[error("no version of {package} matches {constraint}")]
    NoVersionAvailable {
        package: String,
        constraint: String,
        /// Human-readable chain of the requirements that closed the
        /// candidate set, one "X depends on Y" line per depender.
        chain: Vec<String>,
    },

    #[error("incompatible dependencies on {package}: {existing_depender} uses {existing}, {conflicting_depender} uses {conflicting}")]
    SourceMismatch {
        package: String,
        existing: String,
        existing_depender: String,
        conflicting: String,
        conflicting_depender: String,
    },

    #[error("{package} {version} requires SDK {constraint}, but the active SDK is {active}")]
    SdkMismatch {
        package: String,
        version: String,
        constraint: String,
        active: String,
    },

    // Source errors
    #[error("could not find package {name} at {location}")]
    PackageNotFound { name: String, location: String },

    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("git error: {message}")]
    Git { message: String },

    // Misuse and bugs
    #[error("{message}")]
    InvalidArgument { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    // IO errors
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// A failure observed by a waiter of a shared operation. The
    /// original error is behind the Arc; every waiter sees the same one.
    #[error(transparent)]
    Shared(#[from] Arc<PodError>),
}

/// Result type alias for pod operations
pub type PodResult<T> = Result<T, PodError>;

impl PodError {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create an internal (bug) error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the version solver may recover from this error by
    /// backtracking. Everything else aborts the current acquire.
    pub fn is_solver_recoverable(&self) -> bool {
        match self {
            PodError::NoVersionAvailable { .. }
            | PodError::SourceMismatch { .. }
            | PodError::SdkMismatch { .. } => true,
            PodError::Shared(inner) => inner.is_solver_recoverable(),
            _ => false,
        }
    }

    /// Get a user-facing suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            PodError::NoVersionAvailable { .. } => {
                Some("Try widening the version constraints in pubspec.toml")
            }
            PodError::PackageNotFound { .. } => {
                Some("Check the package name spelling and the source description")
            }
            PodError::Network { .. } | PodError::Timeout { .. } => {
                Some("Check your internet connection and try again")
            }
            PodError::Git { .. } => Some("Make sure git is installed and the URL is reachable"),
            PodError::LockFileCorrupt { .. } => {
                Some("Delete pubspec.lock and run `pod get` to regenerate it")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_the_solver_set() {
        let no_version = PodError::NoVersionAvailable {
            package: "foo".to_string(),
            constraint: "^1.0.0".to_string(),
            chain: vec![],
        };
        assert!(no_version.is_solver_recoverable());

        let mismatch = PodError::SdkMismatch {
            package: "foo".to_string(),
            version: "1.0.0".to_string(),
            constraint: ">=2.0.0".to_string(),
            active: "1.0.0".to_string(),
        };
        assert!(mismatch.is_solver_recoverable());

        let network = PodError::Network {
            url: "https://index.pod.dev".to_string(),
            status: Some(500),
            message: "server error".to_string(),
        };
        assert!(!network.is_solver_recoverable());

        let io = PodError::io(
            "read failed",
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        assert!(!io.is_solver_recoverable());
    }

    #[test]
    fn shared_errors_delegate_recoverability() {
        let inner = Arc::new(PodError::NoVersionAvailable {
            package: "foo".to_string(),
            constraint: "any".to_string(),
            chain: vec![],
        });
        assert!(PodError::Shared(inner).is_solver_recoverable());
    }
}
