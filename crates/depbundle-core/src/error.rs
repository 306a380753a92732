//! Error taxonomy for closure computation.
//!
//! Every variant is fatal: a closure either completes with every required
//! library located, or the whole computation fails. Variants carry the
//! declaring binary and the raw declaration where one exists so an operator
//! can add a search path or blacklist entry and retry.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while introspecting binaries or computing a closure.
#[derive(Error, Debug)]
pub enum ClosureError {
    /// The input is a static archive or an unrecognized file format.
    #[error("{} is not a loadable binary: {reason}", path.display())]
    NotALoadableBinary {
        /// File that was rejected.
        path: PathBuf,
        /// What was found instead.
        reason: String,
    },

    /// The introspection tool ran but its output could not be understood.
    #[error("Failed to read dependencies of {}: {reason}", binary.display())]
    ParseFailure {
        /// Binary being introspected.
        binary: PathBuf,
        /// Tool diagnostics or a description of the malformed output.
        reason: String,
    },

    /// A declared dependency exists in no search path.
    #[error("Dependency '{declaration}' of {} not found in any search path", declared_by.display())]
    DependencyNotFound {
        /// Raw declaration text as recorded in the binary.
        declaration: String,
        /// Binary that recorded the declaration.
        declared_by: PathBuf,
    },

    /// A loader-relative reference (`@rpath/...`, `@loader_path/...`, ...).
    #[error("Dependency '{declaration}' of {} is loader-relative and cannot be resolved", declared_by.display())]
    UnsupportedRelativeReference {
        /// Raw declaration text as recorded in the binary.
        declaration: String,
        /// Binary that recorded the declaration.
        declared_by: PathBuf,
    },

    /// The external introspection tool exceeded its time bound.
    #[error("'{tool}' timed out after {}s on {}", timeout.as_secs(), binary.display())]
    IntrospectionTimeout {
        /// Tool that was killed.
        tool: String,
        /// Binary being introspected.
        binary: PathBuf,
        /// Bound that was exceeded.
        timeout: Duration,
    },

    /// The external tool is not installed.
    #[error("'{tool}' not found. {hint}")]
    ToolUnavailable {
        /// Executable name.
        tool: String,
        /// How to install it.
        hint: &'static str,
    },

    /// Invalid or unreadable configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Filesystem or process I/O failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ClosureError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ClosureError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_declaration_and_binary() {
        let err = ClosureError::DependencyNotFound {
            declaration: "libfoo.so".into(),
            declared_by: PathBuf::from("/opt/app/bin/app"),
        };
        let msg = err.to_string();
        assert!(msg.contains("libfoo.so"));
        assert!(msg.contains("/opt/app/bin/app"));
    }

    #[test]
    fn test_timeout_message_includes_bound() {
        let err = ClosureError::IntrospectionTimeout {
            tool: "otool".into(),
            binary: PathBuf::from("/tmp/x"),
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30s"));
    }
}
