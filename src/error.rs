//! Physics Error Types
//!
//! Unified error type for the engine. Fallible construction (shapes, joints,
//! configuration), lookups by handle, arithmetic domain faults and log
//! persistence all return `Result<T, PhysicsError>` instead of panicking or
//! printing a diagnostic.

use crate::body::BodyHandle;
use thiserror::Error;

/// Unified error type for physics operations.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Checked division by zero.
    #[error("division by zero")]
    DivideByZero,

    /// Operation outside its mathematical domain (e.g. sqrt of a negative).
    #[error("{operation} is undefined for {input}")]
    Domain {
        /// Name of the operation
        operation: &'static str,
        /// Offending input, formatted
        input: String,
    },

    /// Decimal text could not be parsed into a fixed-point value.
    #[error("cannot parse {input:?} as a fixed-point number: {reason}")]
    Parse {
        /// The rejected text
        input: String,
        /// What was wrong with it
        reason: &'static str,
    },

    /// Degenerate or otherwise unusable shape geometry.
    #[error("invalid shape: {reason}")]
    InvalidShape {
        /// Description of the problem
        reason: String,
    },

    /// A body was added without a collision shape. The body is stored but inert.
    #[error("body {handle} has no collision shape and will not be simulated")]
    MissingShape {
        /// Handle of the inert body
        handle: BodyHandle,
    },

    /// Handle does not refer to a live object.
    #[error("stale or unknown {kind} handle")]
    InvalidHandle {
        /// Kind of object the handle refers to
        kind: &'static str,
    },

    /// A joint references bodies that cannot be constrained.
    #[error("invalid constraint: {reason}")]
    InvalidConstraint {
        /// Description of the problem
        reason: &'static str,
    },

    /// Invalid configuration parameter.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the problem
        reason: String,
    },

    /// I/O failure while reading or writing a determinism log.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON (configuration or determinism log).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PhysicsError {
    /// Shorthand for [`PhysicsError::InvalidShape`].
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, PhysicsError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PhysicsError::Domain {
            operation: "sqrt",
            input: "-1".into(),
        };
        let s = e.to_string();
        assert!(s.contains("sqrt"), "Should name the operation: {s}");
        assert!(s.contains("-1"), "Should show the input: {s}");
    }

    #[test]
    fn test_invalid_shape_helper() {
        let e = PhysicsError::shape("radius must be positive");
        assert!(matches!(e, PhysicsError::InvalidShape { .. }));
        assert!(e.to_string().contains("radius"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing log");
        let e: PhysicsError = io.into();
        assert!(matches!(e, PhysicsError::Io(_)));
        assert!(e.to_string().contains("missing log"));
    }

    #[test]
    fn test_missing_shape_mentions_handle() {
        let e = PhysicsError::MissingShape {
            handle: BodyHandle::new(3, 1),
        };
        let s = e.to_string();
        assert!(s.contains('3'), "Should contain slot index: {s}");
    }
}
