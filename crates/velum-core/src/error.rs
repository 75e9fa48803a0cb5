//! Unified error type for Velum operations
//!
//! A single error enum covers the whole metadata pipeline. Signature
//! verification failures are deliberately absent: they are carried inside
//! [`crate::crypto::verification::Author`] results on decrypted records and
//! never surface as a thrown error.

use serde::{Deserialize, Serialize};

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all Velum operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    /// Input rejected before any side effect (bad name, wrong UID arity,
    /// non-folder move target, past expiration date).
    #[error("Validation failed: {message}")]
    Validation {
        /// What was rejected and why
        message: String,
    },

    /// Cooperative cancellation via an abort handle.
    #[error("Aborted: {message}")]
    Aborted {
        /// The operation that observed the abort
        message: String,
    },

    /// Cryptographic failure at key, name, hash-key, content-key or
    /// attributes decryption; carries the underlying cause.
    #[error("Decryption failed: {message}")]
    Decryption {
        /// Underlying cause
        message: String,
    },

    /// Entity absent from cache or backend.
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing
        message: String,
    },

    /// Network-layer failure, propagated from the transport.
    #[error("Transport error: {message}")]
    Transport {
        /// Underlying transport failure
        message: String,
    },

    /// Backend refused the request with a non-success code.
    #[error("API error {code}: {message}")]
    Api {
        /// Backend response code
        code: i64,
        /// Backend error string
        message: String,
    },

    /// Invariant violation that should never occur in practice.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an abort error
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }

    /// Create a decryption error
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an API error from a backend response code
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether this error came from cooperative cancellation.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_map_to_variants() {
        assert!(matches!(
            Error::validation("x"),
            Error::Validation { .. }
        ));
        assert!(Error::transport("timeout").is_retryable());
        assert!(!Error::api(2000, "nope").is_retryable());
        assert!(Error::aborted("listing").is_abort());
    }

    #[test]
    fn errors_round_trip_through_serde() {
        let err = Error::api(2501, "not exists");
        let json = serde_json::to_string(&err).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
