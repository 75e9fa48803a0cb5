//! Signature verification results
//!
//! Verification failures never abort decryption. They are carried as the
//! error side of [`Author`] results on decrypted records so callers can
//! render the degraded state ("couldn't verify this item").

use crate::name::NameValidationError;
use serde::{Deserialize, Serialize};

/// Outcome of verifying the signature(s) on one decrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// At least one signature matched a provided verification key.
    SignedAndValid,
    /// A signature was present but did not match any provided key.
    SignedAndInvalid,
    /// No signature was present.
    NotSigned,
}

/// Who signed a payload.
///
/// `Ok(Some(email))` is a verified author, `Ok(None)` an anonymous payload
/// (uploaded without a signature email, signed with the parent key), and
/// `Err` a verification failure carrying the claimed author.
pub type Author = std::result::Result<Option<String>, VerificationError>;

/// A signature that is missing or invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct VerificationError {
    /// Email the payload claims as its author, if any.
    pub claimed_author: Option<String>,
    /// Human-readable description built from the verification status and
    /// provider error list.
    pub message: String,
}

impl VerificationError {
    /// Build a verification error for a claimed author.
    pub fn new(claimed_author: Option<String>, message: impl Into<String>) -> Self {
        Self {
            claimed_author,
            message: message.into(),
        }
    }
}

/// A node name that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum NameError {
    /// The armored name failed to decrypt.
    #[error("name could not be decrypted: {message}")]
    Undecryptable {
        /// Underlying cause
        message: String,
    },
    /// The name decrypted but failed validation; the original bytes are kept
    /// so callers can still display something.
    #[error("invalid name: {error}")]
    Invalid {
        /// The decrypted, rejected name
        name: String,
        /// Why it was rejected
        error: NameValidationError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_results_round_trip_through_serde() {
        let ok: Author = Ok(Some("alice@example.com".to_owned()));
        let err: Author = Err(VerificationError::new(
            Some("bob@example.com".to_owned()),
            "signature did not match",
        ));
        for author in [ok, err] {
            let json = serde_json::to_string(&author).unwrap();
            let back: Author = serde_json::from_str(&json).unwrap();
            assert_eq!(author, back);
        }
    }

    #[test]
    fn invalid_name_keeps_original_bytes() {
        let err = NameError::Invalid {
            name: "a/b".to_owned(),
            error: NameValidationError::IllegalCharacter,
        };
        match err {
            NameError::Invalid { name, .. } => assert_eq!(name, "a/b"),
            NameError::Undecryptable { .. } => panic!("wrong variant"),
        }
    }
}
