//! Signature policy
//!
//! One pure function decides how a verification outcome becomes an
//! [`Author`]: valid signatures yield the claimed email (or anonymous),
//! unsigned payloads with no claimed author and no keys to check against
//! are anonymous by design, and everything else is a verification error
//! carrying a human-readable message.

use velum_core::effects::pgp::VerificationOutcome;
use velum_core::{Author, VerificationError, VerificationStatus};

/// Build the author result for one verified payload.
///
/// `keys_available` says whether any verification key could be gathered;
/// with none available a missing signature is expected, not suspicious.
pub fn build_author(
    outcome: &VerificationOutcome,
    claimed_author: Option<&str>,
    keys_available: bool,
) -> Author {
    match outcome.status {
        VerificationStatus::SignedAndValid => Ok(claimed_author.map(str::to_owned)),
        VerificationStatus::NotSigned if claimed_author.is_none() && !keys_available => Ok(None),
        status => Err(VerificationError::new(
            claimed_author.map(str::to_owned),
            describe_failure(status, &outcome.errors),
        )),
    }
}

fn describe_failure(status: VerificationStatus, errors: &[String]) -> String {
    let base = match status {
        VerificationStatus::SignedAndInvalid => "signature did not match any available key",
        VerificationStatus::NotSigned => "signature is missing",
        VerificationStatus::SignedAndValid => "signature is valid",
    };
    if errors.is_empty() {
        base.to_owned()
    } else {
        format!("{base}: {}", errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: VerificationStatus) -> VerificationOutcome {
        VerificationOutcome {
            status,
            errors: Vec::new(),
        }
    }

    #[test]
    fn valid_signature_yields_claimed_author() {
        let author = build_author(
            &outcome(VerificationStatus::SignedAndValid),
            Some("alice@example.com"),
            true,
        );
        assert_eq!(author, Ok(Some("alice@example.com".to_owned())));
    }

    #[test]
    fn valid_signature_without_claim_is_anonymous() {
        let author = build_author(&outcome(VerificationStatus::SignedAndValid), None, true);
        assert_eq!(author, Ok(None));
    }

    #[test]
    fn unsigned_without_claim_or_keys_is_anonymous() {
        let author = build_author(&outcome(VerificationStatus::NotSigned), None, false);
        assert_eq!(author, Ok(None));
    }

    #[test]
    fn unsigned_with_claim_is_an_error() {
        let author = build_author(
            &outcome(VerificationStatus::NotSigned),
            Some("bob@example.com"),
            true,
        );
        let err = author.unwrap_err();
        assert_eq!(err.claimed_author.as_deref(), Some("bob@example.com"));
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn invalid_signature_carries_provider_errors() {
        let author = build_author(
            &VerificationOutcome {
                status: VerificationStatus::SignedAndInvalid,
                errors: vec!["key expired".to_owned()],
            },
            Some("bob@example.com"),
            true,
        );
        let err = author.unwrap_err();
        assert!(err.message.contains("did not match"));
        assert!(err.message.contains("key expired"));
    }
}
