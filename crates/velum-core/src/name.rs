//! Node name validation
//!
//! Names must not be empty, must not exceed the platform limit, must not be
//! `.` or `..`, and must not contain `/` or `\`. Violations carry the
//! offending name so callers can render the degraded state.

use crate::constants::MAX_NAME_LENGTH;
use serde::{Deserialize, Serialize};

/// Why a node name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum NameValidationError {
    /// Name is empty.
    #[error("name must not be empty")]
    Empty,
    /// Name exceeds [`MAX_NAME_LENGTH`] bytes.
    #[error("name exceeds the platform length limit")]
    TooLong,
    /// Name is `.` or `..`.
    #[error("name must not be a reserved path segment")]
    Reserved,
    /// Name contains a path separator.
    #[error("name must not contain '/' or '\\'")]
    IllegalCharacter,
}

/// Validate a decrypted or user-supplied node name.
pub fn validate_node_name(name: &str) -> Result<(), NameValidationError> {
    if name.is_empty() {
        return Err(NameValidationError::Empty);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(NameValidationError::TooLong);
    }
    if name == "." || name == ".." {
        return Err(NameValidationError::Reserved);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(NameValidationError::IllegalCharacter);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        assert_eq!(validate_node_name("report.pdf"), Ok(()));
        assert_eq!(validate_node_name("…"), Ok(()));
        assert_eq!(validate_node_name(".hidden"), Ok(()));
    }

    #[test]
    fn rejects_empty_and_reserved() {
        assert_eq!(validate_node_name(""), Err(NameValidationError::Empty));
        assert_eq!(validate_node_name("."), Err(NameValidationError::Reserved));
        assert_eq!(validate_node_name(".."), Err(NameValidationError::Reserved));
    }

    #[test]
    fn rejects_separators() {
        assert_eq!(
            validate_node_name("a/b"),
            Err(NameValidationError::IllegalCharacter)
        );
        assert_eq!(
            validate_node_name("a\\b"),
            Err(NameValidationError::IllegalCharacter)
        );
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "x".repeat(MAX_NAME_LENGTH + 1);
        assert_eq!(validate_node_name(&name), Err(NameValidationError::TooLong));
        let name = "x".repeat(MAX_NAME_LENGTH);
        assert_eq!(validate_node_name(&name), Ok(()));
    }
}
