//! Account and key directory interface
//!
//! Resolves email addresses to public keys and exposes the caller's own
//! signing address. Lookups for unknown addresses return an empty key list
//! rather than an error; the signature policy treats missing keys as
//! "keys unavailable".

use crate::crypto::keys::{PrivateKey, PublicKey};
use async_trait::async_trait;

/// Directory lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("key directory: {0}")]
pub struct DirectoryError(pub String);

/// The caller's own signing address.
#[derive(Debug, Clone)]
pub struct AddressKey {
    /// Address email.
    pub email: String,
    /// Unlocked address private key.
    pub key: PrivateKey,
}

/// Account/key directory operations required by the metadata core.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Public keys registered for an email; empty when the address is
    /// unknown.
    async fn public_keys(&self, email: &str) -> Result<Vec<PublicKey>, DirectoryError>;

    /// The caller's own signing address.
    async fn own_address(&self) -> Result<AddressKey, DirectoryError>;

    /// Whether an email is hosted by the service (selects internal vs.
    /// external invitations).
    async fn is_internal_address(&self, email: &str) -> Result<bool, DirectoryError>;
}
