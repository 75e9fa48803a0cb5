//! Key material and armored payload types
//!
//! Unlocked key material is wrapped in [`zeroize::Zeroizing`] so it is wiped
//! when dropped. None of the secret-carrying types serialize; the durable
//! cache stores public metadata only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// ASCII-armored locked private key, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArmoredKey(pub String);

impl ArmoredKey {
    /// Borrow the armored text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// ASCII-armored OpenPGP message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArmoredMessage(pub String);

impl ArmoredMessage {
    /// Borrow the armored text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// ASCII-armored detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArmoredSignature(pub String);

impl ArmoredSignature {
    /// Borrow the armored text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// ASCII-armored public key, as returned by the key directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(pub String);

impl PublicKey {
    /// Borrow the armored text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A node passphrase, wiped on drop.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// Wrap a passphrase string.
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(passphrase.into()))
    }

    /// Borrow the passphrase text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(..)")
    }
}

struct PrivateKeyInner {
    key_id: String,
    material: Zeroizing<Vec<u8>>,
}

/// Handle to an unlocked private key.
///
/// The material layout is owned by the [`crate::effects::pgp::PgpProvider`]
/// that produced the handle; Velum only moves it around. Clones share the
/// same material, which is zeroized when the last clone drops.
#[derive(Clone)]
pub struct PrivateKey {
    inner: Arc<PrivateKeyInner>,
}

impl PrivateKey {
    /// Wrap provider-produced key material.
    pub fn new(key_id: impl Into<String>, material: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(PrivateKeyInner {
                key_id: key_id.into(),
                material: Zeroizing::new(material),
            }),
        }
    }

    /// Stable identifier of the key (fingerprint or provider-chosen id).
    pub fn key_id(&self) -> &str {
        &self.inner.key_id
    }

    /// Raw unlocked material, for the provider that created the handle.
    pub fn material(&self) -> &[u8] {
        &self.inner.material
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_id", &self.inner.key_id)
            .finish_non_exhaustive()
    }
}

/// Symmetric session key wrapped by a node or share key.
#[derive(Clone)]
pub struct SessionKey {
    data: Zeroizing<Vec<u8>>,
    algorithm: Option<String>,
}

impl SessionKey {
    /// Wrap raw session-key bytes.
    pub fn new(data: Vec<u8>, algorithm: Option<String>) -> Self {
        Self {
            data: Zeroizing::new(data),
            algorithm,
        }
    }

    /// Raw key bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cipher algorithm the key is intended for, if the provider knows it.
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Per-folder HMAC key used to compute child-name hashes.
#[derive(Clone)]
pub struct HashKey(Zeroizing<Vec<u8>>);

impl HashKey {
    /// Wrap raw hash-key bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(Zeroizing::new(data))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashKey(..)")
    }
}

/// A key usable for signature verification: either a directory public key or
/// the public half of an unlocked private key.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    /// Armored public key from the key directory.
    Public(PublicKey),
    /// Unlocked key handle; the provider verifies with its public half.
    Private(PrivateKey),
}

impl From<PublicKey> for VerificationKey {
    fn from(key: PublicKey) -> Self {
        Self::Public(key)
    }
}

impl From<PrivateKey> for VerificationKey {
    fn from(key: PrivateKey) -> Self {
        Self::Private(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_debug_hides_material() {
        let key = PrivateKey::new("fp-1", vec![1, 2, 3]);
        let debug = format!("{key:?}");
        assert!(debug.contains("fp-1"));
        assert!(!debug.contains("[1, 2, 3]"));
    }

    #[test]
    fn clones_share_material() {
        let key = PrivateKey::new("fp-2", vec![9; 16]);
        let clone = key.clone();
        assert_eq!(key.material(), clone.material());
        assert_eq!(key.key_id(), "fp-2");
    }
}
