//! OpenPGP primitives interface
//!
//! The cryptographic library (OpenPGP, SRP, bcrypt) is an external
//! collaborator. This trait covers exactly the operations the metadata core
//! needs; everything content-related (block encryption, streaming) lives
//! elsewhere.

use crate::crypto::keys::{
    ArmoredKey, ArmoredMessage, ArmoredSignature, PrivateKey, PublicKey, SessionKey,
    VerificationKey,
};
use crate::crypto::verification::VerificationStatus;
use async_trait::async_trait;

/// Failure inside the OpenPGP provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pgp: {0}")]
pub struct PgpError(pub String);

/// Signature verification outcome for one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// Aggregate status across the payload's signatures.
    pub status: VerificationStatus,
    /// Provider error strings, for the human-readable author message.
    pub errors: Vec<String>,
}

impl VerificationOutcome {
    /// Outcome for an unsigned payload.
    pub fn not_signed() -> Self {
        Self {
            status: VerificationStatus::NotSigned,
            errors: Vec::new(),
        }
    }

    /// Outcome for a payload with a matching signature.
    pub fn valid() -> Self {
        Self {
            status: VerificationStatus::SignedAndValid,
            errors: Vec::new(),
        }
    }
}

/// Decryption result: plaintext plus the session key it was wrapped with
/// and the verification outcome of any embedded or detached signature.
#[derive(Debug, Clone)]
pub struct DecryptedMessage {
    /// The plaintext.
    pub data: Vec<u8>,
    /// Session key the message was encrypted with, when the provider can
    /// expose it.
    pub session_key: Option<SessionKey>,
    /// Signature verification outcome.
    pub verification: VerificationOutcome,
}

/// A freshly generated, locked key pair.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// Armored locked form, for the backend.
    pub armored: ArmoredKey,
    /// Unlocked handle, for immediate use.
    pub key: PrivateKey,
}

/// OpenPGP operations required by the metadata core.
#[async_trait]
pub trait PgpProvider: Send + Sync {
    /// Unlock an armored private key with its passphrase.
    async fn import_private_key(
        &self,
        armored: &ArmoredKey,
        passphrase: &str,
    ) -> Result<PrivateKey, PgpError>;

    /// Generate a fresh key locked with `passphrase`.
    async fn generate_key(&self, passphrase: &str) -> Result<GeneratedKey, PgpError>;

    /// Generate a fresh symmetric session key.
    async fn generate_session_key(&self) -> Result<SessionKey, PgpError>;

    /// Decrypt an armored message and verify its signature (embedded, or
    /// `detached_signature` when given) against `verification_keys`.
    /// Decryption failures are errors; verification failures are carried in
    /// the returned [`VerificationOutcome`], never thrown.
    async fn decrypt(
        &self,
        message: &ArmoredMessage,
        decryption_keys: &[PrivateKey],
        verification_keys: &[VerificationKey],
        detached_signature: Option<&ArmoredSignature>,
    ) -> Result<DecryptedMessage, PgpError>;

    /// Decrypt a binary session-key packet.
    async fn decrypt_session_key(
        &self,
        packet: &[u8],
        decryption_keys: &[PrivateKey],
    ) -> Result<SessionKey, PgpError>;

    /// Verify a detached signature over raw bytes.
    async fn verify_detached(
        &self,
        data: &[u8],
        signature: &ArmoredSignature,
        verification_keys: &[VerificationKey],
    ) -> Result<VerificationOutcome, PgpError>;

    /// Encrypt `data` into an armored message. When `session_key` is given
    /// it is used as the symmetric key (and additionally wrapped for each
    /// encryption key); otherwise the provider generates one. A signing key
    /// embeds a signature.
    async fn encrypt(
        &self,
        data: &[u8],
        session_key: Option<&SessionKey>,
        encryption_keys: &[PrivateKey],
        signing_key: Option<&PrivateKey>,
    ) -> Result<ArmoredMessage, PgpError>;

    /// Wrap a session key into a binary key packet for `recipient`.
    async fn encrypt_session_key(
        &self,
        session_key: &SessionKey,
        recipient: &PublicKey,
    ) -> Result<Vec<u8>, PgpError>;

    /// Produce a detached armored signature over `data`.
    async fn sign_detached(
        &self,
        data: &[u8],
        signing_key: &PrivateKey,
    ) -> Result<ArmoredSignature, PgpError>;
}
