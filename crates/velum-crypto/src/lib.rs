//! Velum Crypto: high-level per-node cryptography
//!
//! The [`CryptoService`] turns encrypted node records into decrypted ones
//! and produces the encrypted material for mutations. It owns the signature
//! verification policy (which keys verify which payload, and how failures
//! downgrade the reported author) and de-duplicates the telemetry it emits
//! to once per node and kind for the process lifetime.
//!
//! The OpenPGP primitives themselves live behind
//! [`velum_core::effects::pgp::PgpProvider`].

pub mod hash;
pub mod metrics;
pub mod policy;
pub mod service;
pub mod types;

pub use hash::name_hash;
pub use service::CryptoService;
pub use types::{
    DecryptedNodeBundle, EncryptedFolderMaterial, MoveMaterial, RenameMaterial, UnparsedNode,
    UnparsedRevision,
};
