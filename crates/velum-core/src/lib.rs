//! Velum Core: foundation types for the encrypted drive metadata pipeline
//!
//! This crate holds everything the other Velum crates share: composite
//! identifiers, the unified error type, node and sharing records in both
//! their encrypted and decrypted forms, the extended-attributes codec, and
//! the effect traits for every injected collaborator (durable entity store,
//! OpenPGP primitives, account/key directory, share key lookup, telemetry).
//!
//! Nothing in this crate performs I/O on its own; implementations of the
//! effect traits are provided by the embedding application (or by the
//! in-memory doubles in [`memory`] for tests).

pub mod abort;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod effects;
pub mod error;
pub mod id;
pub mod memory;
pub mod name;
pub mod node;
pub mod sharing;
pub mod xattr;

pub use abort::AbortSignal;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use id::{
    DeviceUid, InvitationUid, MemberUid, NodeUid, PublicLinkUid, RevisionUid, ShareId, VolumeId,
};
pub use name::{validate_node_name, NameValidationError};

pub use crypto::keys::{
    ArmoredKey, ArmoredMessage, ArmoredSignature, HashKey, Passphrase, PrivateKey, PublicKey,
    SessionKey, VerificationKey,
};
pub use crypto::verification::{Author, NameError, VerificationError, VerificationStatus};

pub use node::{
    DecryptedMembership, DecryptedNode, DecryptedNodeKeys, DecryptedRevision, EncryptedCrypto,
    EncryptedMembership, EncryptedNode, EncryptedNodeVariant, EncryptedRevision, FileCrypto,
    FolderCrypto, MemberRole, NodeType, RevisionState, Thumbnail,
};
