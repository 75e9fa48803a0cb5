//! Velum Testkit: shared test doubles
//!
//! A structurally faithful fake of the OpenPGP provider (armored payloads
//! are JSON envelopes naming the keys they are encrypted to and the key
//! that signed them), a scriptable key directory, a share service double,
//! and builders for encrypted node fixtures. Everything here is test-only
//! plumbing; no real cryptography happens.

pub mod server;
pub mod wire;

pub use server::FakeDriveServer;
pub use wire::node_json;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use velum_core::effects::directory::{AddressKey, DirectoryError, KeyDirectory};
use velum_core::effects::pgp::{
    DecryptedMessage, GeneratedKey, PgpError, PgpProvider, VerificationOutcome,
};
use velum_core::effects::shares::ShareService;
use velum_core::{
    ArmoredKey, ArmoredMessage, ArmoredSignature, EncryptedCrypto, EncryptedNode,
    EncryptedNodeVariant, EncryptedRevision, Error, FileCrypto, FolderCrypto, MemberRole, NodeType,
    NodeUid, PrivateKey, PublicKey, Result, RevisionState, RevisionUid, SessionKey, ShareId,
    VerificationKey, VerificationStatus,
};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    to: Vec<String>,
    data: String,
    signer: Option<String>,
    session: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Signature {
    signer: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockedKey {
    id: String,
    passphrase: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyPacket {
    to: Vec<String>,
    session: String,
}

/// A fixed timestamp for fixtures.
pub fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap()
}

/// A private key handle with the given identity.
pub fn private_key(id: &str) -> PrivateKey {
    PrivateKey::new(id, id.as_bytes().to_vec())
}

/// A directory public key with the given identity (an email, usually).
pub fn public_key(id: &str) -> PublicKey {
    PublicKey(id.to_owned())
}

/// An armored locked key that unlocks with `passphrase`.
pub fn armored_private_key(id: &str, passphrase: &str) -> ArmoredKey {
    ArmoredKey(
        serde_json::to_string(&LockedKey {
            id: id.to_owned(),
            passphrase: passphrase.to_owned(),
        })
        .expect("serialize locked key"),
    )
}

/// An armored message encrypted to `to`, optionally signed by `signer`.
pub fn encrypt_to(to: &[&str], data: &[u8], signer: Option<&str>, session: &[u8]) -> ArmoredMessage {
    ArmoredMessage(
        serde_json::to_string(&Envelope {
            to: to.iter().map(|s| (*s).to_owned()).collect(),
            data: BASE64.encode(data),
            signer: signer.map(str::to_owned),
            session: BASE64.encode(session),
        })
        .expect("serialize envelope"),
    )
}

/// A detached signature by `signer` over `data`.
pub fn detached_signature(signer: &str, data: &[u8]) -> ArmoredSignature {
    ArmoredSignature(
        serde_json::to_string(&Signature {
            signer: signer.to_owned(),
            data: BASE64.encode(data),
        })
        .expect("serialize signature"),
    )
}

/// A base64 session-key packet readable by `to`.
pub fn session_key_packet(to: &[&str], session: &[u8]) -> String {
    let packet = serde_json::to_string(&KeyPacket {
        to: to.iter().map(|s| (*s).to_owned()).collect(),
        session: BASE64.encode(session),
    })
    .expect("serialize key packet");
    BASE64.encode(packet.as_bytes())
}

fn verification_ids(keys: &[VerificationKey]) -> Vec<String> {
    keys.iter()
        .map(|key| match key {
            VerificationKey::Public(public) => public.0.clone(),
            VerificationKey::Private(private) => private.key_id().to_owned(),
        })
        .collect()
}

fn verify_signer(signer: Option<&str>, keys: &[VerificationKey]) -> VerificationOutcome {
    match signer {
        None => VerificationOutcome::not_signed(),
        Some(signer) => {
            if verification_ids(keys).iter().any(|id| id == signer) {
                VerificationOutcome::valid()
            } else {
                VerificationOutcome {
                    status: VerificationStatus::SignedAndInvalid,
                    errors: vec![format!("no key for signer {signer}")],
                }
            }
        }
    }
}

/// Structurally faithful OpenPGP provider double.
#[derive(Debug, Default)]
pub struct FakePgp {
    counter: AtomicU64,
}

impl FakePgp {
    /// Create a provider double.
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl PgpProvider for FakePgp {
    async fn import_private_key(
        &self,
        armored: &ArmoredKey,
        passphrase: &str,
    ) -> std::result::Result<PrivateKey, PgpError> {
        let locked: LockedKey = serde_json::from_str(armored.as_str())
            .map_err(|error| PgpError(format!("malformed key: {error}")))?;
        if locked.passphrase != passphrase {
            return Err(PgpError("wrong passphrase".to_owned()));
        }
        Ok(private_key(&locked.id))
    }

    async fn generate_key(
        &self,
        passphrase: &str,
    ) -> std::result::Result<GeneratedKey, PgpError> {
        let id = format!("generated-key-{}", self.next());
        Ok(GeneratedKey {
            armored: armored_private_key(&id, passphrase),
            key: private_key(&id),
        })
    }

    async fn generate_session_key(&self) -> std::result::Result<SessionKey, PgpError> {
        let id = self.next();
        Ok(SessionKey::new(id.to_be_bytes().to_vec(), None))
    }

    async fn decrypt(
        &self,
        message: &ArmoredMessage,
        decryption_keys: &[PrivateKey],
        verification_keys: &[VerificationKey],
        detached_signature: Option<&ArmoredSignature>,
    ) -> std::result::Result<DecryptedMessage, PgpError> {
        let envelope: Envelope = serde_json::from_str(message.as_str())
            .map_err(|error| PgpError(format!("malformed message: {error}")))?;
        if !decryption_keys
            .iter()
            .any(|key| envelope.to.iter().any(|id| id == key.key_id()))
        {
            return Err(PgpError("no decryption key matches".to_owned()));
        }
        let data = BASE64
            .decode(&envelope.data)
            .map_err(|error| PgpError(format!("malformed payload: {error}")))?;
        let verification = match detached_signature {
            Some(signature) => {
                let parsed: Signature = serde_json::from_str(signature.as_str())
                    .map_err(|error| PgpError(format!("malformed signature: {error}")))?;
                if parsed.data != envelope.data {
                    VerificationOutcome {
                        status: VerificationStatus::SignedAndInvalid,
                        errors: vec!["signature covers different data".to_owned()],
                    }
                } else {
                    verify_signer(Some(&parsed.signer), verification_keys)
                }
            }
            None => verify_signer(envelope.signer.as_deref(), verification_keys),
        };
        let session = BASE64
            .decode(&envelope.session)
            .map_err(|error| PgpError(format!("malformed session key: {error}")))?;
        Ok(DecryptedMessage {
            data,
            session_key: Some(SessionKey::new(session, None)),
            verification,
        })
    }

    async fn decrypt_session_key(
        &self,
        packet: &[u8],
        decryption_keys: &[PrivateKey],
    ) -> std::result::Result<SessionKey, PgpError> {
        let text = String::from_utf8(packet.to_vec())
            .map_err(|_| PgpError("malformed key packet".to_owned()))?;
        let parsed: KeyPacket = serde_json::from_str(&text)
            .map_err(|error| PgpError(format!("malformed key packet: {error}")))?;
        if !decryption_keys
            .iter()
            .any(|key| parsed.to.iter().any(|id| id == key.key_id()))
        {
            return Err(PgpError("no decryption key matches".to_owned()));
        }
        let session = BASE64
            .decode(&parsed.session)
            .map_err(|error| PgpError(format!("malformed session key: {error}")))?;
        Ok(SessionKey::new(session, None))
    }

    async fn verify_detached(
        &self,
        data: &[u8],
        signature: &ArmoredSignature,
        verification_keys: &[VerificationKey],
    ) -> std::result::Result<VerificationOutcome, PgpError> {
        let parsed: Signature = serde_json::from_str(signature.as_str())
            .map_err(|error| PgpError(format!("malformed signature: {error}")))?;
        if parsed.data != BASE64.encode(data) {
            return Ok(VerificationOutcome {
                status: VerificationStatus::SignedAndInvalid,
                errors: vec!["signature covers different data".to_owned()],
            });
        }
        Ok(verify_signer(Some(&parsed.signer), verification_keys))
    }

    async fn encrypt(
        &self,
        data: &[u8],
        session_key: Option<&SessionKey>,
        encryption_keys: &[PrivateKey],
        signing_key: Option<&PrivateKey>,
    ) -> std::result::Result<ArmoredMessage, PgpError> {
        let session = match session_key {
            Some(key) => key.data().to_vec(),
            None => self.next().to_be_bytes().to_vec(),
        };
        Ok(encrypt_to(
            &encryption_keys
                .iter()
                .map(PrivateKey::key_id)
                .collect::<Vec<_>>(),
            data,
            signing_key.map(PrivateKey::key_id),
            &session,
        ))
    }

    async fn encrypt_session_key(
        &self,
        session_key: &SessionKey,
        recipient: &PublicKey,
    ) -> std::result::Result<Vec<u8>, PgpError> {
        let packet = serde_json::to_string(&KeyPacket {
            to: vec![recipient.0.clone()],
            session: BASE64.encode(session_key.data()),
        })
        .map_err(|error| PgpError(format!("serialize key packet: {error}")))?;
        Ok(packet.into_bytes())
    }

    async fn sign_detached(
        &self,
        data: &[u8],
        signing_key: &PrivateKey,
    ) -> std::result::Result<ArmoredSignature, PgpError> {
        Ok(detached_signature(signing_key.key_id(), data))
    }
}

/// Scriptable key directory double.
#[derive(Debug)]
pub struct FakeDirectory {
    own_email: String,
    addresses: Mutex<HashMap<String, Vec<PublicKey>>>,
    internal: Mutex<Vec<String>>,
}

impl FakeDirectory {
    /// Create a directory whose own address is `own_email`; the address is
    /// registered as internal with a matching public key.
    pub fn new(own_email: &str) -> Self {
        let directory = Self {
            own_email: own_email.to_owned(),
            addresses: Mutex::new(HashMap::new()),
            internal: Mutex::new(Vec::new()),
        };
        directory.register(own_email);
        directory
    }

    /// Register an internal address with a matching public key.
    pub fn register(&self, email: &str) {
        self.addresses
            .lock()
            .insert(email.to_owned(), vec![public_key(email)]);
        self.internal.lock().push(email.to_owned());
    }
}

#[async_trait]
impl KeyDirectory for FakeDirectory {
    async fn public_keys(
        &self,
        email: &str,
    ) -> std::result::Result<Vec<PublicKey>, DirectoryError> {
        Ok(self
            .addresses
            .lock()
            .get(email)
            .cloned()
            .unwrap_or_default())
    }

    async fn own_address(&self) -> std::result::Result<AddressKey, DirectoryError> {
        Ok(AddressKey {
            email: self.own_email.clone(),
            key: private_key(&self.own_email),
        })
    }

    async fn is_internal_address(
        &self,
        email: &str,
    ) -> std::result::Result<bool, DirectoryError> {
        Ok(self.internal.lock().iter().any(|known| known == email))
    }
}

/// Share service double with scriptable share keys.
#[derive(Debug, Default)]
pub struct FakeShareService {
    keys: Mutex<HashMap<ShareId, PrivateKey>>,
    deleted: Mutex<Vec<ShareId>>,
    counter: AtomicU64,
}

impl FakeShareService {
    /// Create an empty share service double.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a share and its private key.
    pub fn insert_share(&self, share_id: &str, key_id: &str) {
        self.keys
            .lock()
            .insert(ShareId::new(share_id), private_key(key_id));
    }

    /// Shares deleted through the double.
    pub fn deleted(&self) -> Vec<ShareId> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl ShareService for FakeShareService {
    async fn share_key(&self, share_id: &ShareId) -> Result<PrivateKey> {
        self.keys
            .lock()
            .get(share_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("share {share_id}")))
    }

    async fn share_session_key(&self, share_id: &ShareId) -> Result<SessionKey> {
        Ok(SessionKey::new(share_id.as_str().as_bytes().to_vec(), None))
    }

    async fn create_share(&self, _node_uid: &NodeUid) -> Result<ShareId> {
        let id = format!("share-{}", self.counter.fetch_add(1, Ordering::Relaxed));
        let share_id = ShareId::new(id.clone());
        self.keys
            .lock()
            .insert(share_id.clone(), private_key(&format!("{id}-key")));
        Ok(share_id)
    }

    async fn delete_share(&self, share_id: &ShareId) -> Result<()> {
        self.keys.lock().remove(share_id);
        self.deleted.lock().push(share_id.clone());
        Ok(())
    }
}

/// Builder for encrypted folder fixtures.
#[derive(Debug, Clone)]
pub struct EncryptedFolderBuilder {
    /// Node UID.
    pub uid: String,
    /// Parent UID; `None` builds a root carrying `share_id`.
    pub parent_uid: Option<String>,
    /// Share id for roots.
    pub share_id: Option<String>,
    /// Plaintext name.
    pub name: String,
    /// Identity of the parent (or share) key.
    pub parent_key_id: String,
    /// Identity of the node key.
    pub node_key_id: String,
    /// Node passphrase.
    pub passphrase: String,
    /// Key signature email; `None` builds an anonymous node signed with the
    /// parent key.
    pub signature_email: Option<String>,
    /// Name signature email; defaults to `signature_email` when `None`.
    pub name_signature_email: Option<String>,
    /// Overrides the passphrase signer; defaults to the signature email, or
    /// the parent key for anonymous nodes.
    pub passphrase_signer: Option<String>,
    /// Overrides the hash key signer.
    pub hash_key_signer: Option<String>,
    /// Raw hash-key bytes.
    pub hash_key: Vec<u8>,
    /// Plaintext folder extended attributes JSON.
    pub extended_attributes: Option<String>,
}

impl EncryptedFolderBuilder {
    /// A folder fixture with sensible defaults.
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_owned(),
            parent_uid: Some("vol~parent".to_owned()),
            share_id: None,
            name: "folder".to_owned(),
            parent_key_id: "parent-key".to_owned(),
            node_key_id: "node-key".to_owned(),
            passphrase: "node-passphrase".to_owned(),
            signature_email: Some("alice@example.com".to_owned()),
            name_signature_email: None,
            passphrase_signer: None,
            hash_key_signer: None,
            hash_key: vec![7u8; 32],
            extended_attributes: None,
        }
    }

    /// Assemble the encrypted node.
    pub fn build(&self) -> EncryptedNode {
        let default_signer = self
            .signature_email
            .clone()
            .unwrap_or_else(|| self.parent_key_id.clone());
        let passphrase_signer = self
            .passphrase_signer
            .clone()
            .unwrap_or_else(|| default_signer.clone());
        let hash_key_signer = self
            .hash_key_signer
            .clone()
            .unwrap_or_else(|| default_signer.clone());
        let name_signer = self
            .name_signature_email
            .clone()
            .unwrap_or_else(|| default_signer.clone());

        EncryptedNode {
            uid: NodeUid::from_raw(&*self.uid),
            parent_uid: self.parent_uid.as_deref().map(NodeUid::from_raw),
            node_type: NodeType::Folder,
            media_type: None,
            creation_time: fixture_time(),
            trash_time: None,
            share_id: self.share_id.as_deref().map(ShareId::from),
            is_shared: self.share_id.is_some(),
            direct_role: MemberRole::Admin,
            membership: None,
            hash: self.parent_uid.as_ref().map(|_| "name-hash".to_owned()),
            encrypted_name: encrypt_to(
                &[&self.parent_key_id],
                self.name.as_bytes(),
                Some(&name_signer),
                b"name-session",
            ),
            crypto: EncryptedCrypto {
                armored_key: armored_private_key(&self.node_key_id, &self.passphrase),
                armored_passphrase: encrypt_to(
                    &[&self.parent_key_id],
                    self.passphrase.as_bytes(),
                    None,
                    b"passphrase-session",
                ),
                armored_passphrase_signature: detached_signature(
                    &passphrase_signer,
                    self.passphrase.as_bytes(),
                ),
                signature_email: self.signature_email.clone(),
                name_signature_email: self.name_signature_email.clone(),
                variant: EncryptedNodeVariant::Folder(FolderCrypto {
                    armored_hash_key: encrypt_to(
                        &[&self.node_key_id],
                        &self.hash_key,
                        Some(&hash_key_signer),
                        b"hash-key-session",
                    ),
                    armored_extended_attributes: self.extended_attributes.as_ref().map(|json| {
                        encrypt_to(
                            &[&self.node_key_id],
                            json.as_bytes(),
                            Some(&default_signer),
                            b"xattr-session",
                        )
                    }),
                }),
            },
        }
    }
}

/// Builder for encrypted file fixtures.
#[derive(Debug, Clone)]
pub struct EncryptedFileBuilder {
    /// Node UID.
    pub uid: String,
    /// Parent UID.
    pub parent_uid: Option<String>,
    /// Plaintext name.
    pub name: String,
    /// Identity of the parent key.
    pub parent_key_id: String,
    /// Identity of the node key.
    pub node_key_id: String,
    /// Node passphrase.
    pub passphrase: String,
    /// Key signature email; `None` builds an anonymous node.
    pub signature_email: Option<String>,
    /// Plaintext revision extended attributes JSON.
    pub revision_attributes: Option<String>,
    /// Content session key bytes.
    pub content_session_key: Vec<u8>,
    /// Whether the content key packet carries a signature.
    pub sign_content_key: bool,
}

impl EncryptedFileBuilder {
    /// A file fixture with sensible defaults.
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_owned(),
            parent_uid: Some("vol~parent".to_owned()),
            name: "file.txt".to_owned(),
            parent_key_id: "parent-key".to_owned(),
            node_key_id: "file-key".to_owned(),
            passphrase: "file-passphrase".to_owned(),
            signature_email: Some("alice@example.com".to_owned()),
            revision_attributes: None,
            content_session_key: b"content-session".to_vec(),
            sign_content_key: true,
        }
    }

    /// Assemble the encrypted node.
    pub fn build(&self) -> EncryptedNode {
        let signer = self
            .signature_email
            .clone()
            .unwrap_or_else(|| self.parent_key_id.clone());
        let packet = session_key_packet(&[&self.node_key_id], &self.content_session_key);
        let packet_bytes = BASE64.decode(&packet).expect("round-trip packet");
        let revision_uid = RevisionUid::from_raw(format!("{}~rev1", self.uid));

        EncryptedNode {
            uid: NodeUid::from_raw(&*self.uid),
            parent_uid: self.parent_uid.as_deref().map(NodeUid::from_raw),
            node_type: NodeType::File,
            media_type: Some("text/plain".to_owned()),
            creation_time: fixture_time(),
            trash_time: None,
            share_id: None,
            is_shared: false,
            direct_role: MemberRole::Admin,
            membership: None,
            hash: Some("name-hash".to_owned()),
            encrypted_name: encrypt_to(
                &[&self.parent_key_id],
                self.name.as_bytes(),
                Some(&signer),
                b"name-session",
            ),
            crypto: EncryptedCrypto {
                armored_key: armored_private_key(&self.node_key_id, &self.passphrase),
                armored_passphrase: encrypt_to(
                    &[&self.parent_key_id],
                    self.passphrase.as_bytes(),
                    None,
                    b"passphrase-session",
                ),
                armored_passphrase_signature: detached_signature(
                    &signer,
                    self.passphrase.as_bytes(),
                ),
                signature_email: self.signature_email.clone(),
                name_signature_email: None,
                variant: EncryptedNodeVariant::File(FileCrypto {
                    content_key_packet: packet,
                    content_key_packet_signature: self
                        .sign_content_key
                        .then(|| detached_signature(&signer, &packet_bytes)),
                    active_revision: Some(EncryptedRevision {
                        uid: revision_uid,
                        state: RevisionState::Active,
                        creation_time: fixture_time(),
                        storage_size: 1024,
                        signature_email: self.signature_email.clone(),
                        armored_extended_attributes: self.revision_attributes.as_ref().map(
                            |json| {
                                encrypt_to(
                                    &[&self.node_key_id],
                                    json.as_bytes(),
                                    Some(&signer),
                                    b"xattr-session",
                                )
                            },
                        ),
                        thumbnails: Vec::new(),
                    }),
                }),
            },
        }
    }
}
