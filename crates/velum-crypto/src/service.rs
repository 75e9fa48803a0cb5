//! The crypto service
//!
//! One service instance per client. All per-node encryption and decryption
//! flows through here so the verification-key selection rules and the
//! metric de-duplication stay in one place.

use crate::metrics::ReportedErrors;
use crate::policy::build_author;
use crate::types::{
    DecryptedNodeBundle, EncryptedFolderMaterial, MoveMaterial, RenameMaterial, UnparsedNode,
    UnparsedRevision,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::sync::Arc;
use tracing::warn;
use velum_core::effects::directory::KeyDirectory;
use velum_core::effects::pgp::PgpProvider;
use velum_core::effects::telemetry::{MetricField, Telemetry};
use velum_core::{
    ArmoredMessage, Author, DecryptedMembership, DecryptedNodeKeys, EncryptedNode,
    EncryptedNodeVariant, EncryptedRevision, Error, HashKey, NameError, Passphrase, PrivateKey,
    Result, SessionKey, VerificationError, VerificationKey,
};

/// High-level per-node crypto with signature policy and metric reporting.
pub struct CryptoService {
    pgp: Arc<dyn PgpProvider>,
    directory: Arc<dyn KeyDirectory>,
    telemetry: Arc<dyn Telemetry>,
    reported: ReportedErrors,
}

impl CryptoService {
    /// Build a service over the injected collaborators.
    pub fn new(
        pgp: Arc<dyn PgpProvider>,
        directory: Arc<dyn KeyDirectory>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            pgp,
            directory,
            telemetry,
            reported: ReportedErrors::default(),
        }
    }

    /// Public keys of an email, as verification keys. Lookup failures log
    /// and yield an empty set; the policy then treats keys as unavailable.
    async fn address_keys(&self, email: Option<&str>) -> Vec<VerificationKey> {
        let Some(email) = email else {
            return Vec::new();
        };
        match self.directory.public_keys(email).await {
            Ok(keys) => keys.into_iter().map(VerificationKey::Public).collect(),
            Err(error) => {
                warn!(email, %error, "public key lookup failed");
                Vec::new()
            }
        }
    }

    /// Decrypt one node with its parent key (the parent node's key, or the
    /// share key for roots).
    ///
    /// Never fails: an undecryptable node key yields a degraded record with
    /// error authors and no key material.
    pub async fn decrypt_node(
        &self,
        encrypted: &EncryptedNode,
        parent_key: &PrivateKey,
    ) -> DecryptedNodeBundle {
        let crypto = &encrypted.crypto;
        let signature_email = crypto.signature_email.as_deref();
        let name_signature_email = crypto.name_signature_email.as_deref();
        let claimed_name_email = name_signature_email.or(signature_email);

        let signature_email_keys = self.address_keys(signature_email).await;

        // Parent keys only count as verification keys for non-root nodes;
        // a directly shared root has no meaningful parent signer.
        let node_parent_keys: Vec<VerificationKey> = if encrypted.parent_uid.is_some() {
            vec![VerificationKey::Private(parent_key.clone())]
        } else {
            Vec::new()
        };

        let key_verification_keys = if signature_email.is_some() {
            signature_email_keys.clone()
        } else {
            node_parent_keys.clone()
        };

        let name_verification_keys = if claimed_name_email == signature_email {
            key_verification_keys.clone()
        } else if let Some(email) = claimed_name_email {
            self.address_keys(Some(email)).await
        } else {
            node_parent_keys.clone()
        };

        // Membership carries no ciphertext today and its author is treated
        // as verified until a policy is defined.
        let membership = encrypted.membership.as_ref().map(|m| DecryptedMembership {
            role: m.role,
            invite_time: m.invite_time,
            shared_by: Ok(m.inviter_email.clone()),
        });

        let name_future = self.decrypt_name(
            encrypted,
            parent_key,
            &name_verification_keys,
            claimed_name_email,
        );
        let key_future = self.decrypt_key(
            encrypted,
            parent_key,
            &key_verification_keys,
            signature_email,
        );
        let (name_outcome, key_outcome) = futures::join!(name_future, key_future);
        let (name, name_author) = name_outcome;

        let (passphrase, node_key, passphrase_session_key, key_author) = match key_outcome {
            Ok(decrypted) => decrypted,
            Err(cause) => {
                self.reported.report_decryption(
                    &self.telemetry,
                    encrypted.uid.as_str(),
                    MetricField::NodeKey,
                );
                let message = cause.to_string();
                let node = UnparsedNode {
                    uid: encrypted.uid.clone(),
                    parent_uid: encrypted.parent_uid.clone(),
                    node_type: encrypted.node_type,
                    media_type: encrypted.media_type.clone(),
                    creation_time: encrypted.creation_time,
                    trash_time: encrypted.trash_time,
                    share_id: encrypted.share_id.clone(),
                    is_shared: encrypted.is_shared,
                    direct_role: encrypted.direct_role,
                    membership,
                    hash: encrypted.hash.clone(),
                    name,
                    key_author: Err(VerificationError::new(
                        signature_email.map(str::to_owned),
                        message.clone(),
                    )),
                    name_author: Err(VerificationError::new(
                        claimed_name_email.map(str::to_owned),
                        message,
                    )),
                    active_revision: None,
                    folder_attributes_raw: None,
                    errors: vec![cause],
                };
                return DecryptedNodeBundle { node, keys: None };
            }
        };

        let mut errors = Vec::new();
        let mut hash_key = None;
        let mut folder_attributes_raw = None;
        let mut content_key_packet_session_key = None;
        let mut active_revision = None;
        let mut hash_key_author: Option<Author> = None;
        let mut attributes_author: Option<Author> = None;
        let mut content_key_author: Option<Author> = None;

        match &crypto.variant {
            EncryptedNodeVariant::Folder(folder) => {
                let hash_key_future = self.pgp.decrypt(
                    &folder.armored_hash_key,
                    std::slice::from_ref(&node_key),
                    &signature_email_keys,
                    None,
                );
                let attributes_keys = if signature_email.is_some() {
                    signature_email_keys.clone()
                } else {
                    vec![VerificationKey::Private(node_key.clone())]
                };
                let attributes_future = async {
                    match &folder.armored_extended_attributes {
                        None => None,
                        Some(message) => Some(
                            self.pgp
                                .decrypt(
                                    message,
                                    std::slice::from_ref(&node_key),
                                    &attributes_keys,
                                    None,
                                )
                                .await,
                        ),
                    }
                };
                let (hash_key_outcome, attributes_outcome) =
                    futures::join!(hash_key_future, attributes_future);

                match hash_key_outcome {
                    Ok(message) => {
                        hash_key_author = Some(build_author(
                            &message.verification,
                            signature_email,
                            !signature_email_keys.is_empty(),
                        ));
                        hash_key = Some(HashKey::new(message.data));
                    }
                    Err(error) => {
                        self.reported.report_decryption(
                            &self.telemetry,
                            encrypted.uid.as_str(),
                            MetricField::HashKey,
                        );
                        errors.push(Error::decryption(format!("folder hash key: {error}")));
                    }
                }

                match attributes_outcome {
                    None => {}
                    Some(Ok(message)) => {
                        attributes_author = Some(build_author(
                            &message.verification,
                            signature_email,
                            true,
                        ));
                        match String::from_utf8(message.data) {
                            Ok(json) => folder_attributes_raw = Some(json),
                            Err(_) => errors.push(Error::decryption(
                                "folder extended attributes are not valid UTF-8",
                            )),
                        }
                    }
                    Some(Err(error)) => {
                        self.reported.report_decryption(
                            &self.telemetry,
                            encrypted.uid.as_str(),
                            MetricField::ExtendedAttributes,
                        );
                        errors.push(Error::decryption(format!(
                            "folder extended attributes: {error}"
                        )));
                    }
                }
            }
            EncryptedNodeVariant::File(file) => {
                let revision_future = async {
                    match &file.active_revision {
                        None => None,
                        Some(revision) => Some(self.decrypt_revision(revision, &node_key).await),
                    }
                };
                let content_key_future = self.decrypt_content_key(
                    encrypted,
                    file.content_key_packet.as_str(),
                    file.content_key_packet_signature.as_ref(),
                    &node_key,
                    &signature_email_keys,
                    signature_email,
                );
                let (revision_outcome, content_key_outcome) =
                    futures::join!(revision_future, content_key_future);

                active_revision = revision_outcome;
                match content_key_outcome {
                    Ok((session_key, author)) => {
                        content_key_packet_session_key = Some(session_key);
                        content_key_author = author;
                    }
                    Err(error) => {
                        self.reported.report_decryption(
                            &self.telemetry,
                            encrypted.uid.as_str(),
                            MetricField::ContentKey,
                        );
                        errors.push(error);
                    }
                }
            }
        }

        // The reported key author is the worst of the node-key, content-key,
        // hash-key and folder-attributes signatures.
        let worst = [
            Some(&key_author),
            content_key_author.as_ref(),
            hash_key_author.as_ref(),
            attributes_author.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find(|author| author.is_err())
        .cloned();
        let final_key_author = worst.unwrap_or(key_author);

        if final_key_author.is_err() || name_author.is_err() {
            let field = if final_key_author.is_err() {
                MetricField::NodeKey
            } else {
                MetricField::Name
            };
            self.reported
                .report_verification(&self.telemetry, encrypted.uid.as_str(), field);
        }

        let keys = DecryptedNodeKeys {
            passphrase,
            key: node_key,
            passphrase_session_key,
            content_key_packet_session_key,
            hash_key,
        };

        let node = UnparsedNode {
            uid: encrypted.uid.clone(),
            parent_uid: encrypted.parent_uid.clone(),
            node_type: encrypted.node_type,
            media_type: encrypted.media_type.clone(),
            creation_time: encrypted.creation_time,
            trash_time: encrypted.trash_time,
            share_id: encrypted.share_id.clone(),
            is_shared: encrypted.is_shared,
            direct_role: encrypted.direct_role,
            membership,
            hash: encrypted.hash.clone(),
            name,
            key_author: final_key_author,
            name_author,
            active_revision,
            folder_attributes_raw,
            errors,
        };
        DecryptedNodeBundle {
            node,
            keys: Some(keys),
        }
    }

    async fn decrypt_key(
        &self,
        encrypted: &EncryptedNode,
        parent_key: &PrivateKey,
        verification_keys: &[VerificationKey],
        claimed: Option<&str>,
    ) -> Result<(Passphrase, PrivateKey, SessionKey, Author)> {
        let crypto = &encrypted.crypto;
        let message = self
            .pgp
            .decrypt(
                &crypto.armored_passphrase,
                std::slice::from_ref(parent_key),
                verification_keys,
                Some(&crypto.armored_passphrase_signature),
            )
            .await
            .map_err(|error| Error::decryption(format!("node passphrase: {error}")))?;
        let passphrase_text = String::from_utf8(message.data)
            .map_err(|_| Error::decryption("node passphrase is not valid UTF-8"))?;
        let key = self
            .pgp
            .import_private_key(&crypto.armored_key, &passphrase_text)
            .await
            .map_err(|error| Error::decryption(format!("node key: {error}")))?;
        let session_key = message
            .session_key
            .ok_or_else(|| Error::decryption("node passphrase session key unavailable"))?;
        let author = build_author(
            &message.verification,
            claimed,
            !verification_keys.is_empty(),
        );
        Ok((Passphrase::new(passphrase_text), key, session_key, author))
    }

    async fn decrypt_name(
        &self,
        encrypted: &EncryptedNode,
        parent_key: &PrivateKey,
        verification_keys: &[VerificationKey],
        claimed: Option<&str>,
    ) -> (std::result::Result<String, NameError>, Author) {
        match self
            .pgp
            .decrypt(
                &encrypted.encrypted_name,
                std::slice::from_ref(parent_key),
                verification_keys,
                None,
            )
            .await
        {
            Ok(message) => {
                let author = build_author(
                    &message.verification,
                    claimed,
                    !verification_keys.is_empty(),
                );
                match String::from_utf8(message.data) {
                    Ok(name) => (Ok(name), author),
                    Err(_) => (
                        Err(NameError::Undecryptable {
                            message: "name is not valid UTF-8".to_owned(),
                        }),
                        author,
                    ),
                }
            }
            Err(error) => {
                self.reported.report_decryption(
                    &self.telemetry,
                    encrypted.uid.as_str(),
                    MetricField::Name,
                );
                (
                    Err(NameError::Undecryptable {
                        message: error.to_string(),
                    }),
                    Err(VerificationError::new(
                        claimed.map(str::to_owned),
                        format!("name could not be decrypted: {error}"),
                    )),
                )
            }
        }
    }

    async fn decrypt_content_key(
        &self,
        encrypted: &EncryptedNode,
        packet_base64: &str,
        signature: Option<&velum_core::ArmoredSignature>,
        node_key: &PrivateKey,
        signature_email_keys: &[VerificationKey],
        claimed: Option<&str>,
    ) -> Result<(SessionKey, Option<Author>)> {
        let packet = BASE64.decode(packet_base64).map_err(|error| {
            Error::decryption(format!(
                "content key packet of {} is not valid base64: {error}",
                encrypted.uid
            ))
        })?;
        let session_key = self
            .pgp
            .decrypt_session_key(&packet, std::slice::from_ref(node_key))
            .await
            .map_err(|error| Error::decryption(format!("content key packet: {error}")))?;
        let author = match signature {
            None => None,
            Some(signature) => {
                // Legacy tolerance: old clients signed the packet with the
                // node key instead of the address key. Either counts.
                let mut verification_keys = signature_email_keys.to_vec();
                verification_keys.push(VerificationKey::Private(node_key.clone()));
                match self
                    .pgp
                    .verify_detached(&packet, signature, &verification_keys)
                    .await
                {
                    Ok(outcome) => Some(build_author(&outcome, claimed, true)),
                    Err(error) => Some(Err(VerificationError::new(
                        claimed.map(str::to_owned),
                        format!("content key signature could not be checked: {error}"),
                    ))),
                }
            }
        };
        Ok((session_key, author))
    }

    /// Decrypt one revision with the node key. Verification uses the
    /// revision's signature-email keys, falling back to the node key.
    pub async fn decrypt_revision(
        &self,
        revision: &EncryptedRevision,
        node_key: &PrivateKey,
    ) -> UnparsedRevision {
        let claimed = revision.signature_email.as_deref();
        let mut attributes_raw = None;
        let content_author = match &revision.armored_extended_attributes {
            // Nothing to verify at the metadata level; carry the claim.
            None => Ok(claimed.map(str::to_owned)),
            Some(message) => {
                let email_keys = self.address_keys(claimed).await;
                let verification_keys = if email_keys.is_empty() {
                    vec![VerificationKey::Private(node_key.clone())]
                } else {
                    email_keys
                };
                match self
                    .pgp
                    .decrypt(
                        message,
                        std::slice::from_ref(node_key),
                        &verification_keys,
                        None,
                    )
                    .await
                {
                    Ok(decrypted) => {
                        let author = build_author(&decrypted.verification, claimed, true);
                        match String::from_utf8(decrypted.data) {
                            Ok(json) => attributes_raw = Some(json),
                            Err(_) => warn!(
                                uid = %revision.uid,
                                "revision extended attributes are not valid UTF-8"
                            ),
                        }
                        author
                    }
                    Err(error) => {
                        self.reported.report_decryption(
                            &self.telemetry,
                            revision.uid.as_str(),
                            MetricField::ExtendedAttributes,
                        );
                        Err(VerificationError::new(
                            claimed.map(str::to_owned),
                            format!("revision attributes could not be decrypted: {error}"),
                        ))
                    }
                }
            }
        };
        UnparsedRevision {
            uid: revision.uid.clone(),
            state: revision.state,
            creation_time: revision.creation_time,
            storage_size: revision.storage_size,
            content_author,
            attributes_raw,
            thumbnails: revision.thumbnails.clone(),
        }
    }

    /// Session key a node's name is encrypted with, recovered by
    /// decrypting the name under the parent key. Renames and moves reuse it
    /// so the name stays readable through the original key packet chain.
    pub async fn name_session_key(
        &self,
        encrypted_name: &ArmoredMessage,
        parent_key: &PrivateKey,
    ) -> Result<SessionKey> {
        let message = self
            .pgp
            .decrypt(encrypted_name, std::slice::from_ref(parent_key), &[], None)
            .await
            .map_err(|error| Error::decryption(format!("node name: {error}")))?;
        message
            .session_key
            .ok_or_else(|| Error::decryption("name session key unavailable"))
    }

    /// Produce the encrypted material and key set for a new folder.
    pub async fn create_folder(
        &self,
        name: &str,
        modification_time: Option<DateTime<Utc>>,
        parent_key: &PrivateKey,
        parent_hash_key: &HashKey,
    ) -> Result<(EncryptedFolderMaterial, DecryptedNodeKeys)> {
        let address = self
            .directory
            .own_address()
            .await
            .map_err(|error| Error::internal(format!("own address unavailable: {error}")))?;

        let passphrase_text = generate_passphrase();
        let generated = self
            .pgp
            .generate_key(&passphrase_text)
            .await
            .map_err(|error| Error::decryption(format!("node key generation: {error}")))?;

        let passphrase_session_key = self
            .pgp
            .generate_session_key()
            .await
            .map_err(|error| Error::decryption(format!("session key generation: {error}")))?;
        let armored_passphrase = self
            .pgp
            .encrypt(
                passphrase_text.as_bytes(),
                Some(&passphrase_session_key),
                std::slice::from_ref(parent_key),
                None,
            )
            .await
            .map_err(|error| Error::decryption(format!("passphrase encryption: {error}")))?;
        let armored_passphrase_signature = self
            .pgp
            .sign_detached(passphrase_text.as_bytes(), &address.key)
            .await
            .map_err(|error| Error::decryption(format!("passphrase signing: {error}")))?;

        let name_session_key = self
            .pgp
            .generate_session_key()
            .await
            .map_err(|error| Error::decryption(format!("session key generation: {error}")))?;
        let encrypted_name = self
            .pgp
            .encrypt(
                name.as_bytes(),
                Some(&name_session_key),
                std::slice::from_ref(parent_key),
                Some(&address.key),
            )
            .await
            .map_err(|error| Error::decryption(format!("name encryption: {error}")))?;
        let hash = crate::hash::name_hash(parent_hash_key, name)?;

        let mut hash_key_bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut hash_key_bytes);
        let armored_hash_key = self
            .pgp
            .encrypt(
                &hash_key_bytes,
                None,
                std::slice::from_ref(&generated.key),
                Some(&address.key),
            )
            .await
            .map_err(|error| Error::decryption(format!("hash key encryption: {error}")))?;

        let armored_extended_attributes =
            match velum_core::xattr::generate_folder_extended_attributes(modification_time) {
                None => None,
                Some(json) => Some(
                    self.pgp
                        .encrypt(
                            json.as_bytes(),
                            None,
                            std::slice::from_ref(&generated.key),
                            Some(&address.key),
                        )
                        .await
                        .map_err(|error| {
                            Error::decryption(format!("attributes encryption: {error}"))
                        })?,
                ),
            };

        let material = EncryptedFolderMaterial {
            armored_key: generated.armored,
            armored_passphrase,
            armored_passphrase_signature,
            signature_email: address.email.clone(),
            encrypted_name,
            name_signature_email: address.email,
            hash,
            armored_hash_key,
            armored_extended_attributes,
        };
        let keys = DecryptedNodeKeys {
            passphrase: Passphrase::new(passphrase_text),
            key: generated.key,
            passphrase_session_key,
            content_key_packet_session_key: None,
            hash_key: Some(HashKey::new(hash_key_bytes)),
        };
        Ok((material, keys))
    }

    /// Re-encrypt a node name in place for a rename.
    pub async fn encrypt_rename(
        &self,
        name: &str,
        name_session_key: &SessionKey,
        parent_key: &PrivateKey,
        parent_hash_key: Option<&HashKey>,
    ) -> Result<RenameMaterial> {
        let address = self
            .directory
            .own_address()
            .await
            .map_err(|error| Error::internal(format!("own address unavailable: {error}")))?;
        let encrypted_name = self
            .pgp
            .encrypt(
                name.as_bytes(),
                Some(name_session_key),
                std::slice::from_ref(parent_key),
                Some(&address.key),
            )
            .await
            .map_err(|error| Error::decryption(format!("name encryption: {error}")))?;
        let hash = parent_hash_key
            .map(|key| crate::hash::name_hash(key, name))
            .transpose()?;
        Ok(RenameMaterial {
            encrypted_name,
            name_signature_email: address.email,
            hash,
        })
    }

    /// Re-encrypt a node's name and passphrase for a move.
    ///
    /// Requires the target's hash key and a valid current name. Anonymous
    /// nodes get a fresh passphrase signature under the caller's address
    /// key; authored nodes keep their original signature.
    pub async fn encrypt_move(
        &self,
        name: Option<&str>,
        keys: &DecryptedNodeKeys,
        name_session_key: &SessionKey,
        new_parent_key: &PrivateKey,
        new_parent_hash_key: Option<&HashKey>,
        anonymous: bool,
    ) -> Result<MoveMaterial> {
        let name =
            name.ok_or_else(|| Error::validation("cannot move a node without a valid name"))?;
        let hash_key = new_parent_hash_key
            .ok_or_else(|| Error::validation("move target does not have a hash key"))?;
        let address = self
            .directory
            .own_address()
            .await
            .map_err(|error| Error::internal(format!("own address unavailable: {error}")))?;

        let armored_passphrase = self
            .pgp
            .encrypt(
                keys.passphrase.as_str().as_bytes(),
                Some(&keys.passphrase_session_key),
                std::slice::from_ref(new_parent_key),
                None,
            )
            .await
            .map_err(|error| Error::decryption(format!("passphrase encryption: {error}")))?;
        let (armored_passphrase_signature, signature_email) = if anonymous {
            let signature = self
                .pgp
                .sign_detached(keys.passphrase.as_str().as_bytes(), &address.key)
                .await
                .map_err(|error| Error::decryption(format!("passphrase signing: {error}")))?;
            (Some(signature), Some(address.email.clone()))
        } else {
            (None, None)
        };
        let encrypted_name = self
            .pgp
            .encrypt(
                name.as_bytes(),
                Some(name_session_key),
                std::slice::from_ref(new_parent_key),
                Some(&address.key),
            )
            .await
            .map_err(|error| Error::decryption(format!("name encryption: {error}")))?;
        let hash = crate::hash::name_hash(hash_key, name)?;
        Ok(MoveMaterial {
            armored_passphrase,
            armored_passphrase_signature,
            signature_email,
            encrypted_name,
            name_signature_email: address.email,
            hash,
        })
    }
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService").finish_non_exhaustive()
    }
}

fn generate_passphrase() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}
