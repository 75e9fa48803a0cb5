//! Mutation crypto: folder creation, rename, move

use std::sync::Arc;
use velum_core::memory::MemoryTelemetry;
use velum_core::{DecryptedNodeKeys, Error, HashKey, Passphrase, SessionKey};
use velum_crypto::{name_hash, CryptoService};
use velum_testkit::{private_key, FakeDirectory, FakePgp};

fn service() -> CryptoService {
    CryptoService::new(
        Arc::new(FakePgp::new()),
        Arc::new(FakeDirectory::new("me@example.com")),
        Arc::new(MemoryTelemetry::new()),
    )
}

fn node_keys() -> DecryptedNodeKeys {
    DecryptedNodeKeys {
        passphrase: Passphrase::new("pp"),
        key: private_key("node-key"),
        passphrase_session_key: SessionKey::new(b"pp-session".to_vec(), None),
        content_key_packet_session_key: None,
        hash_key: None,
    }
}

#[tokio::test]
async fn create_folder_produces_material_and_keys() {
    let service = service();
    let parent_hash_key = HashKey::new(vec![9; 32]);

    let (material, keys) = service
        .create_folder(
            "Documents",
            None,
            &private_key("parent-key"),
            &parent_hash_key,
        )
        .await
        .unwrap();

    assert_eq!(material.signature_email, "me@example.com");
    assert_eq!(material.name_signature_email, "me@example.com");
    assert_eq!(
        material.hash,
        name_hash(&parent_hash_key, "Documents").unwrap()
    );
    assert!(material.armored_extended_attributes.is_none());
    assert_eq!(keys.passphrase.as_str().len(), 44); // 32 random bytes, base64
    assert!(keys.hash_key.is_some());
    assert!(keys.content_key_packet_session_key.is_none());
}

#[tokio::test]
async fn create_folder_encrypts_modification_time() {
    let service = service();
    let (material, _keys) = service
        .create_folder(
            "Photos",
            Some(velum_testkit::fixture_time()),
            &private_key("parent-key"),
            &HashKey::new(vec![9; 32]),
        )
        .await
        .unwrap();
    assert!(material.armored_extended_attributes.is_some());
}

#[tokio::test]
async fn rename_recomputes_hash_only_with_a_hash_key() {
    let service = service();
    let session = SessionKey::new(b"name-session".to_vec(), None);
    let hash_key = HashKey::new(vec![1; 32]);

    let with_key = service
        .encrypt_rename("new name", &session, &private_key("parent-key"), Some(&hash_key))
        .await
        .unwrap();
    assert_eq!(
        with_key.hash.as_deref(),
        Some(name_hash(&hash_key, "new name").unwrap().as_str())
    );

    let without_key = service
        .encrypt_rename("new name", &session, &private_key("parent-key"), None)
        .await
        .unwrap();
    assert!(without_key.hash.is_none());
}

#[tokio::test]
async fn anonymous_move_signs_the_passphrase() {
    let service = service();
    let material = service
        .encrypt_move(
            Some("file.txt"),
            &node_keys(),
            &SessionKey::new(b"name-session".to_vec(), None),
            &private_key("new-parent-key"),
            Some(&HashKey::new(vec![2; 32])),
            true,
        )
        .await
        .unwrap();
    assert!(material.armored_passphrase_signature.is_some());
    assert_eq!(material.signature_email.as_deref(), Some("me@example.com"));
}

#[tokio::test]
async fn authored_move_omits_signature_fields() {
    let service = service();
    let material = service
        .encrypt_move(
            Some("file.txt"),
            &node_keys(),
            &SessionKey::new(b"name-session".to_vec(), None),
            &private_key("new-parent-key"),
            Some(&HashKey::new(vec![2; 32])),
            false,
        )
        .await
        .unwrap();
    assert!(material.armored_passphrase_signature.is_none());
    assert!(material.signature_email.is_none());
}

#[tokio::test]
async fn move_requires_a_valid_name_and_a_hash_key() {
    let service = service();
    let session = SessionKey::new(b"s".to_vec(), None);

    let no_name = service
        .encrypt_move(
            None,
            &node_keys(),
            &session,
            &private_key("p"),
            Some(&HashKey::new(vec![2; 32])),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(no_name, Error::Validation { .. }));

    let no_hash_key = service
        .encrypt_move(
            Some("ok"),
            &node_keys(),
            &session,
            &private_key("p"),
            None,
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(no_hash_key, Error::Validation { .. }));
}
