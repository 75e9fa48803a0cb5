//! Decrypt-node behavior of the crypto service

use std::sync::Arc;
use velum_core::effects::telemetry::MetricEvent;
use velum_core::memory::MemoryTelemetry;
use velum_crypto::CryptoService;
use velum_testkit::{private_key, EncryptedFileBuilder, EncryptedFolderBuilder, FakeDirectory, FakePgp};

fn service() -> (CryptoService, Arc<MemoryTelemetry>) {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let directory = FakeDirectory::new("me@example.com");
    directory.register("alice@example.com");
    (
        CryptoService::new(
            Arc::new(FakePgp::new()),
            Arc::new(directory),
            telemetry.clone(),
        ),
        telemetry,
    )
}

#[tokio::test]
async fn decrypts_an_authored_folder() {
    let (service, telemetry) = service();
    let encrypted = EncryptedFolderBuilder::new("vol~folder").build();

    let bundle = service
        .decrypt_node(&encrypted, &private_key("parent-key"))
        .await;

    assert_eq!(bundle.node.name.as_deref(), Ok("folder"));
    assert_eq!(
        bundle.node.key_author,
        Ok(Some("alice@example.com".to_owned()))
    );
    assert_eq!(
        bundle.node.name_author,
        Ok(Some("alice@example.com".to_owned()))
    );
    assert!(bundle.node.errors.is_empty());

    let keys = bundle.keys.unwrap();
    assert_eq!(keys.key.key_id(), "node-key");
    assert_eq!(keys.passphrase.as_str(), "node-passphrase");
    assert_eq!(keys.hash_key.unwrap().as_bytes(), &[7u8; 32]);
    assert!(telemetry.events().is_empty());
}

#[tokio::test]
async fn decrypts_a_file_with_revision_and_content_key() {
    let (service, _telemetry) = service();
    let mut builder = EncryptedFileBuilder::new("vol~file");
    builder.revision_attributes = Some(r#"{"Common":{"Size":42}}"#.to_owned());
    let encrypted = builder.build();

    let bundle = service
        .decrypt_node(&encrypted, &private_key("parent-key"))
        .await;

    assert_eq!(bundle.node.name.as_deref(), Ok("file.txt"));
    let revision = bundle.node.active_revision.unwrap();
    assert_eq!(
        revision.attributes_raw.as_deref(),
        Some(r#"{"Common":{"Size":42}}"#)
    );
    assert_eq!(
        revision.content_author,
        Ok(Some("alice@example.com".to_owned()))
    );

    let keys = bundle.keys.unwrap();
    assert_eq!(
        keys.content_key_packet_session_key.unwrap().data(),
        b"content-session"
    );
}

#[tokio::test]
async fn undecryptable_key_degrades_the_node_but_keeps_the_name() {
    let (service, telemetry) = service();
    let mut builder = EncryptedFolderBuilder::new("vol~folder");
    // Passphrase encrypted to a key the caller does not hold.
    builder.parent_key_id = "somebody-else".to_owned();
    let mut encrypted = builder.build();
    // The name, however, is still encrypted to the caller's parent key.
    encrypted.encrypted_name = velum_testkit::encrypt_to(
        &["parent-key"],
        b"still readable",
        Some("alice@example.com"),
        b"name-session",
    );

    let bundle = service
        .decrypt_node(&encrypted, &private_key("parent-key"))
        .await;

    assert!(bundle.keys.is_none());
    assert_eq!(bundle.node.name.as_deref(), Ok("still readable"));
    let key_error = bundle.node.key_author.unwrap_err();
    assert_eq!(
        key_error.claimed_author.as_deref(),
        Some("alice@example.com")
    );
    assert_eq!(bundle.node.errors.len(), 1);

    // Decrypting the same node again must not emit a second metric.
    service
        .decrypt_node(&encrypted, &private_key("parent-key"))
        .await;
    let decryption_events: Vec<_> = telemetry
        .events()
        .into_iter()
        .filter(|e| matches!(e, MetricEvent::DecryptionError { .. }))
        .collect();
    assert_eq!(decryption_events.len(), 1);
}

#[tokio::test]
async fn bad_hash_key_signature_downgrades_the_key_author() {
    let (service, telemetry) = service();
    let mut builder = EncryptedFolderBuilder::new("vol~folder");
    builder.hash_key_signer = Some("mallory@example.com".to_owned());
    let encrypted = builder.build();

    let bundle = service
        .decrypt_node(&encrypted, &private_key("parent-key"))
        .await;

    // The node key itself verified fine, but the hash key did not; the
    // reported author is the worst of the two.
    assert!(bundle.node.key_author.is_err());
    assert!(bundle.node.name_author.is_ok());
    // Keys are still produced; a verification failure never blocks use.
    assert!(bundle.keys.unwrap().hash_key.is_some());
    assert!(telemetry
        .events()
        .iter()
        .any(|e| matches!(e, MetricEvent::VerificationError { .. })));
}

#[tokio::test]
async fn anonymous_node_has_anonymous_ok_author() {
    let (service, _telemetry) = service();
    let mut builder = EncryptedFileBuilder::new("vol~file");
    builder.signature_email = None;
    builder.sign_content_key = false;
    let encrypted = builder.build();

    let bundle = service
        .decrypt_node(&encrypted, &private_key("parent-key"))
        .await;

    assert_eq!(bundle.node.key_author, Ok(None));
    assert_eq!(bundle.node.name_author, Ok(None));
}

#[tokio::test]
async fn folder_attributes_are_decrypted() {
    let (service, _telemetry) = service();
    let mut builder = EncryptedFolderBuilder::new("vol~folder");
    builder.extended_attributes =
        Some(r#"{"Common":{"ModificationTime":"2024-06-01T12:00:00.000Z"}}"#.to_owned());
    let encrypted = builder.build();

    let bundle = service
        .decrypt_node(&encrypted, &private_key("parent-key"))
        .await;
    assert!(bundle
        .node
        .folder_attributes_raw
        .as_deref()
        .unwrap()
        .contains("ModificationTime"));
}
