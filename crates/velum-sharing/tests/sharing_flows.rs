//! Sharing flows over the in-memory backend

use serde_json::json;
use std::sync::Arc;
use velum_api::{ApiService, Method, ReceivedInvitation};
use velum_cache::{CryptoCache, NodeCache, SharingCache, NODE_CACHE_TAG_KEYS};
use velum_core::memory::{MemoryEntityStore, MemoryTelemetry};
use velum_core::{AbortSignal, ClientConfig, Error, InvitationUid, MemberRole, NodeUid};
use velum_crypto::CryptoService;
use velum_nodes::{MaybeNode, NodesAccess, NodesEvents};
use velum_sharing::{
    PublicLinkSettings, ShareNodeSettings, ShareUser, SharingAccess, SharingManagement,
    UnshareNodeSettings,
};
use velum_testkit::{
    session_key_packet, EncryptedFolderBuilder, FakeDirectory, FakeDriveServer, FakePgp,
    FakeShareService,
};

struct World {
    server: Arc<FakeDriveServer>,
    shares: Arc<FakeShareService>,
    node_cache: Arc<NodeCache>,
    sharing_cache: Arc<SharingCache>,
    access: SharingAccess,
    management: SharingManagement,
    abort: AbortSignal,
}

fn world() -> World {
    let server = Arc::new(FakeDriveServer::new());
    let api = ApiService::new(server.clone());
    let store = Arc::new(MemoryEntityStore::new(NODE_CACHE_TAG_KEYS));
    let node_cache = Arc::new(NodeCache::new(store));
    let crypto_cache = Arc::new(CryptoCache::new());
    let sharing_cache = Arc::new(SharingCache::new());

    let directory = FakeDirectory::new("me@example.com");
    directory.register("alice@example.com");
    directory.register("bob@example.com");
    let directory = Arc::new(directory);
    let pgp = Arc::new(FakePgp::new());
    let crypto = Arc::new(CryptoService::new(
        pgp.clone(),
        directory.clone(),
        Arc::new(MemoryTelemetry::new()),
    ));
    let shares = Arc::new(FakeShareService::new());
    shares.insert_share("s1", "s1-key");

    let nodes = Arc::new(NodesAccess::new(
        api.clone(),
        node_cache.clone(),
        crypto_cache.clone(),
        crypto,
        shares.clone(),
        ClientConfig::default(),
    ));
    let events = Arc::new(NodesEvents::new(
        node_cache.clone(),
        crypto_cache,
        sharing_cache.clone(),
    ));
    let access = SharingAccess::new(
        api.clone(),
        nodes.clone(),
        sharing_cache.clone(),
        pgp.clone(),
        directory.clone(),
    );
    let management = SharingManagement::new(
        api,
        nodes,
        shares.clone(),
        pgp,
        directory,
        sharing_cache.clone(),
        events,
        ClientConfig::default(),
    );
    World {
        server,
        shares,
        node_cache,
        sharing_cache,
        access,
        management,
        abort: AbortSignal::new(),
    }
}

/// Seed a shared root node under share `s1`.
fn seed_shared_root(world: &World) -> NodeUid {
    let mut root = EncryptedFolderBuilder::new("vol~shared");
    root.parent_uid = None;
    root.share_id = Some("s1".to_owned());
    root.parent_key_id = "s1-key".to_owned();
    root.node_key_id = "shared-key".to_owned();
    root.name = "shared".to_owned();
    world.server.insert_node(root.build());
    NodeUid::from_raw("vol~shared")
}

/// Seed an unshared root node reachable through share `s1`'s key.
fn seed_plain_root(world: &World) -> NodeUid {
    // Reuses the share key as the crypto parent; the record itself carries
    // a share id only when shared.
    let mut root = EncryptedFolderBuilder::new("vol~plain");
    root.parent_uid = None;
    root.share_id = Some("s1".to_owned());
    root.parent_key_id = "s1-key".to_owned();
    root.node_key_id = "plain-key".to_owned();
    world.server.insert_node(root.build());
    NodeUid::from_raw("vol~plain")
}

#[tokio::test]
async fn sharing_info_is_empty_without_a_share() {
    let world = world();
    // A child node with a parent and no share reference.
    let root = seed_shared_root(&world);
    let mut child = EncryptedFolderBuilder::new("vol~child");
    child.parent_uid = Some(root.as_str().to_owned());
    child.parent_key_id = "shared-key".to_owned();
    child.node_key_id = "child-key".to_owned();
    world.server.insert_node(child.build());

    let info = world
        .management
        .get_sharing_info(&NodeUid::from_raw("vol~child"), &world.abort)
        .await
        .unwrap();
    assert_eq!(info, velum_core::sharing::SharingInfo::default());
}

#[tokio::test]
async fn past_expiration_is_rejected_before_any_network_io() {
    let world = world();
    let uid = NodeUid::from_raw("vol~whatever");
    let err = world
        .management
        .share_node(
            &uid,
            ShareNodeSettings {
                users: Vec::new(),
                public_link: Some(PublicLinkSettings {
                    role: MemberRole::Viewer,
                    custom_password: None,
                    expiration_time: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
                }),
            },
            &world.abort,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(world.server.requests().is_empty());
}

#[tokio::test]
async fn sharing_a_node_invites_new_internal_users() {
    let world = world();
    let uid = seed_shared_root(&world);
    world.server.set_route(
        "drive/v1/shares/s1/invitations",
        json!({
            "Code": 1001,
            "Invitations": [],
            "Invitation": {
                "Uid": "s1~inv1",
                "InviteeEmail": "bob@example.com",
                "InviterEmail": "me@example.com",
                "Role": "Editor",
                "InvitationTime": 1_700_000_000,
                "KeyPacket": "cGFja2V0"
            }
        }),
    );

    world
        .management
        .share_node(
            &uid,
            ShareNodeSettings {
                users: vec![ShareUser {
                    email: "bob@example.com".to_owned(),
                    role: MemberRole::Editor,
                }],
                public_link: None,
            },
            &world.abort,
        )
        .await
        .unwrap();

    let create = world
        .server
        .requests()
        .into_iter()
        .find(|(method, path, _)| {
            *method == Method::Post && path.ends_with("shares/s1/invitations")
        })
        .expect("invitation was created");
    let body = create.2.unwrap();
    assert_eq!(body["InviteeEmail"], "bob@example.com");
    assert_eq!(body["Role"], "Editor");
    assert!(body["KeyPacket"].is_string());
    assert!(body["KeyPacketSignature"].is_string());
}

#[tokio::test]
async fn sharing_updates_existing_invitations_in_place() {
    let world = world();
    let uid = seed_shared_root(&world);
    world.server.set_route(
        "drive/v1/shares/s1/invitations",
        json!({
            "Code": 1001,
            "Invitations": [{
                "Uid": "s1~inv1",
                "InviteeEmail": "bob@example.com",
                "InviterEmail": "me@example.com",
                "Role": "Viewer",
                "InvitationTime": 1_700_000_000,
                "KeyPacket": "cGFja2V0"
            }]
        }),
    );

    world
        .management
        .share_node(
            &uid,
            ShareNodeSettings {
                users: vec![ShareUser {
                    email: "bob@example.com".to_owned(),
                    role: MemberRole::Editor,
                }],
                public_link: None,
            },
            &world.abort,
        )
        .await
        .unwrap();

    let requests = world.server.requests();
    assert!(requests.iter().any(|(method, path, _)| {
        *method == Method::Put && path.ends_with("shares/s1/invitations/inv1")
    }));
    assert!(!requests.iter().any(|(method, path, _)| {
        *method == Method::Post && path.ends_with("shares/s1/invitations")
    }));
}

#[tokio::test]
async fn creating_a_public_link_sends_an_encrypted_generated_password() {
    let world = world();
    let uid = seed_shared_root(&world);
    world.server.set_route(
        "drive/v1/shares/s1/urls",
        json!({
            "Code": 1001,
            "PublicLinks": [],
            "PublicLink": {
                "Uid": "s1~url1",
                "Token": "token1",
                "CreatorEmail": "me@example.com",
                "Role": "Viewer",
                "CreationTime": 1_700_000_000,
                "PasswordType": "Generated",
                "EncryptedUrlPassword": null
            }
        }),
    );

    world
        .management
        .share_node(
            &uid,
            ShareNodeSettings {
                users: Vec::new(),
                public_link: Some(PublicLinkSettings {
                    role: MemberRole::Viewer,
                    custom_password: None,
                    expiration_time: None,
                }),
            },
            &world.abort,
        )
        .await
        .unwrap();

    let create = world
        .server
        .requests()
        .into_iter()
        .find(|(method, path, _)| *method == Method::Post && path.ends_with("shares/s1/urls"))
        .expect("public link was created");
    let body = create.2.unwrap();
    assert_eq!(body["PasswordType"], "Generated");
    assert!(body["EncryptedUrlPassword"].is_string());
}

#[tokio::test]
async fn unsharing_without_settings_deletes_the_share() {
    let world = world();
    let uid = seed_shared_root(&world);

    world
        .management
        .unshare_node(&uid, None, &world.abort)
        .await
        .unwrap();

    assert_eq!(world.shares.deleted().len(), 1);
    let cached = world.node_cache.get_node(&uid).await.unwrap();
    assert!(cached.share_id.is_none());
    assert!(!cached.is_shared);
}

#[tokio::test]
async fn unsharing_the_last_collaborator_deletes_the_share() {
    let world = world();
    let uid = seed_shared_root(&world);
    world.server.set_route(
        "drive/v1/shares/s1/members",
        json!({
            "Code": 1001,
            "Members": [{
                "Uid": "s1~m1",
                "Email": "bob@example.com",
                "InviterEmail": "me@example.com",
                "Role": "Viewer",
                "InvitationTime": 1_700_000_000
            }]
        }),
    );

    world
        .management
        .unshare_node(
            &uid,
            Some(UnshareNodeSettings {
                users: vec!["bob@example.com".to_owned()],
                remove_public_link: false,
            }),
            &world.abort,
        )
        .await
        .unwrap();

    assert!(world.server.requests().iter().any(|(method, path, _)| {
        *method == Method::Delete && path.ends_with("shares/s1/members/m1")
    }));
    assert_eq!(world.shares.deleted().len(), 1);
}

#[tokio::test]
async fn resend_checks_the_invitation_belongs_to_the_node() {
    let world = world();
    let uid = seed_shared_root(&world);

    let err = world
        .management
        .resend_invitation_email(&uid, &InvitationUid::from_raw("other~inv"), &world.abort)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn accepting_an_invitation_signs_the_session_key() {
    let world = world();
    let invitation = ReceivedInvitation {
        uid: InvitationUid::from_raw("s1~inv1"),
        node_uid: NodeUid::from_raw("vol~shared"),
        inviter_email: "alice@example.com".to_owned(),
        invitee_email: "me@example.com".to_owned(),
        key_packet: session_key_packet(&["me@example.com"], b"share-session"),
        role: MemberRole::Editor,
        invitation_time: velum_testkit::fixture_time(),
    };

    world
        .management
        .accept_invitation(&invitation, &world.abort)
        .await
        .unwrap();

    let accept = world
        .server
        .requests()
        .into_iter()
        .find(|(_, path, _)| path.ends_with("invitations/inv1/accept"))
        .expect("acceptance was sent");
    assert!(accept.2.unwrap()["SessionKeySignature"].is_string());
    // The shared-with-me listing is refetched next time.
    assert!(world.sharing_cache.shared_with_me().is_none());
}

#[tokio::test]
async fn shared_by_me_listing_populates_the_cache_after_completion() {
    let world = world();
    let uid = seed_plain_root(&world);
    world.server.set_route(
        "drive/v1/sharedbyme",
        json!({
            "Code": 1001,
            "Items": [{ "NodeUid": uid.as_str(), "ShareId": "s1" }]
        }),
    );

    let mut iter = world.access.iterate_shared_by_me_nodes(world.abort.clone());
    let mut yielded = 0;
    while let Some(item) = iter.next().await {
        match item.unwrap() {
            MaybeNode::Node(node) => {
                assert_eq!(node.uid, uid);
                yielded += 1;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    drop(iter);
    assert_eq!(yielded, 1);
    assert_eq!(world.sharing_cache.shared_by_me().unwrap().len(), 1);

    // Second pass is served from the cache: no new listing request.
    let listing_count = |world: &World| {
        world
            .server
            .requests()
            .iter()
            .filter(|(_, path, _)| path.starts_with("drive/v1/sharedbyme"))
            .count()
    };
    let before = listing_count(&world);
    let mut iter = world.access.iterate_shared_by_me_nodes(world.abort.clone());
    while let Some(item) = iter.next().await {
        item.unwrap();
    }
    drop(iter);
    assert_eq!(listing_count(&world), before);
}
