//! End-to-end behavior of the node pipeline over the in-memory backend

use std::sync::Arc;
use velum_api::ApiService;
use velum_cache::{CryptoCache, NodeCache, SharingCache, NODE_CACHE_TAG_KEYS};
use velum_core::memory::{MemoryEntityStore, MemoryTelemetry};
use velum_core::{AbortSignal, ClientConfig, Error, NodeUid, VolumeId};
use velum_crypto::CryptoService;
use velum_nodes::{
    MaybeNode, NodeEvent, NodesAccess, NodesEvents, NodesManagement, RenameOptions,
    SubscriptionScope,
};
use velum_testkit::{
    EncryptedFileBuilder, EncryptedFolderBuilder, FakeDirectory, FakeDriveServer, FakePgp,
    FakeShareService,
};

struct World {
    server: Arc<FakeDriveServer>,
    access: Arc<NodesAccess>,
    management: NodesManagement,
    events: Arc<NodesEvents>,
    node_cache: Arc<NodeCache>,
    crypto_cache: Arc<CryptoCache>,
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
    let crypto = Arc::new(CryptoService::new(
        Arc::new(FakePgp::new()),
        Arc::new(directory),
        Arc::new(MemoryTelemetry::new()),
    ));
    let shares = Arc::new(FakeShareService::new());
    shares.insert_share("share1", "share-key");

    let access = Arc::new(NodesAccess::new(
        api.clone(),
        node_cache.clone(),
        crypto_cache.clone(),
        crypto.clone(),
        shares.clone(),
        ClientConfig::default(),
    ));
    let events = Arc::new(NodesEvents::new(
        node_cache.clone(),
        crypto_cache.clone(),
        sharing_cache,
    ));
    let management = NodesManagement::new(
        api,
        access.clone(),
        crypto,
        crypto_cache.clone(),
        shares,
        events.clone(),
    );
    World {
        server,
        access,
        management,
        events,
        node_cache,
        crypto_cache,
        abort: AbortSignal::new(),
    }
}

/// Seed a root (under share1), a folder under it, and `files` files under
/// the folder. Returns the folder uid.
fn seed_tree(world: &World, files: usize) -> NodeUid {
    let mut root = EncryptedFolderBuilder::new("vol~root");
    root.parent_uid = None;
    root.share_id = Some("share1".to_owned());
    root.parent_key_id = "share-key".to_owned();
    root.node_key_id = "root-key".to_owned();
    root.name = "root".to_owned();
    world.server.insert_node(root.build());

    let mut folder = EncryptedFolderBuilder::new("vol~folder");
    folder.parent_uid = Some("vol~root".to_owned());
    folder.parent_key_id = "root-key".to_owned();
    folder.node_key_id = "folder-key".to_owned();
    world.server.insert_node(folder.build());

    for i in 0..files {
        let mut file = EncryptedFileBuilder::new(&format!("vol~file-{i}"));
        file.parent_uid = Some("vol~folder".to_owned());
        file.parent_key_id = "folder-key".to_owned();
        file.node_key_id = format!("file-key-{i}");
        file.name = format!("file-{i}.txt");
        world.server.insert_node(file.build());
    }
    NodeUid::from_raw("vol~folder")
}

#[tokio::test]
async fn get_node_resolves_ancestors_recursively() {
    let world = world();
    seed_tree(&world, 1);
    let uid = NodeUid::from_raw("vol~file-0");

    let node = world.access.get_node(&uid, &world.abort).await.unwrap();

    assert_eq!(node.name.as_deref(), Ok("file-0.txt"));
    assert_eq!(node.key_author, Ok(Some("alice@example.com".to_owned())));
    // The whole ancestor chain was decrypted and cached on the way.
    assert!(world.crypto_cache.get(&NodeUid::from_raw("vol~root")).is_some());
    assert!(world.crypto_cache.get(&NodeUid::from_raw("vol~folder")).is_some());
    assert!(world
        .node_cache
        .get_node(&NodeUid::from_raw("vol~root"))
        .await
        .is_some());
}

#[tokio::test]
async fn cached_fresh_nodes_are_not_refetched() {
    let world = world();
    seed_tree(&world, 1);
    let uid = NodeUid::from_raw("vol~file-0");

    world.access.get_node(&uid, &world.abort).await.unwrap();
    let fetches = world.server.fetch_calls();
    world.access.get_node(&uid, &world.abort).await.unwrap();
    assert_eq!(world.server.fetch_calls(), fetches);
}

#[tokio::test]
async fn children_iteration_sets_the_completeness_bit() {
    let world = world();
    let folder = seed_tree(&world, 5);

    let mut names = Vec::new();
    let mut iter = world
        .access
        .iterate_folder_children(&folder, world.abort.clone());
    while let Some(item) = iter.next().await {
        match item.unwrap() {
            MaybeNode::Node(node) => names.push(node.name.unwrap()),
            other => panic!("unexpected item {other:?}"),
        }
    }
    drop(iter);
    assert_eq!(names.len(), 5);
    assert!(world.node_cache.is_folder_children_loaded(&folder).await);

    // A second iteration is served from the cache.
    let listing_requests = |world: &World| {
        world
            .server
            .requests()
            .into_iter()
            .filter(|(_, path, _)| path.contains("/children"))
            .count()
    };
    let before = listing_requests(&world);
    let mut iter = world
        .access
        .iterate_folder_children(&folder, world.abort.clone());
    let mut second = 0;
    while let Some(item) = iter.next().await {
        item.unwrap();
        second += 1;
    }
    drop(iter);
    assert_eq!(second, 5);
    assert_eq!(listing_requests(&world), before);
}

#[tokio::test]
async fn batched_loads_chunk_at_batch_size() {
    let world = world();
    seed_tree(&world, 45);
    // Warm the ancestor chain so only the listed files need fetching.
    world
        .access
        .get_node(&NodeUid::from_raw("vol~folder"), &world.abort)
        .await
        .unwrap();
    let baseline = world.server.fetch_calls();

    let uids: Vec<NodeUid> = (0..15)
        .map(|i| NodeUid::from_raw(format!("vol~file-{i}")))
        .collect();
    let mut iter = world.access.iterate_nodes(uids, world.abort.clone());
    while let Some(item) = iter.next().await {
        item.unwrap();
    }
    drop(iter);
    assert_eq!(world.server.fetch_calls() - baseline, 1);

    let uids: Vec<NodeUid> = (15..45)
        .map(|i| NodeUid::from_raw(format!("vol~file-{i}")))
        .collect();
    let baseline = world.server.fetch_calls();
    let mut iter = world.access.iterate_nodes(uids, world.abort.clone());
    while let Some(item) = iter.next().await {
        item.unwrap();
    }
    assert_eq!(world.server.fetch_calls() - baseline, 1);
}

#[tokio::test]
async fn unknown_uids_are_yielded_as_missing() {
    let world = world();
    seed_tree(&world, 1);

    let uids = vec![
        NodeUid::from_raw("vol~file-0"),
        NodeUid::from_raw("vol~ghost"),
    ];
    let mut iter = world.access.iterate_nodes(uids, world.abort.clone());
    let mut nodes = 0;
    let mut missing = Vec::new();
    while let Some(item) = iter.next().await {
        match item.unwrap() {
            MaybeNode::Node(_) => nodes += 1,
            MaybeNode::Missing(uid) => missing.push(uid.as_str().to_owned()),
            MaybeNode::Failed { uid, error } => panic!("failed {uid}: {error}"),
        }
    }
    assert_eq!(nodes, 1);
    assert_eq!(missing, vec!["vol~ghost"]);
}

#[tokio::test]
async fn undecryptable_ancestor_degrades_the_child() {
    let world = world();
    seed_tree(&world, 0);

    // A folder whose passphrase is encrypted to a key nobody holds.
    let mut bad = EncryptedFolderBuilder::new("vol~bad");
    bad.parent_uid = Some("vol~root".to_owned());
    bad.parent_key_id = "unknown-key".to_owned();
    bad.node_key_id = "bad-key".to_owned();
    world.server.insert_node(bad.build());

    let mut child = EncryptedFileBuilder::new("vol~under-bad");
    child.parent_uid = Some("vol~bad".to_owned());
    child.parent_key_id = "bad-key".to_owned();
    world.server.insert_node(child.build());

    let node = world
        .access
        .get_node(&NodeUid::from_raw("vol~under-bad"), &world.abort)
        .await
        .unwrap();

    assert!(node.name.is_err());
    let key_error = node.key_author.unwrap_err();
    assert_eq!(
        key_error.claimed_author.as_deref(),
        Some("alice@example.com")
    );
    assert_eq!(node.errors.len(), 1);
    assert_eq!(node.tree_event_scope_id.as_str(), "vol");
}

#[tokio::test]
async fn create_folder_caches_keys_and_invalidates_the_parent() {
    let world = world();
    let folder = seed_tree(&world, 0);
    // Complete a listing first so the bit is set.
    let mut iter = world
        .access
        .iterate_folder_children(&folder, world.abort.clone());
    while let Some(item) = iter.next().await {
        item.unwrap();
    }
    drop(iter);
    assert!(world.node_cache.is_folder_children_loaded(&folder).await);

    let created = world
        .management
        .create_folder(&folder, "New Folder", None, &world.abort)
        .await
        .unwrap();

    assert_eq!(created.name.as_deref(), Ok("New Folder"));
    assert_eq!(created.parent_uid.as_ref(), Some(&folder));
    assert!(world.crypto_cache.get(&created.uid).is_some());
    assert!(world.node_cache.get_node(&created.uid).await.is_some());
    assert!(!world.node_cache.is_folder_children_loaded(&folder).await);
}

#[tokio::test]
async fn create_folder_rejects_bad_names_before_any_network_io() {
    let world = world();
    let folder = seed_tree(&world, 0);
    let requests_before = world.server.requests().len();
    let err = world
        .management
        .create_folder(&folder, "bad/name", None, &world.abort)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert_eq!(world.server.requests().len(), requests_before);
}

#[tokio::test]
async fn rename_updates_cache_after_api_confirmation() {
    let world = world();
    seed_tree(&world, 1);
    let uid = NodeUid::from_raw("vol~file-0");
    world.access.get_node(&uid, &world.abort).await.unwrap();

    let renamed = world
        .management
        .rename_node(&uid, "renamed.txt", RenameOptions::default(), &world.abort)
        .await
        .unwrap();

    assert_eq!(renamed.name.as_deref(), Ok("renamed.txt"));
    let cached = world.node_cache.get_node(&uid).await.unwrap();
    assert_eq!(cached.name.as_deref(), Ok("renamed.txt"));
    assert!(world
        .server
        .requests()
        .iter()
        .any(|(_, path, _)| path.ends_with("/rename")));
}

#[tokio::test]
async fn rename_rejects_roots_unless_allowed() {
    let world = world();
    seed_tree(&world, 0);
    let root = NodeUid::from_raw("vol~root");
    let err = world
        .management
        .rename_node(&root, "new root", RenameOptions::default(), &world.abort)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    // Explicitly allowed, the rename goes through without a hash.
    world
        .management
        .rename_node(
            &root,
            "new root",
            RenameOptions {
                allow_rename_root_node: true,
            },
            &world.abort,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn authored_move_omits_signature_fields_on_the_wire() {
    let world = world();
    seed_tree(&world, 1);
    let mut second = EncryptedFolderBuilder::new("vol~folder2");
    second.parent_uid = Some("vol~root".to_owned());
    second.parent_key_id = "root-key".to_owned();
    second.node_key_id = "folder2-key".to_owned();
    second.name = "folder2".to_owned();
    world.server.insert_node(second.build());

    let uid = NodeUid::from_raw("vol~file-0");
    let target = NodeUid::from_raw("vol~folder2");
    let moved = world
        .management
        .move_node(&uid, &target, &world.abort)
        .await
        .unwrap();

    assert_eq!(moved.parent_uid.as_ref(), Some(&target));
    let (_, _, body) = world
        .server
        .requests()
        .into_iter()
        .find(|(_, path, _)| path.ends_with("/move"))
        .unwrap();
    let body = body.unwrap();
    let object = body.as_object().unwrap();
    assert!(!object.contains_key("SignatureEmail"));
    assert!(!object.contains_key("ArmoredPassphraseSignature"));
    assert_eq!(object["ParentUid"], "vol~folder2");
    // Target folder listing is no longer complete.
    assert!(!world.node_cache.is_folder_children_loaded(&target).await);
}

#[tokio::test]
async fn trash_progress_iterator_updates_cache_and_subscribers() {
    let world = world();
    seed_tree(&world, 2);
    let uids = vec![
        NodeUid::from_raw("vol~file-0"),
        NodeUid::from_raw("vol~file-1"),
    ];
    for uid in &uids {
        world.access.get_node(uid, &world.abort).await.unwrap();
    }

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    world.events.subscribe(SubscriptionScope::Trash, move |update| {
        seen_clone.lock().push(update);
    });

    let mut iter = world
        .management
        .trash_nodes(uids.clone(), world.abort.clone());
    let mut ok = 0;
    while let Some(outcome) = iter.next().await {
        assert!(outcome.unwrap().result.is_ok());
        ok += 1;
    }
    assert_eq!(ok, 2);
    for uid in &uids {
        assert!(world
            .node_cache
            .get_node(uid)
            .await
            .unwrap()
            .is_trashed());
    }
    assert_eq!(seen.lock().len(), 2);
}

#[tokio::test]
async fn tree_refresh_marks_the_volume_stale() {
    let world = world();
    seed_tree(&world, 1);
    let uid = NodeUid::from_raw("vol~file-0");
    world.access.get_node(&uid, &world.abort).await.unwrap();

    world
        .events
        .apply_event(NodeEvent::TreeRefresh {
            volume_id: VolumeId::new("vol"),
        })
        .await;

    assert!(world.node_cache.get_node(&uid).await.unwrap().is_stale);
    let fetches = world.server.fetch_calls();
    let node = world.access.get_node(&uid, &world.abort).await.unwrap();
    assert!(!node.is_stale);
    assert!(world.server.fetch_calls() > fetches);
}

#[tokio::test]
async fn node_deleted_event_drops_node_and_keys()
{
    let world = world();
    seed_tree(&world, 1);
    let uid = NodeUid::from_raw("vol~file-0");
    world.access.get_node(&uid, &world.abort).await.unwrap();
    assert!(world.crypto_cache.get(&uid).is_some());

    world
        .events
        .apply_event(NodeEvent::NodeDeleted {
            node_uid: uid.clone(),
        })
        .await;

    assert!(world.node_cache.get_node(&uid).await.is_none());
    assert!(world.crypto_cache.get(&uid).is_none());
}

#[tokio::test]
async fn aborted_children_iteration_raises_abort() {
    let world = world();
    let folder = seed_tree(&world, 3);
    let abort = AbortSignal::new();
    let mut iter = world.access.iterate_folder_children(&folder, abort.clone());
    let first = iter.next().await.unwrap().unwrap();
    assert!(matches!(first, MaybeNode::Node(_)));
    abort.abort();
    let err = iter.next().await.unwrap().unwrap_err();
    assert!(err.is_abort());
    // Aborted iterations must not mark the listing complete.
    assert!(!world.node_cache.is_folder_children_loaded(&folder).await);
}
