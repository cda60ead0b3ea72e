//! End-to-end tests for [`tg_doc_store::DocClientStore`] on a fresh in-memory cluster.

use std::time::Duration;

use tg_doc_store::store::DEFAULT_SESSION_KEY;
use tg_doc_store::{
    Credentials, DocClientStore, PeerRecord, PeerStore, SessionRecord, SessionStore,
    StateRecord, StorageConfig, Storages, UpdateStateStore, UserPeer,
};

fn memory_config() -> StorageConfig {
    StorageConfig {
        connection_string: "sqlite::memory:".to_string(),
        credentials: Credentials::new("admin", "password"),
        bucket: "telegram".to_string(),
        scope: "client".to_string(),
        ready_timeout: Duration::from_secs(5),
    }
}

fn open_store() -> (Storages, DocClientStore) {
    let storages = Storages::open(&memory_config()).expect("Failed to open storages");
    let store = DocClientStore::new(&storages, DEFAULT_SESSION_KEY);
    (storages, store)
}

/// **Test: Update state on an empty bucket.**
///
/// **Setup:** Fresh bucket with no documents.
/// **Action:** `get_state`, `set_state({seq: 42})`, `get_state`.
/// **Expected:** Zero state first, then exactly `{seq: 42}`.
#[tokio::test]
async fn test_state_from_empty_bucket() {
    let (_storages, store) = open_store();

    assert_eq!(store.get_state().await.unwrap(), StateRecord::default());

    let state = StateRecord {
        seq: 42,
        ..StateRecord::default()
    };
    store.set_state(&state).await.unwrap();
    assert_eq!(store.get_state().await.unwrap(), state);
}

/// **Test: Peer lifecycle.**
///
/// **Setup:** Fresh bucket.
/// **Action:** `set_peer(1001, user "A")`, `get_peer`, `delete_peer`, `get_peer`.
/// **Expected:** The stored user comes back, then `None` after the delete.
#[tokio::test]
async fn test_peer_set_get_delete() {
    let (_storages, store) = open_store();
    let peer = PeerRecord::User(UserPeer {
        id: 1001,
        access_hash: 555,
        bot: false,
        name: "A".to_string(),
    });

    store.set_peer(1001, &peer).await.unwrap();
    assert_eq!(store.get_peer(1001).await.unwrap(), Some(peer));

    store.delete_peer(1001).await.unwrap();
    assert_eq!(store.get_peer(1001).await.unwrap(), None);
    // second delete of the same ID is still fine
    store.delete_peer(1001).await.unwrap();
}

/// **Test: Session round trip.**
///
/// **Setup:** Fresh bucket.
/// **Action:** `load_session`, `save_session`, `load_session`.
/// **Expected:** `None` before the save, the saved bytes after it.
#[tokio::test]
async fn test_session_round_trip() {
    let (_storages, store) = open_store();
    assert_eq!(store.load_session().await.unwrap(), None);

    let record = SessionRecord::new((0u8..=255).collect());
    store.save_session(&record).await.unwrap();
    assert_eq!(store.load_session().await.unwrap(), Some(record));
}

/// **Test: The three record types live in separate collections.**
///
/// **Setup:** One cluster; a session, a peer and a state are written.
/// **Action:** List the keys of each collection.
/// **Expected:** Each collection only holds its own document.
#[tokio::test]
async fn test_collections_are_independent() {
    let (storages, store) = open_store();
    store
        .save_session(&SessionRecord::new(vec![1, 2, 3]))
        .await
        .unwrap();
    store
        .set_peer(
            7,
            &PeerRecord::User(UserPeer {
                id: 7,
                access_hash: 1,
                bot: true,
                name: "helper".to_string(),
            }),
        )
        .await
        .unwrap();
    store.set_state(&StateRecord::default()).await.unwrap();

    assert_eq!(storages.sessions.keys().unwrap(), vec![DEFAULT_SESSION_KEY.to_string()]);
    assert_eq!(storages.peers.keys().unwrap(), vec!["7".to_string()]);
    assert_eq!(storages.updates.keys().unwrap(), vec!["state".to_string()]);
    assert_eq!(store.peer_store.peer_ids().unwrap(), vec![7]);
}

/// **Test: Invalid bucket name fails bootstrap.**
///
/// **Setup:** Config whose bucket contains a space.
/// **Action:** `Storages::open`.
/// **Expected:** An error naming the bucket; nothing is created.
#[test]
fn test_invalid_bucket_is_rejected() {
    let mut config = memory_config();
    config.bucket = "my bucket".to_string();
    let err = Storages::open(&config).err().expect("bucket must be rejected");
    assert!(err.to_string().contains("my bucket"), "{err}");
}

/// **Test: Unsupported connection string fails bootstrap.**
///
/// **Setup:** Config pointing at a non-SQLite scheme.
/// **Action:** `Storages::open`.
/// **Expected:** `InvalidConnectionString`.
#[test]
fn test_foreign_scheme_is_rejected() {
    let mut config = memory_config();
    config.connection_string = "couchbase://127.0.0.1".to_string();
    let err = Storages::open(&config).err().expect("scheme must be rejected");
    assert!(matches!(err, tg_doc_store::StorageError::InvalidConnectionString(_)));
}
