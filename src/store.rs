//! Implementations for the stores defined in [super::traits], one per collection.

use async_trait::async_trait;
use log::{debug, warn};

use crate::codec::{decode_peer, encode_peer};
use crate::error::{Result, ResultExt};
use crate::sqlite::{Collection, Document, Storages};
use crate::traits::{PeerStore, SessionStore, UpdateStateStore};
use crate::types::{
    ChannelPtsDocument, PeerRecord, SessionDocument, SessionRecord, StateRecord,
    SESSION_DOCUMENT_VERSION,
};

pub const DEFAULT_SESSION_KEY: &str = "session";
pub const STATE_KEY: &str = "state";

fn peer_key(id: i64) -> String {
    id.to_string()
}

fn channel_pts_key(channel_id: i64) -> String {
    format!("channel:{channel_id}")
}

/// One session per deployment, stored under a fixed key.
#[derive(Clone)]
pub struct DocSessionStore {
    coll: Collection,
    key: String,
}

impl DocSessionStore {
    pub fn new(coll: Collection, key: impl Into<String>) -> Self {
        Self {
            coll,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn decode(&self, document: &Document) -> Option<SessionRecord> {
        let doc: SessionDocument = match document.decode_json() {
            Ok(doc) => doc,
            Err(err) => {
                warn!("session {} is unreadable, ignoring it: {}", self.key, err);
                return None;
            }
        };
        if doc.version != SESSION_DOCUMENT_VERSION {
            warn!("session {} has unknown version {}, ignoring it", self.key, doc.version);
            return None;
        }
        match hex::decode(&doc.data) {
            Ok(data) => Some(SessionRecord { data }),
            Err(err) => {
                warn!("session {} payload is not hex, ignoring it: {}", self.key, err);
                None
            }
        }
    }
}

#[async_trait(?Send)]
impl SessionStore for DocSessionStore {
    async fn load_session(&self) -> Result<Option<SessionRecord>> {
        // a failed read means no usable session, same as an absent or corrupt one
        let document = match self.coll.get(&self.key) {
            Ok(Some(document)) => document,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!("load session {}: {}", self.key, err);
                return Ok(None);
            }
        };
        Ok(self.decode(&document))
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<()> {
        let doc = SessionDocument {
            version: SESSION_DOCUMENT_VERSION,
            data: hex::encode(&record.data),
        };
        self.coll
            .upsert_json(&self.key, &doc)
            .context(|| "save session".to_string())?;
        debug!("saved session {} ({} bytes)", self.key, record.data.len());
        Ok(())
    }
}

/// Peers keyed by their decimal ID, stored in the binary peer format.
#[derive(Clone)]
pub struct DocPeerStore {
    coll: Collection,
}

impl DocPeerStore {
    pub fn new(coll: Collection) -> Self {
        Self { coll }
    }

    /// IDs of every stored peer.
    pub fn peer_ids(&self) -> Result<Vec<i64>> {
        let keys = self.coll.keys().context(|| "list peers".to_string())?;
        Ok(keys.iter().filter_map(|key| key.parse().ok()).collect())
    }
}

#[async_trait(?Send)]
impl PeerStore for DocPeerStore {
    async fn get_peer(&self, id: i64) -> Result<Option<PeerRecord>> {
        let key = peer_key(id);
        let document = match self.coll.get(&key).context(|| format!("get peer {id}"))? {
            Some(document) => document,
            None => return Ok(None),
        };
        let peer = decode_peer(&document.content).context(|| format!("decode peer {id}"))?;
        Ok(Some(peer))
    }

    async fn set_peer(&self, id: i64, peer: &PeerRecord) -> Result<()> {
        let bytes = encode_peer(peer).context(|| format!("encode peer {id}"))?;
        self.coll
            .upsert_binary(&peer_key(id), &bytes)
            .context(|| format!("upsert peer {id}"))
    }

    async fn delete_peer(&self, id: i64) -> Result<()> {
        let removed = self
            .coll
            .remove(&peer_key(id))
            .context(|| format!("delete peer {id}"))?;
        if !removed {
            debug!("delete peer {}: not stored", id);
        }
        Ok(())
    }
}

/// Update cursor under `"state"`, per-channel cursors under `"channel:<id>"`.
#[derive(Clone)]
pub struct DocStateStore {
    coll: Collection,
}

impl DocStateStore {
    pub fn new(coll: Collection) -> Self {
        Self { coll }
    }
}

#[async_trait(?Send)]
impl UpdateStateStore for DocStateStore {
    async fn get_state(&self) -> Result<StateRecord> {
        match self.coll.get(STATE_KEY).context(|| "get state".to_string())? {
            Some(document) => document.decode_json().context(|| "get state".to_string()),
            None => Ok(StateRecord::default()),
        }
    }

    async fn set_state(&self, state: &StateRecord) -> Result<()> {
        self.coll
            .upsert_json(STATE_KEY, state)
            .context(|| "set state".to_string())
    }

    async fn get_channel_pts(&self, channel_id: i64) -> Result<Option<i32>> {
        let key = channel_pts_key(channel_id);
        match self.coll.get(&key).context(|| format!("get channel pts {channel_id}"))? {
            Some(document) => {
                let doc: ChannelPtsDocument = document
                    .decode_json()
                    .context(|| format!("get channel pts {channel_id}"))?;
                Ok(Some(doc.pts))
            }
            None => Ok(None),
        }
    }

    async fn set_channel_pts(&self, channel_id: i64, pts: i32) -> Result<()> {
        self.coll
            .upsert_json(&channel_pts_key(channel_id), &ChannelPtsDocument { pts })
            .context(|| format!("set channel pts {channel_id}"))
    }
}

/// All three client stores over one set of collections.
#[derive(Clone)]
pub struct DocClientStore {
    pub session_store: DocSessionStore,
    pub peer_store: DocPeerStore,
    pub state_store: DocStateStore,
}

impl DocClientStore {
    pub fn new(storages: &Storages, session_key: &str) -> Self {
        Self {
            session_store: DocSessionStore::new(storages.sessions.clone(), session_key),
            peer_store: DocPeerStore::new(storages.peers.clone()),
            state_store: DocStateStore::new(storages.updates.clone()),
        }
    }
}

#[async_trait(?Send)]
impl SessionStore for DocClientStore {
    async fn load_session(&self) -> Result<Option<SessionRecord>> {
        self.session_store.load_session().await
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<()> {
        self.session_store.save_session(record).await
    }
}

#[async_trait(?Send)]
impl PeerStore for DocClientStore {
    async fn get_peer(&self, id: i64) -> Result<Option<PeerRecord>> {
        self.peer_store.get_peer(id).await
    }

    async fn set_peer(&self, id: i64, peer: &PeerRecord) -> Result<()> {
        self.peer_store.set_peer(id, peer).await
    }

    async fn delete_peer(&self, id: i64) -> Result<()> {
        self.peer_store.delete_peer(id).await
    }
}

#[async_trait(?Send)]
impl UpdateStateStore for DocClientStore {
    async fn get_state(&self) -> Result<StateRecord> {
        self.state_store.get_state().await
    }

    async fn set_state(&self, state: &StateRecord) -> Result<()> {
        self.state_store.set_state(state).await
    }

    async fn get_channel_pts(&self, channel_id: i64) -> Result<Option<i32>> {
        self.state_store.get_channel_pts(channel_id).await
    }

    async fn set_channel_pts(&self, channel_id: i64, pts: i32) -> Result<()> {
        self.state_store.set_channel_pts(channel_id, pts).await
    }
}
