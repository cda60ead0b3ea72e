use serde::{Deserialize, Serialize};

/// Serialized authentication state handed to us by the client library.
/// The bytes are opaque here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub data: Vec<u8>,
}

impl SessionRecord {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// JSON shape of a session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SessionDocument {
    pub version: u32,
    /// hex of `SessionRecord::data`
    pub data: String,
}

pub(crate) const SESSION_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPeer {
    pub id: i64,
    pub access_hash: i64,
    pub bot: bool,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPeer {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Broadcast,
    Megagroup,
    Gigagroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPeer {
    pub id: i64,
    pub access_hash: i64,
    pub kind: ChannelKind,
    pub title: String,
}

/// An addressable conversation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRecord {
    User(UserPeer),
    Chat(ChatPeer),
    Channel(ChannelPeer),
}

impl PeerRecord {
    pub fn id(&self) -> i64 {
        match self {
            PeerRecord::User(user) => user.id,
            PeerRecord::Chat(chat) => chat.id,
            PeerRecord::Channel(channel) => channel.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PeerRecord::User(user) => &user.name,
            PeerRecord::Chat(chat) => &chat.title,
            PeerRecord::Channel(channel) => &channel.title,
        }
    }

    /// Bot-API style ID: users as is, basic groups negated, channels
    /// as `-100<id>`. Unique across peer kinds, unlike [`PeerRecord::id`].
    pub fn marked_id(&self) -> i64 {
        match self {
            PeerRecord::User(user) => user.id,
            PeerRecord::Chat(chat) => -chat.id,
            PeerRecord::Channel(channel) => channel_marked_id(channel.id),
        }
    }

    pub fn as_channel(&self) -> Option<&ChannelPeer> {
        match self {
            PeerRecord::Channel(channel) => Some(channel),
            _ => None,
        }
    }
}

const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Strip the sign/offset marking of Bot-API style IDs
/// (`-100<id>` for channels, `-<id>` for basic groups).
pub fn bare_peer_id(id: i64) -> i64 {
    if id < -CHANNEL_ID_OFFSET {
        id.saturating_neg() - CHANNEL_ID_OFFSET
    } else if id < 0 {
        id.saturating_neg()
    } else {
        id
    }
}

/// Marked form of a channel ID, bare or already marked.
pub fn channel_marked_id(id: i64) -> i64 {
    -CHANNEL_ID_OFFSET - bare_peer_id(id)
}

/// Position in the server-pushed update stream.
/// The zero value means "start from scratch".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub pts: i32,
    pub qts: i32,
    pub date: i32,
    pub seq: i32,
}

/// Per-channel cursor document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct ChannelPtsDocument {
    pub pts: i32,
}
