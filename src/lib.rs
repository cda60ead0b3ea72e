//! Telegram client state (session, peer cache, update cursor) kept in a
//! document store, plus a channel member export built on top of it.

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod sqlite;
pub mod store;
#[cfg(feature = "telegram")]
pub mod telegram;
pub mod traits;
pub mod types;

pub use config::{AppConfig, ConfigError, Credentials, StorageConfig, TelegramConfig};
pub use error::{Result, StorageError};
pub use sqlite::{Cluster, Collection, Storages};
pub use store::{DocClientStore, DocPeerStore, DocSessionStore, DocStateStore};
pub use traits::{PeerStore, SessionStore, UpdateStateStore};
pub use types::{ChannelKind, ChannelPeer, ChatPeer, PeerRecord, SessionRecord, StateRecord, UserPeer};
