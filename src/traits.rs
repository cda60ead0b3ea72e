//! Persistence hooks a Telegram client needs from its storage backend.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PeerRecord, SessionRecord, StateRecord};

#[async_trait(?Send)]
pub trait SessionStore {
    /// `Ok(None)` when there is no usable session, either because none was
    /// saved yet or because the stored one cannot be decoded. Both mean "log in again".
    async fn load_session(&self) -> Result<Option<SessionRecord>>;

    /// Overwrite the stored session.
    async fn save_session(&self, record: &SessionRecord) -> Result<()>;
}

#[async_trait(?Send)]
pub trait PeerStore {
    /// `Ok(None)` when the peer was never stored.
    async fn get_peer(&self, id: i64) -> Result<Option<PeerRecord>>;

    async fn set_peer(&self, id: i64, peer: &PeerRecord) -> Result<()>;

    /// Deleting an unknown peer succeeds.
    async fn delete_peer(&self, id: i64) -> Result<()>;
}

#[async_trait(?Send)]
pub trait UpdateStateStore {
    /// The zero state when nothing was stored yet.
    async fn get_state(&self) -> Result<StateRecord>;

    async fn set_state(&self, state: &StateRecord) -> Result<()>;

    async fn set_pts(&self, pts: i32) -> Result<()> {
        let mut state = self.get_state().await?;
        state.pts = pts;
        self.set_state(&state).await
    }

    async fn set_qts(&self, qts: i32) -> Result<()> {
        let mut state = self.get_state().await?;
        state.qts = qts;
        self.set_state(&state).await
    }

    async fn set_date_seq(&self, date: i32, seq: i32) -> Result<()> {
        let mut state = self.get_state().await?;
        state.date = date;
        state.seq = seq;
        self.set_state(&state).await
    }

    async fn get_channel_pts(&self, channel_id: i64) -> Result<Option<i32>>;

    async fn set_channel_pts(&self, channel_id: i64, pts: i32) -> Result<()>;
}
