//! Channel member enumeration.

use std::collections::BTreeSet;

use async_trait::async_trait;
use log::info;

pub const PAGE_LIMIT: usize = 100;

/// One entry of a channel's member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    /// the logged-in account itself
    Myself { user_id: i64 },
    Member { user_id: i64 },
    Admin { user_id: i64 },
    Creator { user_id: i64 },
    Banned { peer_id: i64 },
    Left { peer_id: i64 },
}

impl Participant {
    /// The user ID for entries that are present in the channel.
    pub fn member_id(&self) -> Option<i64> {
        match *self {
            Participant::Myself { user_id }
            | Participant::Member { user_id }
            | Participant::Admin { user_id }
            | Participant::Creator { user_id } => Some(user_id),
            Participant::Banned { .. } | Participant::Left { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantPage {
    /// total member count as reported by the server
    pub total: usize,
    pub participants: Vec<Participant>,
}

#[async_trait(?Send)]
pub trait ParticipantSource {
    type Error;

    async fn fetch_page(
        &mut self,
        offset: usize,
        limit: usize,
    ) -> Result<ParticipantPage, Self::Error>;
}

/// Page through the member list until the reported total is reached and
/// return the distinct member IDs. The first error aborts the walk.
pub async fn collect_member_ids<S>(source: &mut S, limit: usize) -> Result<BTreeSet<i64>, S::Error>
where
    S: ParticipantSource + ?Sized,
{
    let limit = limit.max(1);
    let mut users = BTreeSet::new();
    let mut offset = 0;
    loop {
        let page = source.fetch_page(offset, limit).await?;
        let received = page.participants.len();
        users.extend(page.participants.iter().filter_map(Participant::member_id));
        offset += limit;
        info!("Fetched {} / {} participants", offset.min(page.total), page.total);
        // an empty page means the server has nothing past this offset
        if offset >= page.total || received == 0 {
            break;
        }
    }
    info!("Total unique participants: {}", users.len());
    Ok(users)
}
