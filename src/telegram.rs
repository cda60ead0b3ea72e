//! MTProto client wiring (grammers), enabled by the `telegram` feature.
//!
//! The session blob and the peer cache go through the document stores; the
//! member walk goes straight to `channels.getParticipants`.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use grammers_client::types::Chat;
use grammers_client::{Client, Config, SignInError};
use grammers_session::{PackedType, Session};
use grammers_tl_types as tl;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::TelegramConfig;
use crate::driver::{collect_member_ids, Participant, ParticipantPage, ParticipantSource, PAGE_LIMIT};
use crate::traits::{PeerStore, SessionStore};
use crate::types::{channel_marked_id, ChannelKind, ChannelPeer, ChatPeer, PeerRecord, SessionRecord, UserPeer};

pub fn peer_from_chat(chat: &Chat) -> PeerRecord {
    let packed = chat.pack();
    let access_hash = packed.access_hash.unwrap_or(0);
    let name = chat.name().to_string();
    let channel = |kind| {
        PeerRecord::Channel(ChannelPeer {
            id: packed.id,
            access_hash,
            kind,
            title: name.clone(),
        })
    };
    match packed.ty {
        PackedType::User => PeerRecord::User(UserPeer {
            id: packed.id,
            access_hash,
            bot: false,
            name: name.clone(),
        }),
        PackedType::Bot => PeerRecord::User(UserPeer {
            id: packed.id,
            access_hash,
            bot: true,
            name: name.clone(),
        }),
        PackedType::Chat => PeerRecord::Chat(ChatPeer {
            id: packed.id,
            title: name.clone(),
        }),
        PackedType::Megagroup => channel(ChannelKind::Megagroup),
        PackedType::Broadcast => channel(ChannelKind::Broadcast),
        PackedType::Gigagroup => channel(ChannelKind::Gigagroup),
    }
}

/// Connect with the stored session, or a fresh one when there is none.
pub async fn connect<S: SessionStore + ?Sized>(config: &TelegramConfig, sessions: &S) -> Result<Client> {
    let session = match sessions.load_session().await? {
        Some(record) => match Session::load(&record.data) {
            Ok(session) => session,
            Err(err) => {
                warn!("stored session rejected by the client, starting fresh: {}", err);
                Session::new()
            }
        },
        None => {
            info!("no stored session, a login will be needed");
            Session::new()
        }
    };
    let client = Client::connect(Config {
        session,
        api_id: config.app_id,
        api_hash: config.app_hash.clone(),
        params: Default::default(),
    })
    .await
    .map_err(|err| anyhow!("failed to start client: {err}"))?;
    Ok(client)
}

pub async fn save_session<S: SessionStore + ?Sized>(client: &Client, sessions: &S) -> Result<()> {
    sessions
        .save_session(&SessionRecord::new(client.session().save()))
        .await?;
    Ok(())
}

async fn prompt(question: &str) -> Result<String> {
    println!("{question}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

/// Log in by phone when the stored session is not authorised.
pub async fn ensure_authorized<S: SessionStore + ?Sized>(
    client: &Client,
    config: &TelegramConfig,
    sessions: &S,
) -> Result<()> {
    if client
        .is_authorized()
        .await
        .map_err(|err| anyhow!("check authorization: {err}"))?
    {
        return Ok(());
    }
    info!("signing in as {}", config.phone);
    let token = client
        .request_login_code(&config.phone)
        .await
        .map_err(|err| anyhow!("request login code: {err}"))?;
    let code = prompt("Enter the code Telegram sent you:").await?;
    match client.sign_in(&token, &code).await {
        Ok(_) => {}
        Err(SignInError::PasswordRequired(password_token)) => {
            let password = match &config.password {
                Some(password) => password.clone(),
                None => prompt("Enter your two-step verification password:").await?,
            };
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|err| anyhow!("check password: {err}"))?;
        }
        Err(err) => bail!("sign in: {err}"),
    }
    save_session(client, sessions).await?;
    info!("signed in, session saved");
    Ok(())
}

/// Find a channel by ID: peer cache first, then the account's dialogs.
/// Every dialog walked on a miss is cached under its marked ID, since bare
/// user and channel IDs can coincide.
pub async fn resolve_channel<P: PeerStore + ?Sized>(
    client: &Client,
    peers: &P,
    id: i64,
) -> Result<ChannelPeer> {
    let id = channel_marked_id(id);
    if let Some(peer) = peers.get_peer(id).await? {
        return match peer {
            PeerRecord::Channel(channel) => Ok(channel),
            other => bail!("peer {} ({}) is not a channel", id, other.name()),
        };
    }

    let mut dialogs = client.iter_dialogs();
    let mut found = None;
    while let Some(dialog) = dialogs
        .next()
        .await
        .map_err(|err| anyhow!("iterate dialogs: {err}"))?
    {
        let peer = peer_from_chat(dialog.chat());
        peers.set_peer(peer.marked_id(), &peer).await?;
        if peer.marked_id() == id {
            found = Some(peer);
            break;
        }
    }
    match found {
        Some(PeerRecord::Channel(channel)) => Ok(channel),
        Some(other) => bail!("peer {} ({}) is not a channel", id, other.name()),
        None => bail!("peer {} not found among dialogs", id),
    }
}

fn peer_id(peer: &tl::enums::Peer) -> i64 {
    match peer {
        tl::enums::Peer::User(p) => p.user_id,
        tl::enums::Peer::Chat(p) => p.chat_id,
        tl::enums::Peer::Channel(p) => p.channel_id,
    }
}

fn participant_from_raw(raw: tl::enums::ChannelParticipant) -> Participant {
    use tl::enums::ChannelParticipant as P;

    match raw {
        P::Participant(p) => Participant::Member { user_id: p.user_id },
        P::ParticipantSelf(p) => Participant::Myself { user_id: p.user_id },
        P::Creator(p) => Participant::Creator { user_id: p.user_id },
        P::Admin(p) => Participant::Admin { user_id: p.user_id },
        P::Banned(p) => Participant::Banned { peer_id: peer_id(&p.peer) },
        P::Left(p) => Participant::Left { peer_id: peer_id(&p.peer) },
    }
}

/// `channels.getParticipants` with the "recent" filter.
pub struct ChannelMembers<'a> {
    client: &'a Client,
    channel: tl::enums::InputChannel,
}

impl<'a> ChannelMembers<'a> {
    pub fn new(client: &'a Client, channel: &ChannelPeer) -> Self {
        Self {
            client,
            channel: tl::enums::InputChannel::Channel(tl::types::InputChannel {
                channel_id: channel.id,
                access_hash: channel.access_hash,
            }),
        }
    }
}

#[async_trait(?Send)]
impl ParticipantSource for ChannelMembers<'_> {
    type Error = anyhow::Error;

    async fn fetch_page(&mut self, offset: usize, limit: usize) -> Result<ParticipantPage> {
        let request = tl::functions::channels::GetParticipants {
            channel: self.channel.clone(),
            filter: tl::enums::ChannelParticipantsFilter::ChannelParticipantsRecent,
            offset: i32::try_from(offset)?,
            limit: i32::try_from(limit)?,
            hash: 0,
        };
        let response = self
            .client
            .invoke(&request)
            .await
            .map_err(|err| anyhow!("failed to get participants: {err}"))?;
        match response {
            tl::enums::channels::ChannelParticipants::Participants(data) => Ok(ParticipantPage {
                total: usize::try_from(data.count).unwrap_or(0),
                participants: data.participants.into_iter().map(participant_from_raw).collect(),
            }),
            tl::enums::channels::ChannelParticipants::NotModified => Ok(ParticipantPage::default()),
        }
    }
}

/// Log in if needed and collect the member IDs of the first configured group.
pub async fn run_member_export<S>(config: &TelegramConfig, store: &S) -> Result<()>
where
    S: SessionStore + PeerStore + ?Sized,
{
    let client = connect(config, store).await?;
    ensure_authorized(&client, config, store).await?;

    let me = client
        .get_me()
        .await
        .map_err(|err| anyhow!("get self: {err}"))?;
    info!("client (@{}) has been started...", me.username().unwrap_or_default());

    let (group_id, rest) = config
        .group_ids
        .split_first()
        .ok_or_else(|| anyhow!("GROUP_IDS is empty"))?;
    if !rest.is_empty() {
        warn!("only the first group is processed, skipping {:?}", rest);
    }

    let channel = resolve_channel(&client, store, *group_id).await?;
    info!("collecting members of {} ({})", channel.title, channel.id);
    let users = collect_member_ids(&mut ChannelMembers::new(&client, &channel), PAGE_LIMIT).await?;
    info!("collected {} member IDs", users.len());

    save_session(&client, store).await?;
    info!("Done.");
    Ok(())
}
