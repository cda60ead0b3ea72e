//! Versioned binary encoding of [`PeerRecord`].
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! byte 0      format version (FORMAT_VERSION)
//! byte 1      tag: 1 = user, 2 = chat, 3 = channel
//! user:       id i64 | access_hash i64 | flags u8 (bit 0 = bot) | name
//! chat:       id i64 | title
//! channel:    id i64 | access_hash i64 | kind u8 (0 broadcast, 1 megagroup, 2 gigagroup) | title
//! string:     length u32 | UTF-8 bytes
//! ```
//!
//! The whole buffer must be consumed; trailing bytes are an error.

use thiserror::Error;

use crate::types::{ChannelKind, ChannelPeer, ChatPeer, PeerRecord, UserPeer};

pub const FORMAT_VERSION: u8 = 1;

const TAG_USER: u8 = 1;
const TAG_CHAT: u8 = 2;
const TAG_CHANNEL: u8 = 3;

const FLAG_BOT: u8 = 0b0000_0001;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input: needed {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown peer tag {0}")]
    UnknownTag(u8),

    #[error("unknown channel kind {0}")]
    UnknownChannelKind(u8),

    #[error("unknown user flags {0:#04x}")]
    UnknownFlags(u8),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("string of {0} bytes does not fit the length prefix")]
    StringTooLong(usize),

    #[error("{0} trailing bytes after peer")]
    TrailingBytes(usize),
}

pub fn encode_peer(peer: &PeerRecord) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(32);
    out.push(FORMAT_VERSION);
    match peer {
        PeerRecord::User(user) => {
            out.push(TAG_USER);
            out.extend_from_slice(&user.id.to_le_bytes());
            out.extend_from_slice(&user.access_hash.to_le_bytes());
            out.push(if user.bot { FLAG_BOT } else { 0 });
            put_str(&mut out, &user.name)?;
        }
        PeerRecord::Chat(chat) => {
            out.push(TAG_CHAT);
            out.extend_from_slice(&chat.id.to_le_bytes());
            put_str(&mut out, &chat.title)?;
        }
        PeerRecord::Channel(channel) => {
            out.push(TAG_CHANNEL);
            out.extend_from_slice(&channel.id.to_le_bytes());
            out.extend_from_slice(&channel.access_hash.to_le_bytes());
            out.push(match channel.kind {
                ChannelKind::Broadcast => 0,
                ChannelKind::Megagroup => 1,
                ChannelKind::Gigagroup => 2,
            });
            put_str(&mut out, &channel.title)?;
        }
    }
    Ok(out)
}

pub fn decode_peer(buf: &[u8]) -> Result<PeerRecord, CodecError> {
    let mut reader = Reader { buf, pos: 0 };
    let version = reader.u8()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let peer = match reader.u8()? {
        TAG_USER => {
            let id = reader.i64()?;
            let access_hash = reader.i64()?;
            let flags = reader.u8()?;
            if flags & !FLAG_BOT != 0 {
                return Err(CodecError::UnknownFlags(flags));
            }
            PeerRecord::User(UserPeer {
                id,
                access_hash,
                bot: flags & FLAG_BOT != 0,
                name: reader.string()?,
            })
        }
        TAG_CHAT => PeerRecord::Chat(ChatPeer {
            id: reader.i64()?,
            title: reader.string()?,
        }),
        TAG_CHANNEL => {
            let id = reader.i64()?;
            let access_hash = reader.i64()?;
            let kind = match reader.u8()? {
                0 => ChannelKind::Broadcast,
                1 => ChannelKind::Megagroup,
                2 => ChannelKind::Gigagroup,
                other => return Err(CodecError::UnknownChannelKind(other)),
            };
            PeerRecord::Channel(ChannelPeer {
                id,
                access_hash,
                kind,
                title: reader.string()?,
            })
        }
        other => return Err(CodecError::UnknownTag(other)),
    };
    let rest = buf.len() - reader.pos;
    if rest != 0 {
        return Err(CodecError::TrailingBytes(rest));
    }
    Ok(peer)
}

fn put_str(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let len = u32::try_from(s.len()).map_err(|_| CodecError::StringTooLong(s.len()))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        let len = u32::from_le_bytes(raw) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}
