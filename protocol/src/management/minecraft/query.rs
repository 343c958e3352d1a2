use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::decode_latin1;

// Every query packet opens with the two magic bytes, then a type byte and a
// four byte session id.
const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;

// The challenge token sits after type + session id in the handshake reply.
const CHALLENGE_TOKEN_OFFSET: usize = 5;

// NUL-delimited field offsets inside the full-stat reply.
const FIELD_WORLD_HEIGHT: usize = 6;
const FIELD_MOTD: usize = 8;
const FIELD_GAME_TYPE: usize = 10;
const FIELD_GAME_NAME: usize = 12;
const FIELD_GAME_VERSION: usize = 14;
const FIELD_PLUGINS: usize = 16;
const FIELD_DEFAULT_WORLD: usize = 18;
const FIELD_NUM_PLAYERS: usize = 20;
const FIELD_MAX_PLAYERS: usize = 22;
const FIELD_PLAYER_LIST: usize = 30;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query timeout {host}:{port}")]
    Timeout { host: String, port: u16 },
    #[error("query protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// Timeouts are the one failure callers treat specially: they mean the
    /// process is unreachable rather than misbehaving.
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueryError::Timeout { .. })
    }
}

/// Snapshot of a live server as reported by one full-stat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub world_height: u8,
    pub motd: String,
    pub game_type: String,
    pub game_name: String,
    pub game_version: String,
    pub plugins: String,
    pub default_world: String,
    pub num_players: i32,
    pub max_players: i32,
    pub host: String,
    pub port: u16,
    pub players: Vec<String>,
}

/// The fixed 11-byte handshake request: magic, handshake type, zero session
/// id and four bytes of padding.
pub fn handshake_packet() -> [u8; 11] {
    let mut packet = [0u8; 11];
    packet[..2].copy_from_slice(&MAGIC);
    packet[2] = TYPE_HANDSHAKE;
    packet
}

/// Extracts the challenge token from a handshake reply. The token arrives as
/// a NUL-terminated ASCII decimal after the five byte header.
pub fn parse_challenge(reply: &[u8]) -> Result<i32, QueryError> {
    match reply.first() {
        Some(&TYPE_HANDSHAKE) => {}
        Some(other) => {
            return Err(QueryError::Protocol(format!(
                "unexpected reply type 0x{:02x} after handshake request",
                other
            )))
        }
        None => return Err(QueryError::Protocol("empty handshake reply".into())),
    }
    if reply.len() <= CHALLENGE_TOKEN_OFFSET {
        return Err(QueryError::Protocol("handshake reply too short".into()));
    }

    let token = decode_latin1(&reply[CHALLENGE_TOKEN_OFFSET..]);
    let token = token.trim_end_matches('\0').trim();
    token
        .parse::<i32>()
        .map_err(|_| QueryError::Protocol(format!("invalid challenge token {:?}", token)))
}

/// Builds the 15-byte full-stat request: magic, stat type, zero session id,
/// the big-endian challenge token and four bytes of padding.
pub fn stat_packet(token: i32) -> [u8; 15] {
    let mut packet = [0u8; 15];
    packet[..2].copy_from_slice(&MAGIC);
    packet[2] = TYPE_STAT;
    packet[7..11].copy_from_slice(&token.to_be_bytes());
    packet
}

/// Decodes a full-stat reply into a [`PingResponse`]. The payload is a
/// NUL-delimited field sequence with fixed offsets; the player name list
/// starts at field 30 and is bounded by the reported player count.
pub fn parse_full_stat(reply: &[u8], host: &str, port: u16) -> Result<PingResponse, QueryError> {
    match reply.first() {
        Some(&TYPE_STAT) => {}
        Some(other) => {
            return Err(QueryError::Protocol(format!(
                "unexpected reply type 0x{:02x} after stat request",
                other
            )))
        }
        None => return Err(QueryError::Protocol("empty stat reply".into())),
    }

    fn field<'a>(fields: &[&'a str], index: usize) -> Result<&'a str, QueryError> {
        fields
            .get(index)
            .copied()
            .ok_or_else(|| QueryError::Protocol(format!("stat reply missing field {}", index)))
    }
    fn int_field(fields: &[&str], index: usize) -> Result<i32, QueryError> {
        let raw = field(fields, index)?;
        raw.parse::<i32>().map_err(|_| {
            QueryError::Protocol(format!("stat field {} is not a number: {:?}", index, raw))
        })
    }

    let payload = decode_latin1(reply);
    let fields: Vec<&str> = payload.split('\0').collect();

    let num_players = int_field(&fields, FIELD_NUM_PLAYERS)?;
    let players = fields
        .iter()
        .skip(FIELD_PLAYER_LIST)
        .take(num_players.max(0) as usize)
        .map(|name| name.to_string())
        .collect();

    Ok(PingResponse {
        // First character code of the field, which decode_latin1 maps 1:1
        // from the raw byte.
        world_height: field(&fields, FIELD_WORLD_HEIGHT)?
            .chars()
            .next()
            .map(|c| c as u8)
            .unwrap_or(0),
        motd: field(&fields, FIELD_MOTD)?.to_string(),
        game_type: field(&fields, FIELD_GAME_TYPE)?.to_string(),
        game_name: field(&fields, FIELD_GAME_NAME)?.to_string(),
        game_version: field(&fields, FIELD_GAME_VERSION)?.to_string(),
        plugins: field(&fields, FIELD_PLUGINS)?.to_string(),
        default_world: field(&fields, FIELD_DEFAULT_WORLD)?.to_string(),
        num_players,
        max_players: int_field(&fields, FIELD_MAX_PLAYERS)?,
        host: host.to_string(),
        port,
        players,
    })
}
