// Packet envelope and payload types for the session stream.
//
// A `Packet` is a closed tagged variant: the packet type and the payload shape
// are one and the same, so a HANDSHAKE that carries a bundle (or any other
// mismatched pairing) is not representable. On the wire the envelope is JSON
// of the form `{"type": "PLAYER_UPDATE", "payload": {...}}`; a payload that
// does not match its tag, including one with missing or extra fields, fails
// to deserialize and surfaces as a `DecodeError` from `codec.rs`.
//
// Direction conventions (not enforced by the types):
// - client → host: HANDSHAKE, then PLAYER_UPDATE / CHAT / HEARTBEAT.
// - host → client: HANDSHAKE_ACK and DOWNLOAD_BUNDLE once, then relayed
//   PLAYER_UPDATE / CHAT / HEARTBEAT from other peers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::player::PlayerState;

/// Level used when the host has no content registered for its game id.
pub const DEFAULT_LEVEL: &str = "Town";

/// One unit of the session protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Packet {
    /// First packet on every new connection.
    Handshake(Handshake),
    /// Host's answer to a handshake.
    HandshakeAck(ServerInfo),
    /// Shared session content, sent right after the ack.
    DownloadBundle(GameBundle),
    /// A peer's latest player state.
    PlayerUpdate(PlayerState),
    Chat(ChatMessage),
    Heartbeat(Heartbeat),
}

/// Payload-free discriminant of a `Packet`, for logging and routing tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    Handshake,
    HandshakeAck,
    DownloadBundle,
    PlayerUpdate,
    Chat,
    Heartbeat,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Handshake(_) => PacketType::Handshake,
            Packet::HandshakeAck(_) => PacketType::HandshakeAck,
            Packet::DownloadBundle(_) => PacketType::DownloadBundle,
            Packet::PlayerUpdate(_) => PacketType::PlayerUpdate,
            Packet::Chat(_) => PacketType::Chat,
            Packet::Heartbeat(_) => PacketType::Heartbeat,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Handshake => "HANDSHAKE",
            PacketType::HandshakeAck => "HANDSHAKE_ACK",
            PacketType::DownloadBundle => "DOWNLOAD_BUNDLE",
            PacketType::PlayerUpdate => "PLAYER_UPDATE",
            PacketType::Chat => "CHAT",
            PacketType::Heartbeat => "HEARTBEAT",
        };
        f.write_str(name)
    }
}

/// Client introduction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Handshake {
    pub player_name: String,
    pub client_version: String,
}

/// Host identity returned in HANDSHAKE_ACK.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerInfo {
    pub server_name: String,
    pub version: String,
    pub session_id: String,
}

/// Shared world/content description for the session ("download play").
///
/// `levels` is never empty: `new` substitutes `DEFAULT_LEVEL` for an empty
/// list and deserialization rejects one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GameBundleWire")]
pub struct GameBundle {
    session_id: String,
    levels: Vec<String>,
    motd: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GameBundleWire {
    session_id: String,
    levels: Vec<String>,
    motd: String,
}

impl TryFrom<GameBundleWire> for GameBundle {
    type Error = String;

    fn try_from(wire: GameBundleWire) -> Result<Self, Self::Error> {
        if wire.levels.is_empty() {
            return Err("game bundle must list at least one level".into());
        }
        Ok(Self {
            session_id: wire.session_id,
            levels: wire.levels,
            motd: wire.motd,
        })
    }
}

impl GameBundle {
    pub fn new(session_id: impl Into<String>, levels: Vec<String>, motd: impl Into<String>) -> Self {
        let levels = if levels.is_empty() {
            vec![DEFAULT_LEVEL.to_string()]
        } else {
            levels
        };
        Self {
            session_id: session_id.into(),
            levels,
            motd: motd.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn motd(&self) -> &str {
        &self.motd
    }
}

/// Chat line relayed to every other peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatMessage {
    pub from: String,
    pub text: String,
}

/// Liveness ping. `sent_at_ms` is the sender's wall clock in Unix millis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Heartbeat {
    pub sent_at_ms: u64,
}
