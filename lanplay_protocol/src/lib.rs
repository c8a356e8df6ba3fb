// lanplay_protocol — wire protocol for LAN Play sessions.
//
// Shared by hosts and clients; contains no networking of its own, only the
// types and byte formats both sides agree on.
//
// Module overview:
// - `message.rs`:  `Packet` (closed tagged variant, one variant per packet
//                  type) and the handshake/ack/bundle/chat/heartbeat payloads.
// - `player.rs`:   `PlayerState`, the PLAYER_UPDATE payload, and `Facing`.
// - `framing.rs`:  Length-delimited frames over any `Read`/`Write`: 4-byte
//                  big-endian length prefix, then the payload.
// - `codec.rs`:    JSON encode/decode of packets inside frames, and the
//                  transport-vs-decode split of read errors.
// - `beacon.rs`:   The `MAGIC|count|port|label` UDP discovery datagram.
//
// Design decisions:
// - **JSON payloads.** Both ends are always the same build, so there is no
//   versioning; JSON keeps captured traffic readable.
// - **No async runtime.** Framing uses `std::io::Read`/`Write` and works with
//   blocking `TcpStream`s and buffered wrappers alike.

pub mod beacon;
pub mod codec;
pub mod framing;
pub mod message;
pub mod player;

pub use beacon::{BeaconMessage, DEFAULT_MAGIC};
pub use codec::{DecodeError, EncodeError, ReadError, decode_packet, encode_packet, read_packet, write_packet};
pub use framing::{
    HEADER_LEN, MAX_MESSAGE_SIZE, frame_header, payload_len, read_message, write_message,
};
pub use message::{
    ChatMessage, DEFAULT_LEVEL, GameBundle, Handshake, Heartbeat, Packet, PacketType, ServerInfo,
};
pub use player::{Facing, PlayerState};
