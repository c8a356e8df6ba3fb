// Packet codec: JSON payloads inside length-delimited frames.
//
// `encode_packet` / `decode_packet` work on a single frame payload.
// `write_packet` / `read_packet` add framing over any `Write` / `Read`.
//
// Read failures come in two flavors, and callers must treat them
// differently:
// - `ReadError::Transport`: the stream itself failed (EOF, reset, shutdown,
//   a corrupt length prefix). Nothing more can be read; tear the connection
//   down.
// - `ReadError::Decode`: a complete frame arrived but its payload is not a
//   valid `Packet`. The stream is still aligned on a frame boundary; drop the
//   packet and keep reading.

use std::io::{self, Read, Write};

use crate::framing::{read_message, write_message};
use crate::message::Packet;

/// A frame payload that does not resolve to any declared packet variant.
#[derive(Debug, thiserror::Error)]
#[error("malformed packet: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize packet: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write packet: {0}")]
    Transport(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("transport failed: {0}")]
    Transport(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ReadError {
    /// True when the stream can no longer be read from.
    pub fn is_transport(&self) -> bool {
        matches!(self, ReadError::Transport(_))
    }
}

/// Serialize a packet into one frame payload.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(packet)?)
}

/// Deserialize one frame payload.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode and write one framed packet (flushes).
pub fn write_packet<W: Write>(writer: &mut W, packet: &Packet) -> Result<(), EncodeError> {
    let bytes = encode_packet(packet)?;
    write_message(writer, &bytes)?;
    Ok(())
}

/// Read and decode one framed packet.
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Packet, ReadError> {
    let bytes = read_message(reader)?;
    Ok(decode_packet(&bytes)?)
}
