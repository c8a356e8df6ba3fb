// Length-delimited frames over a TCP session stream.
//
// Every packet on the session port travels as a 4-byte big-endian length
// followed by that many payload bytes. This module only moves opaque byte
// frames; `codec.rs` turns them into `Packet` values. Keeping the two apart
// means a payload that fails to decode never desynchronizes the stream: the
// frame boundary is already known, so the receiver can drop it and read on.
//
// `MAX_MESSAGE_SIZE` (1 MiB) bounds the allocation made for a single frame.
// The largest legitimate frame is a `GameBundle` with a long level list,
// which is a few kilobytes at most.

use std::io::{self, Read, Write};

/// Maximum allowed frame payload size (1 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Size of the length prefix in front of every frame.
pub const HEADER_LEN: usize = 4;

fn too_large(kind: io::ErrorKind, len: impl std::fmt::Display) -> io::Error {
    io::Error::new(
        kind,
        format!("frame too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
    )
}

/// Length prefix for a payload of `len` bytes, or `InvalidInput` if it may
/// not be sent.
pub fn frame_header(len: usize) -> io::Result<[u8; HEADER_LEN]> {
    match u32::try_from(len) {
        Ok(n) if n <= MAX_MESSAGE_SIZE => Ok(n.to_be_bytes()),
        _ => Err(too_large(io::ErrorKind::InvalidInput, len)),
    }
}

/// Payload length announced by a received prefix, or `InvalidData` if it is
/// over the limit.
pub fn payload_len(header: [u8; HEADER_LEN]) -> io::Result<usize> {
    let len = u32::from_be_bytes(header);
    if len > MAX_MESSAGE_SIZE {
        return Err(too_large(io::ErrorKind::InvalidData, len));
    }
    Ok(len as usize)
}

/// Write one frame and flush.
///
/// The flush is part of the frame. Callers that share a writer between
/// threads hold their lock across this whole call so frames never interleave.
pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let header = frame_header(payload.len())?;
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame.
///
/// `UnexpectedEof` means the peer closed the stream (cleanly or mid-frame).
/// `InvalidData` means the length prefix exceeds `MAX_MESSAGE_SIZE`; the
/// stream cannot be resynchronized after that, so callers treat it like a
/// transport failure.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    let mut payload = vec![0u8; payload_len(header)?];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_carries_payload_unchanged() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"player update").unwrap();
        assert_eq!(&buf[..4], &13u32.to_be_bytes());

        let mut cursor = Cursor::new(&buf);
        assert_eq!(read_message(&mut cursor).unwrap(), b"player update");
    }

    #[test]
    fn empty_frame_is_legal() {
        let mut buf = Vec::new();
        write_message(&mut buf, b"").unwrap();
        let mut cursor = Cursor::new(&buf);
        assert!(read_message(&mut cursor).unwrap().is_empty());
    }

    #[test]
    fn oversized_write_is_refused_before_touching_the_stream() {
        let big = vec![0u8; MAX_MESSAGE_SIZE as usize + 1];
        let mut buf = Vec::new();
        let err = write_message(&mut buf, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[test]
    fn header_limit_is_inclusive() {
        let max = MAX_MESSAGE_SIZE as usize;
        assert_eq!(frame_header(max).unwrap(), MAX_MESSAGE_SIZE.to_be_bytes());
        assert_eq!(payload_len(MAX_MESSAGE_SIZE.to_be_bytes()).unwrap(), max);
        assert_eq!(
            frame_header(max + 1).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert_eq!(
            frame_header(usize::MAX).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn oversized_length_prefix_is_invalid_data() {
        let fake_len = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_frame_is_eof() {
        // Header promises 10 bytes, only 3 follow.
        let mut wire = 10u32.to_be_bytes().to_vec();
        wire.extend_from_slice(b"abc");
        let mut cursor = Cursor::new(wire);
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn back_to_back_frames_keep_their_boundaries() {
        let frames: [&[u8]; 3] = [b"handshake", b"", b"bundle"];
        let mut buf = Vec::new();
        for frame in frames {
            write_message(&mut buf, frame).unwrap();
        }
        let mut cursor = Cursor::new(&buf);
        for expected in frames {
            assert_eq!(read_message(&mut cursor).unwrap(), expected);
        }
    }
}
