// Error taxonomy for the session layer.
//
// None of these are fatal to the process. `Bind` and `Connect` go back to
// whoever called `start()`/`connect()` so they can fall back (the arbitrator
// turns a failed join into hosting) or show "not connected". Transport
// errors that happen after a connection is up never reach callers at all:
// the affected connection tears itself down and the rest keeps running.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use lanplay_protocol::EncodeError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A listening socket could not be bound (usually: port already in use).
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    /// The host refused or did not answer the TCP connect.
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
