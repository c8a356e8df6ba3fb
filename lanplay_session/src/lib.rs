// lanplay_session — LAN discovery and session networking for LAN Play.
//
// A node either hosts (session server + discovery beacon) or joins a host it
// heard advertised on the LAN. Everything runs on plain `std::net` blocking
// sockets with one thread per blocking loop; there is no async runtime.
//
// Module overview:
// - `config.rs`:     `SessionConfig`: ports, timings, identity, content. JSON
//                    file plus `LANPLAY_*` environment overrides.
// - `error.rs`:      `SessionError`, the error type of every fallible call.
// - `content.rs`:    `ContentCatalog`, the host's level metadata, turned into a
//                    `GameBundle` for each joining peer.
// - `discovery.rs`:  UDP `Beacon` (host side), `DiscoveryListener` and the
//                    staleness-pruned `ServerDirectory` (browser side).
// - `server.rs`:     `SessionServer`: accept loop, per-peer handler threads,
//                    handshake answers and relay fan-out.
// - `client.rs`:     `SessionClient`: handshake, background reader, inboxes.
// - `host.rs`:       `HostSession` = server + beacon.
// - `arbitrator.rs`: Auto-online: join an advertised host or become one.
// - `session.rs`:    `SessionContext`, the game loop's handle on all of the
//                    above, and the read-only `SessionStatus`.
//
// Dependencies: `lanplay_protocol` for packets, framing and the beacon text
// format. Logging goes through `tracing`; the library never installs a
// subscriber, the `lanplay` binary does.

pub mod arbitrator;
pub mod client;
pub mod config;
pub mod content;
pub mod discovery;
pub mod error;
pub mod host;
pub mod server;
pub mod session;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use arbitrator::{Arbitrator, OnlineMode, OnlineSession};
pub use client::SessionClient;
pub use config::{ContentConfig, SessionConfig};
pub use content::ContentCatalog;
pub use discovery::{Beacon, DiscoveryListener, ServerDirectory, ServerListing};
pub use error::{Result, SessionError};
pub use host::HostSession;
pub use server::{ConnectionId, ConnectionPhase, ConnectionSummary, SessionServer};
pub use session::{CHAT_BACKLOG, SessionContext, SessionMode, SessionStatus};

/// Lock a mutex, recovering the data if another thread panicked while
/// holding it. Every guarded structure here stays consistent between
/// statements, so a poisoned lock carries no torn state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
