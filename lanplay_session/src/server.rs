// TCP session server: accepts peers, answers handshakes, relays packets.
//
// Architecture: thread-per-connection with a shared registry.
//
// - **Accept thread**: polls a non-blocking `TcpListener` (50 ms cadence so it
//   notices `stop()`), registers each new socket in the registry and spawns
//   its handler thread.
// - **Handler threads** (one per peer): read one packet at a time. A
//   HANDSHAKE is answered with HANDSHAKE_ACK + DOWNLOAD_BUNDLE and moves the
//   connection to `Relaying`; every other packet from a relaying peer is fanned
//   out to all other registered peers. Decode failures drop the packet; a
//   transport failure ends the handler, which removes its own registry entry.
// - **Registry**: `Mutex<HashMap<ConnectionId, Arc<PeerConnection>>>`. The lock
//   is held only to insert, remove, or clone the recipient list; the writes of
//   a broadcast happen after it is released.
//
// Per-peer write serialization: each `PeerConnection` keeps its `BufWriter`
// behind its own mutex, held for a whole frame including the flush. Two
// handlers relaying to the same peer at once therefore queue up instead of
// interleaving bytes, while writes to different peers proceed independently.
//
// Shutdown: `stop()` clears the shared `running` flag (the cancellation token
// every loop checks), shuts down every registered socket so blocked reads
// return at once, then joins the accept and handler threads.

use std::collections::HashMap;
use std::fmt;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lanplay_protocol::{
    EncodeError, Packet, ReadError, ServerInfo, encode_packet, read_packet, write_message,
    write_packet,
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::content::ContentCatalog;
use crate::error::{Result, SessionError};
use crate::lock;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Transport-level identity of a connection (the peer's socket address).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl From<SocketAddr> for ConnectionId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of one connection. HANDSHAKEN is folded into the step from
/// `Connected` to `Relaying`: the ack and bundle are written before the
/// phase changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connected,
    Relaying,
    Closed,
}

/// Read-only view of a registered connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub phase: ConnectionPhase,
    pub player_name: Option<String>,
}

struct PeerConnection {
    id: ConnectionId,
    writer: Mutex<BufWriter<TcpStream>>,
    /// Handle used only to shut the socket down from other threads.
    control: TcpStream,
    phase: Mutex<ConnectionPhase>,
    player_name: Mutex<Option<String>>,
}

impl PeerConnection {
    fn send_frame(&self, frame: &[u8]) -> std::io::Result<()> {
        let mut writer = lock(&self.writer);
        write_message(&mut *writer, frame)
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        *lock(&self.phase) = phase;
    }

    fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id.clone(),
            phase: *lock(&self.phase),
            player_name: lock(&self.player_name).clone(),
        }
    }

    fn close(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

struct ServerShared {
    running: AtomicBool,
    peers: Mutex<HashMap<ConnectionId, Arc<PeerConnection>>>,
    handlers: Mutex<Vec<JoinHandle<()>>>,
    server_info: ServerInfo,
    catalog: ContentCatalog,
    write_timeout: Duration,
}

impl ServerShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }

    fn remove(&self, id: &ConnectionId) -> Option<Arc<PeerConnection>> {
        lock(&self.peers).remove(id)
    }

    /// Answer a handshake: ServerInfo, then the content bundle. The peer's
    /// writer stays locked across both so no relayed packet lands in between.
    fn welcome(&self, peer: &PeerConnection) -> std::result::Result<(), EncodeError> {
        let ack = Packet::HandshakeAck(self.server_info.clone());
        let bundle = Packet::DownloadBundle(self.catalog.build_bundle(&self.server_info.session_id));
        let mut writer = lock(&peer.writer);
        write_packet(&mut *writer, &ack)?;
        write_packet(&mut *writer, &bundle)?;
        Ok(())
    }

    /// Fan a packet out to every registered peer except `sender`. A peer whose
    /// write fails is evicted; the others are unaffected.
    fn broadcast(&self, packet: &Packet, sender: &ConnectionId) {
        let frame = match encode_packet(packet) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(packet_type = %packet.packet_type(), "cannot encode relay packet: {e}");
                return;
            }
        };
        let recipients: Vec<Arc<PeerConnection>> = lock(&self.peers)
            .values()
            .filter(|peer| peer.id != *sender)
            .cloned()
            .collect();
        for peer in recipients {
            if let Err(e) = peer.send_frame(&frame) {
                warn!(peer = %peer.id, "relay write failed, dropping peer: {e}");
                self.remove(&peer.id);
                peer.close();
            }
        }
    }
}

/// Host-side session server. Cheap to share behind an `Arc`; every method
/// takes `&self`.
pub struct SessionServer {
    shared: Arc<ServerShared>,
    local_addr: SocketAddr,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SessionServer {
    /// Bind the session port and start accepting peers.
    pub fn start(config: &SessionConfig, catalog: ContentCatalog) -> Result<Self> {
        let addr = SocketAddr::new(config.bind_addr, config.session_port);
        let listener =
            TcpListener::bind(addr).map_err(|source| SessionError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shared = Arc::new(ServerShared {
            running: AtomicBool::new(true),
            peers: Mutex::new(HashMap::new()),
            handlers: Mutex::new(Vec::new()),
            server_info: ServerInfo {
                server_name: config.server_name.clone(),
                version: config.client_version.clone(),
                session_id: config.content.game_id.clone(),
            },
            catalog,
            write_timeout: config.write_timeout(),
        });

        let accept_shared = shared.clone();
        let accept_thread = thread::Builder::new()
            .name("lanplay-accept".into())
            .spawn(move || accept_loop(listener, accept_shared))?;

        info!(%local_addr, "session server online");
        Ok(Self {
            shared,
            local_addr,
            accept_thread: Mutex::new(Some(accept_thread)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of registered connections (handshaken or not).
    pub fn client_count(&self) -> usize {
        self.shared.peer_count()
    }

    /// A detached reader of `client_count()`, for the beacon thread.
    pub fn client_counter(&self) -> impl Fn() -> usize + Send + Sync + 'static {
        let shared = self.shared.clone();
        move || shared.peer_count()
    }

    /// Snapshot of the registry, sorted by connection id.
    pub fn connections(&self) -> Vec<ConnectionSummary> {
        let mut list: Vec<ConnectionSummary> = lock(&self.shared.peers)
            .values()
            .map(|peer| peer.summary())
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections().into_iter().map(|c| c.id).collect()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Stop accepting, close every connection and wait for all server threads.
    /// Idempotent.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let peers: Vec<Arc<PeerConnection>> =
            lock(&self.shared.peers).drain().map(|(_, peer)| peer).collect();
        for peer in &peers {
            peer.close();
        }
        if let Some(handle) = lock(&self.accept_thread).take() {
            let _ = handle.join();
        }
        // The accept thread is gone, so no new handler can be pushed past here.
        let handlers = std::mem::take(&mut *lock(&self.shared.handlers));
        let current = thread::current().id();
        for handle in handlers {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        info!(addr = %self.local_addr, "session server stopped");
    }
}

impl Drop for SessionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<ServerShared>) {
    while shared.is_running() {
        match listener.accept() {
            Ok((stream, addr)) => {
                if let Err(e) = admit(&shared, stream, addr) {
                    warn!(%addr, "failed to set up connection: {e}");
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                // Transient (e.g. out of descriptors); keep serving.
                warn!("accept failed: {e}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    debug!("accept loop exited");
}

/// Register a freshly accepted socket and spawn its handler.
fn admit(shared: &Arc<ServerShared>, stream: TcpStream, addr: SocketAddr) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(shared.write_timeout))?;
    let reader = BufReader::new(stream.try_clone()?);
    let writer = BufWriter::new(stream.try_clone()?);

    let peer = Arc::new(PeerConnection {
        id: ConnectionId::from(addr),
        writer: Mutex::new(writer),
        control: stream,
        phase: Mutex::new(ConnectionPhase::Connected),
        player_name: Mutex::new(None),
    });
    lock(&shared.peers).insert(peer.id.clone(), peer.clone());

    // `stop()` may have drained the registry between our running check and
    // the insert above.
    if !shared.is_running() {
        shared.remove(&peer.id);
        peer.close();
        return Ok(());
    }

    let handler_shared = shared.clone();
    let handler_peer = peer.clone();
    let spawned = thread::Builder::new()
        .name(format!("lanplay-peer-{}", addr.port()))
        .spawn(move || connection_loop(handler_shared, handler_peer, reader));
    match spawned {
        Ok(handle) => {
            let mut handlers = lock(&shared.handlers);
            handlers.retain(|h| !h.is_finished());
            handlers.push(handle);
            info!(peer = %peer.id, clients = shared.peer_count(), "peer connected");
            Ok(())
        }
        Err(e) => {
            shared.remove(&peer.id);
            peer.close();
            Err(e)
        }
    }
}

/// Per-connection handler. Runs until the transport fails or the server stops.
fn connection_loop(
    shared: Arc<ServerShared>,
    peer: Arc<PeerConnection>,
    mut reader: BufReader<TcpStream>,
) {
    let mut phase = ConnectionPhase::Connected;
    while shared.is_running() {
        match read_packet(&mut reader) {
            Ok(Packet::Handshake(handshake)) => {
                info!(
                    peer = %peer.id,
                    player = %handshake.player_name,
                    version = %handshake.client_version,
                    "handshake"
                );
                *lock(&peer.player_name) = Some(handshake.player_name);
                if let Err(e) = shared.welcome(&peer) {
                    debug!(peer = %peer.id, "failed to answer handshake: {e}");
                    break;
                }
                phase = ConnectionPhase::Relaying;
                peer.set_phase(phase);
            }
            Ok(packet) if phase == ConnectionPhase::Relaying => {
                shared.broadcast(&packet, &peer.id);
            }
            Ok(packet) => {
                debug!(
                    peer = %peer.id,
                    packet_type = %packet.packet_type(),
                    "dropping packet sent before handshake"
                );
            }
            Err(ReadError::Decode(e)) => {
                warn!(peer = %peer.id, "dropping undecodable packet: {e}");
            }
            Err(ReadError::Transport(e)) => {
                debug!(peer = %peer.id, "connection closed: {e}");
                break;
            }
        }
    }

    peer.set_phase(ConnectionPhase::Closed);
    shared.remove(&peer.id);
    peer.close();
    info!(peer = %peer.id, clients = shared.peer_count(), "peer disconnected");
}
