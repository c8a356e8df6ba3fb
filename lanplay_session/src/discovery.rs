// LAN discovery: the host-side beacon and the client-side listener.
//
// A hosting node runs a `Beacon` thread that sends one `MAGIC|count|port|label`
// datagram to the discovery port every beacon interval. Any number of
// `DiscoveryListener`s on the LAN bind that port (with address reuse, so a
// host and a browser can share a machine), parse what arrives and keep a
// `ServerDirectory` keyed by (sender IP, advertised port).
//
// The directory is soft state: an entry only lives as long as beacons keep
// coming. Every receive cycle (a datagram or the read timeout, whichever comes
// first) drops entries older than the staleness window, and snapshots filter
// again at read time so a caller never sees a listing past its window even if
// the listener thread is between cycles.
//
// Both background threads own a stop signal checked on every cycle and are
// joined by `stop()`, which is also what `Drop` does.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lanplay_protocol::BeaconMessage;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::lock;

/// Largest beacon datagram we bother reading; longer ones are truncated by the
/// OS and then usually fail to parse.
const DATAGRAM_BUFFER: usize = 512;

/// One advertised host, as last heard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerListing {
    pub address: IpAddr,
    /// The host's TCP session port (from the beacon body).
    pub port: u16,
    pub player_count: u32,
    pub label: String,
    pub last_seen_at: Instant,
}

impl ServerListing {
    /// Where to connect to join this host.
    pub fn session_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Single-line form for server browsers: `label @ ip:port (n players)`.
    pub fn display_line(&self) -> String {
        format!(
            "{} @ {} ({} players)",
            self.label,
            self.session_addr(),
            self.player_count
        )
    }
}

/// Live hosts keyed by (IP, advertised port).
#[derive(Debug)]
pub struct ServerDirectory {
    staleness: Duration,
    entries: HashMap<(IpAddr, u16), ServerListing>,
}

impl ServerDirectory {
    pub fn new(staleness: Duration) -> Self {
        Self {
            staleness,
            entries: HashMap::new(),
        }
    }

    /// Record a beacon heard from `sender` at `now`. Replaces any previous
    /// entry for the same host and port.
    pub fn upsert(&mut self, sender: IpAddr, beacon: BeaconMessage, now: Instant) {
        let listing = ServerListing {
            address: sender,
            port: beacon.port,
            player_count: beacon.player_count,
            label: beacon.label,
            last_seen_at: now,
        };
        self.entries.insert((sender, beacon.port), listing);
    }

    /// Forget every entry older than the staleness window. An entry exactly at
    /// the boundary stays.
    pub fn prune(&mut self, now: Instant) {
        let staleness = self.staleness;
        self.entries
            .retain(|_, listing| now.saturating_duration_since(listing.last_seen_at) <= staleness);
    }

    /// Fresh entries as of `now`, ordered by address then port.
    pub fn snapshot_at(&self, now: Instant) -> Vec<ServerListing> {
        let mut list: Vec<ServerListing> = self
            .entries
            .values()
            .filter(|listing| now.saturating_duration_since(listing.last_seen_at) <= self.staleness)
            .cloned()
            .collect();
        list.sort_by(|a, b| (a.address, a.port).cmp(&(b.address, b.port)));
        list
    }

    pub fn snapshot(&self) -> Vec<ServerListing> {
        self.snapshot_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodic host announcement.
pub struct Beacon {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Beacon {
    /// Start announcing `session_port`. `player_count` is sampled on every
    /// send so the advertised count follows the server's registry.
    pub fn start(
        config: &SessionConfig,
        session_port: u16,
        player_count: impl Fn() -> usize + Send + 'static,
    ) -> Result<Self> {
        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let socket =
            UdpSocket::bind(local).map_err(|source| SessionError::Bind { addr: local, source })?;
        socket.set_broadcast(true)?;

        let target = SocketAddr::new(config.beacon_target, config.discovery_port);
        let magic = config.magic.clone();
        let label = config.label.clone();
        let interval = config.beacon_interval();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("lanplay-beacon".into())
            .spawn(move || {
                info!(%target, session_port, "beacon started");
                loop {
                    let beacon = BeaconMessage {
                        player_count: u32::try_from(player_count()).unwrap_or(u32::MAX),
                        port: session_port,
                        label: label.clone(),
                    };
                    let text = beacon.encode(&magic);
                    match socket.send_to(text.as_bytes(), target) {
                        Ok(_) => trace!(%text, "beacon sent"),
                        // A missing route must not kill the beacon; the
                        // network may come back.
                        Err(e) => trace!(%target, "beacon send failed: {e}"),
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("beacon stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop announcing and join the thread. Idempotent.
    pub fn stop(&mut self) {
        // Dropping the sender wakes the thread out of its interval wait.
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Beacon {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Background listener maintaining a `ServerDirectory`.
pub struct DiscoveryListener {
    running: Arc<AtomicBool>,
    directory: Arc<Mutex<ServerDirectory>>,
    local_addr: SocketAddr,
    thread: Option<JoinHandle<()>>,
}

impl DiscoveryListener {
    pub fn start(config: &SessionConfig) -> Result<Self> {
        let socket = bind_discovery_socket(config.discovery_port).map_err(|source| {
            SessionError::Bind {
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.discovery_port),
                source,
            }
        })?;
        socket.set_read_timeout(Some(config.listen_timeout()))?;
        let local_addr = socket.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let directory = Arc::new(Mutex::new(ServerDirectory::new(config.staleness())));
        let magic = config.magic.clone();

        let thread_running = running.clone();
        let thread_directory = directory.clone();
        let thread = thread::Builder::new()
            .name("lanplay-discovery".into())
            .spawn(move || listen_loop(socket, &magic, &thread_running, &thread_directory))?;

        info!(%local_addr, "discovery listener started");
        Ok(Self {
            running,
            directory,
            local_addr,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Hosts heard within the staleness window, ordered by address.
    pub fn snapshot(&self) -> Vec<ServerListing> {
        let now = Instant::now();
        let mut directory = lock(&self.directory);
        directory.prune(now);
        directory.snapshot_at(now)
    }

    /// Stop listening and join the thread. Returns within one read timeout.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DiscoveryListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen_loop(
    socket: UdpSocket,
    magic: &str,
    running: &AtomicBool,
    directory: &Mutex<ServerDirectory>,
) {
    let mut buf = [0u8; DATAGRAM_BUFFER];
    while running.load(Ordering::SeqCst) {
        let received = socket.recv_from(&mut buf);
        let now = Instant::now();
        let mut directory = lock(directory);
        match received {
            Ok((len, from)) => match BeaconMessage::parse_datagram(&buf[..len], magic) {
                Some(beacon) => {
                    trace!(%from, port = beacon.port, "beacon heard");
                    directory.upsert(from.ip(), beacon, now);
                }
                None => trace!(%from, len, "ignoring foreign datagram"),
            },
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                warn!("discovery receive failed: {e}");
            }
        }
        directory.prune(now);
    }
    debug!("discovery listener stopped");
}

/// Bind a UDP socket on `0.0.0.0:port` with address reuse enabled, so several
/// listeners (and a listener next to a host) can share the discovery port.
pub(crate) fn bind_discovery_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).into())?;
    Ok(socket.into())
}
