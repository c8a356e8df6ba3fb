// Auto-online: join a host on the LAN if one is advertising, otherwise host.
//
// 1. Bind the discovery port and wait up to the discovery window for a valid
//    beacon. Foreign datagrams are skipped; the window is a single deadline,
//    not reset per datagram.
// 2. Beacon heard: connect to (sender IP, advertised port). Success means
//    `Joined`.
// 3. Nothing heard, the discovery port could not be bound, or the join failed:
//    start a `HostSession` and connect a local client to it. That is
//    `Hosting`.
//
// Two nodes that start inside the same window will both host. With
// `host_fallback_jitter_ms` set, step 3 first sleeps a random fraction of the
// jitter and listens once more, which usually lets the later node see the
// earlier one's beacon. The default of 0 skips this.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::{Duration, Instant};

use lanplay_protocol::BeaconMessage;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::client::SessionClient;
use crate::config::SessionConfig;
use crate::content::ContentCatalog;
use crate::discovery::bind_discovery_socket;
use crate::error::Result;
use crate::host::HostSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnlineMode {
    Hosting,
    Joined,
}

/// Result of `Arbitrator::discover`. `host` is set only when hosting.
pub struct OnlineSession {
    pub mode: OnlineMode,
    pub client: SessionClient,
    pub host: Option<HostSession>,
}

impl OnlineSession {
    /// Disconnect the local client and stop the host, if any.
    pub fn shutdown(mut self) {
        self.client.disconnect();
        if let Some(host) = self.host.as_mut() {
            host.stop();
        }
    }
}

pub struct Arbitrator {
    config: SessionConfig,
    catalog: ContentCatalog,
}

impl Arbitrator {
    pub fn new(config: SessionConfig, catalog: ContentCatalog) -> Self {
        Self { config, catalog }
    }

    /// Decide between joining and hosting. Only a failure to host is an error.
    pub fn discover(&self) -> Result<OnlineSession> {
        if let Some(session) = self.join_advertised(self.config.discovery_timeout()) {
            return Ok(session);
        }

        let jitter_ms = self.config.host_fallback_jitter_ms;
        if jitter_ms > 0 {
            let backoff = Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms));
            debug!(?backoff, "no host found, backing off before hosting");
            thread::sleep(backoff);
            if let Some(session) = self.join_advertised(self.config.beacon_interval() * 2) {
                return Ok(session);
            }
        }

        self.host()
    }

    fn join_advertised(&self, window: Duration) -> Option<OnlineSession> {
        let addr = self.listen_for_host(window)?;
        match self.join(addr) {
            Ok(session) => {
                info!(%addr, "joined LAN session");
                Some(session)
            }
            Err(e) => {
                warn!(%addr, "join failed, falling back to hosting: {e}");
                None
            }
        }
    }

    /// Wait up to `window` for the first valid beacon and return the session
    /// address it advertises.
    pub fn listen_for_host(&self, window: Duration) -> Option<SocketAddr> {
        let socket = match bind_discovery_socket(self.config.discovery_port) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(port = self.config.discovery_port, "cannot listen for hosts: {e}");
                return None;
            }
        };
        let deadline = Instant::now() + window;
        let mut buf = [0u8; 512];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(?window, "no beacon within discovery window");
                return None;
            }
            if let Err(e) = socket.set_read_timeout(Some(remaining)) {
                warn!("cannot set discovery timeout: {e}");
                return None;
            }
            match socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if let Some(beacon) = BeaconMessage::parse_datagram(&buf[..len], &self.config.magic)
                    {
                        debug!(%from, label = %beacon.label, "found host");
                        return Some(SocketAddr::new(from.ip(), beacon.port));
                    }
                }
                // Timeout, or some transient receive error: re-check the
                // deadline.
                Err(e) => debug!("discovery receive: {e}"),
            }
        }
    }

    /// Join a specific host, skipping discovery.
    pub fn join(&self, addr: SocketAddr) -> Result<OnlineSession> {
        let client = SessionClient::connect(
            addr,
            &self.config.player_name,
            &self.config.client_version,
            self.config.connect_timeout(),
        )?;
        Ok(OnlineSession {
            mode: OnlineMode::Joined,
            client,
            host: None,
        })
    }

    /// Host unconditionally: start a server and beacon, then connect to it.
    pub fn host(&self) -> Result<OnlineSession> {
        let host = HostSession::start(&self.config, self.catalog.clone())?;
        let bound = host.local_addr();
        let ip = if bound.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            bound.ip()
        };
        let local = SocketAddr::new(ip, bound.port());
        let client = SessionClient::connect(
            local,
            &self.config.player_name,
            &self.config.client_version,
            self.config.connect_timeout(),
        )?;
        info!(port = local.port(), "hosting LAN session");
        Ok(OnlineSession {
            mode: OnlineMode::Hosting,
            client,
            host: Some(host),
        })
    }
}
