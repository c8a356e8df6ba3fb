// Test-only peer for LAN session integration tests.
//
// Wraps the real `SessionClient` (from `lanplay_session::client`) with a
// synchronous, test-friendly API: blocking "poll until" helpers around the
// client's non-blocking inboxes, each bounded by a 5 s timeout. All
// networking goes through the same code paths as the game.
//
// Also provides `test_config()`, a `SessionConfig` that keeps everything on
// loopback (server on 127.0.0.1, port 0; beacons aimed at 127.0.0.1 on a
// freshly probed discovery port) so tests run side by side without a
// broadcast route.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use lanplay_protocol::{GameBundle, Packet, PlayerState, ServerInfo};
use lanplay_session::{SessionClient, SessionConfig};

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A UDP port that was free a moment ago.
pub fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .and_then(|socket| socket.local_addr())
        .expect("probe UDP port")
        .port()
}

/// Loopback-only config with short timings.
pub fn test_config(player_name: &str) -> SessionConfig {
    SessionConfig {
        bind_addr: "127.0.0.1".parse().expect("loopback"),
        session_port: 0,
        discovery_port: free_udp_port(),
        beacon_target: "127.0.0.1".parse().expect("loopback"),
        beacon_interval_ms: 50,
        listen_timeout_ms: 100,
        discovery_timeout_ms: 500,
        player_name: player_name.into(),
        ..SessionConfig::default()
    }
}

/// Block until `cond` holds; panics naming `what` after `POLL_TIMEOUT`.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
        thread::sleep(POLL_INTERVAL);
    }
}

/// A test peer wrapping a real `SessionClient`.
pub struct TestPeer {
    pub name: String,
    client: SessionClient,
}

impl TestPeer {
    /// Connect and send the handshake (does not wait for the answer).
    pub fn connect(addr: SocketAddr, name: &str) -> Self {
        let client = SessionClient::connect(addr, name, "1.0", POLL_TIMEOUT)
            .expect("TestPeer::connect failed");
        Self::from_client(name, client)
    }

    pub fn from_client(name: &str, client: SessionClient) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Send a PLAYER_UPDATE for this peer at `(x, y)`.
    pub fn send_position(&self, x: f32, y: f32) {
        self.client
            .send_player_state(&PlayerState::new(self.name.clone(), x, y));
    }

    pub fn send(&self, packet: &Packet) {
        self.client.send(packet);
    }

    /// Blocking poll until both the HANDSHAKE_ACK and the DOWNLOAD_BUNDLE
    /// have arrived.
    pub fn poll_until_welcomed(&self) -> (ServerInfo, GameBundle) {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "{}: timed out waiting for ack and bundle",
                self.name
            );
            if let (Some(info), Some(bundle)) = (self.client.server_info(), self.client.bundle()) {
                return (info, bundle);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocking poll until `count` PLAYER_UPDATEs have been received.
    /// Returns exactly those, in arrival order.
    pub fn poll_updates(&self, count: usize) -> Vec<PlayerState> {
        let start = Instant::now();
        let mut received = Vec::new();
        while received.len() < count {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "{}: timed out with {}/{count} updates",
                self.name,
                received.len()
            );
            received.extend(self.client.drain_received());
            thread::sleep(POLL_INTERVAL);
        }
        assert_eq!(received.len(), count, "{}: too many updates", self.name);
        received
    }

    /// Wait `quiet` and assert no PLAYER_UPDATE arrived meanwhile.
    pub fn assert_no_updates(&self, quiet: Duration) {
        thread::sleep(quiet);
        let received = self.client.drain_received();
        assert!(received.is_empty(), "{}: unexpected {received:?}", self.name);
    }

    pub fn poll_until_disconnected(&self) {
        wait_until(&format!("{} to disconnect", self.name), || {
            !self.client.is_connected()
        });
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }
}
