// End-to-end integration tests for LAN sessions.
//
// Each test starts real hosts (session server + beacon) on loopback and
// connects real `SessionClient`s (via `TestPeer`), covering discovery,
// the handshake bootstrap and relay fan-out together.

use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use lanplay_protocol::{BeaconMessage, ChatMessage, Packet};
use lanplay_session::{
    Arbitrator, ContentCatalog, DiscoveryListener, HostSession, OnlineMode, SessionConfig,
    SessionServer,
};
use multiplayer_tests::{POLL_TIMEOUT, TestPeer, test_config, wait_until};

fn catalog(config: &SessionConfig) -> ContentCatalog {
    ContentCatalog::from_config(&config.content)
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new("127.0.0.1".parse().unwrap(), port)
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[test]
fn update_fans_out_to_every_other_client() {
    let config = test_config("Host");
    let server = SessionServer::start(&config, catalog(&config)).unwrap();
    let peers: Vec<TestPeer> = (0..5)
        .map(|i| TestPeer::connect(server.local_addr(), &format!("P{i}")))
        .collect();
    for peer in &peers {
        peer.poll_until_welcomed();
    }
    assert_eq!(server.client_count(), 5);

    peers[0].send_position(10.0, 20.0);
    for peer in &peers[1..] {
        let got = peer.poll_updates(1);
        assert_eq!(got[0].name, "P0");
        assert_eq!((got[0].x, got[0].y), (10.0, 20.0));
    }
    peers[0].assert_no_updates(Duration::from_millis(200));
    server.stop();
}

#[test]
fn chat_is_relayed_like_any_other_packet() {
    let config = test_config("Host");
    let server = SessionServer::start(&config, catalog(&config)).unwrap();
    let ann = TestPeer::connect(server.local_addr(), "Ann");
    let bob = TestPeer::connect(server.local_addr(), "Bob");
    ann.poll_until_welcomed();
    bob.poll_until_welcomed();

    ann.send(&Packet::Chat(ChatMessage {
        from: "Ann".into(),
        text: "meet at the castle".into(),
    }));
    let mut chat = Vec::new();
    wait_until("chat", || {
        chat.extend(bob.client().drain_chat());
        !chat.is_empty()
    });
    assert_eq!(chat[0].text, "meet at the castle");
    server.stop();
}

#[test]
fn peer_dropping_mid_broadcast_does_not_disturb_others() {
    let config = test_config("Host");
    let server = SessionServer::start(&config, catalog(&config)).unwrap();
    let ann = TestPeer::connect(server.local_addr(), "Ann");
    let bob = TestPeer::connect(server.local_addr(), "Bob");
    let cat = TestPeer::connect(server.local_addr(), "Cat");
    for peer in [&ann, &bob, &cat] {
        peer.poll_until_welcomed();
    }

    for i in 0..20 {
        ann.send_position(i as f32, 0.0);
        if i == 5 {
            cat.disconnect();
        }
    }

    let got = bob.poll_updates(20);
    let xs: Vec<f32> = got.iter().map(|s| s.x).collect();
    assert_eq!(xs, (0..20).map(|i| i as f32).collect::<Vec<_>>());
    wait_until("Cat's removal", || server.client_count() == 2);
    assert!(ann.client().is_connected());
    assert!(bob.client().is_connected());
    server.stop();
}

#[test]
fn server_stop_disconnects_clients() {
    let config = test_config("Host");
    let server = SessionServer::start(&config, catalog(&config)).unwrap();
    let ann = TestPeer::connect(server.local_addr(), "Ann");
    ann.poll_until_welcomed();

    server.stop();
    ann.poll_until_disconnected();
    // Sends after the host is gone are silently dropped.
    ann.send_position(1.0, 1.0);
}

#[test]
fn concurrent_senders_reach_one_sink_in_order() {
    const SENDERS: usize = 6;
    const PER_SENDER: usize = 300;

    let config = test_config("Host");
    let server = SessionServer::start(&config, catalog(&config)).unwrap();
    let sink = TestPeer::connect(server.local_addr(), "Sink");
    let senders: Vec<TestPeer> = (0..SENDERS)
        .map(|i| TestPeer::connect(server.local_addr(), &format!("S{i}")))
        .collect();
    sink.poll_until_welcomed();
    for peer in &senders {
        peer.poll_until_welcomed();
    }

    thread::scope(|scope| {
        for peer in &senders {
            scope.spawn(move || {
                for i in 0..PER_SENDER {
                    peer.send_position(i as f32, 0.0);
                }
            });
        }
    });

    let got = sink.poll_updates(SENDERS * PER_SENDER);
    // Interleaving across senders is arbitrary; each sender's own order holds.
    for peer in &senders {
        let xs: Vec<f32> = got
            .iter()
            .filter(|s| s.name == peer.name)
            .map(|s| s.x)
            .collect();
        assert_eq!(xs, (0..PER_SENDER).map(|i| i as f32).collect::<Vec<_>>());
    }
    assert!(sink.client().is_connected());
    assert_eq!(server.client_count(), SENDERS + 1);
    server.stop();
}

#[test]
fn stop_while_clients_are_sending() {
    let config = test_config("Host");
    let mut host = HostSession::start(&config, catalog(&config)).unwrap();
    let addr = host.local_addr();
    let sink = TestPeer::connect(addr, "Sink");
    let senders: Vec<TestPeer> = (0..4)
        .map(|i| TestPeer::connect(addr, &format!("S{i}")))
        .collect();
    sink.poll_until_welcomed();
    for peer in &senders {
        peer.poll_until_welcomed();
    }
    assert_eq!(host.server().connection_ids().len(), 5);

    thread::scope(|scope| {
        for peer in &senders {
            scope.spawn(move || {
                let mut x = 0.0;
                while peer.client().is_connected() {
                    peer.send_position(x, 0.0);
                    x += 1.0;
                }
            });
        }

        wait_until("traffic", || !sink.client().drain_received().is_empty());
        let start = Instant::now();
        host.server().stop();
        assert!(start.elapsed() < POLL_TIMEOUT, "stop took {:?}", start.elapsed());
        assert!(!host.server().is_running());
        assert!(host.server().connection_ids().is_empty());

        // The sender loops only end once their clients see the disconnect.
        sink.poll_until_disconnected();
        for peer in &senders {
            peer.poll_until_disconnected();
        }
    });

    assert_eq!(host.client_count(), 0);
    host.stop();
}

// ---------------------------------------------------------------------------
// Discovery and arbitration
// ---------------------------------------------------------------------------

#[test]
fn listener_sees_host_and_its_player_count() {
    let config = SessionConfig {
        label: "Castle Run".into(),
        ..test_config("Host")
    };
    let listener = DiscoveryListener::start(&config).unwrap();
    let mut host = HostSession::start(&config, catalog(&config)).unwrap();
    let port = host.local_addr().port();

    wait_until("host listing", || {
        listener
            .snapshot()
            .iter()
            .any(|l| l.port == port && l.player_count == 0)
    });

    let ann = TestPeer::connect(loopback(port), "Ann");
    ann.poll_until_welcomed();
    wait_until("player count 1", || {
        listener
            .snapshot()
            .iter()
            .any(|l| l.port == port && l.player_count == 1 && l.label == "Castle Run")
    });
    host.stop();
}

#[test]
fn arbitrator_joins_an_advertised_host() {
    let config = test_config("Host");
    let mut host = HostSession::start(&config, catalog(&config)).unwrap();

    let joiner_config = SessionConfig {
        player_name: "Bob".into(),
        ..config.clone()
    };
    let start = Instant::now();
    let online = Arbitrator::new(joiner_config.clone(), catalog(&joiner_config))
        .discover()
        .unwrap();
    // A host answering within the window ends discovery early.
    assert!(
        start.elapsed() < joiner_config.discovery_timeout() + joiner_config.connect_timeout(),
        "discover took {:?}",
        start.elapsed()
    );
    assert_eq!(online.mode, OnlineMode::Joined);
    assert!(online.host.is_none());
    assert_eq!(online.client.peer_addr().port(), host.local_addr().port());

    let bob = TestPeer::from_client("Bob", online.client);
    let (info, _) = bob.poll_until_welcomed();
    assert_eq!(info.session_id, "MarioLive");
    wait_until("registration", || host.client_count() == 1);
    host.stop();
}

#[test]
fn arbitrator_hosts_when_alone_and_second_node_joins() {
    let config = test_config("Ann");
    let first = Arbitrator::new(config.clone(), catalog(&config))
        .discover()
        .unwrap();
    assert_eq!(first.mode, OnlineMode::Hosting);
    let host = first.host.as_ref().unwrap();
    let host_port = host.local_addr().port();
    let ann = TestPeer::from_client("Ann", first.client);
    ann.poll_until_welcomed();

    let bob_config = SessionConfig {
        player_name: "Bob".into(),
        ..config.clone()
    };
    let second = Arbitrator::new(bob_config.clone(), catalog(&bob_config))
        .discover()
        .unwrap();
    assert_eq!(second.mode, OnlineMode::Joined);
    assert_eq!(second.client.peer_addr().port(), host_port);
    let bob = TestPeer::from_client("Bob", second.client);
    bob.poll_until_welcomed();
    wait_until("both registered", || host.client_count() == 2);

    bob.send_position(3.0, 4.0);
    assert_eq!(ann.poll_updates(1)[0].name, "Bob");
    ann.send_position(5.0, 6.0);
    assert_eq!(bob.poll_updates(1)[0].name, "Ann");

    bob.disconnect();
    ann.disconnect();
}

#[test]
fn end_to_end_bootstrap() {
    let config = SessionConfig {
        magic: "MAGIC".into(),
        label: "HostLabel".into(),
        ..test_config("Ann")
    };
    let probe = UdpSocket::bind(loopback(config.discovery_port)).unwrap();
    probe.set_read_timeout(Some(POLL_TIMEOUT)).unwrap();

    let mut host = HostSession::start(&config, catalog(&config)).unwrap();
    let port = host.local_addr().port();

    let mut buf = [0u8; 512];
    let (len, _) = probe.recv_from(&mut buf).unwrap();
    let text = std::str::from_utf8(&buf[..len]).unwrap();
    assert_eq!(text, format!("MAGIC|0|{port}|HostLabel"));
    assert_eq!(
        BeaconMessage::parse(text, "MAGIC"),
        Some(BeaconMessage {
            player_count: 0,
            port,
            label: "HostLabel".into(),
        })
    );

    let ann = TestPeer::connect(loopback(port), "Ann");
    let (info, bundle) = ann.poll_until_welcomed();
    assert_eq!(info.server_name, config.server_name);
    assert_eq!(info.version, "1.0");
    assert_eq!(
        bundle.levels(),
        &["Town", "Dungeon", "Castle"].map(String::from)
    );
    assert_eq!(host.client_count(), 1);

    host.stop();
    ann.poll_until_disconnected();
}
