// TCP client side of a session.
//
// `connect()` opens the socket, sends the Handshake and spawns a background
// reader thread; it does not wait for the answer. The reader stores the
// HANDSHAKE_ACK's `ServerInfo` and the DOWNLOAD_BUNDLE's `GameBundle` as they
// arrive and pushes PLAYER_UPDATE and CHAT packets into `mpsc` inboxes, which
// the game loop drains without blocking.
//
// Sending goes through a writer mutex so any thread may call `send()`. When
// disconnected the writer slot is empty and `send()` does nothing.
//
// Teardown is triggered by `disconnect()`, a failed write, or a transport
// error in the reader. All three go through `ClientShared::close`, which is
// idempotent: it clears the connected flag, drops the writer and shuts the
// socket down, which in turn unblocks the reader.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lanplay_protocol::{
    ChatMessage, GameBundle, Handshake, Packet, PlayerState, ReadError, ServerInfo, read_packet,
    write_packet,
};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::lock;

struct ClientShared {
    connected: AtomicBool,
    writer: Mutex<Option<BufWriter<TcpStream>>>,
    /// Handle used only to shut the socket down.
    control: TcpStream,
    server_info: Mutex<Option<ServerInfo>>,
    bundle: Mutex<Option<GameBundle>>,
}

impl ClientShared {
    fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("client closing");
        }
        lock(&self.writer).take();
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

/// Client connection to a session server.
pub struct SessionClient {
    shared: Arc<ClientShared>,
    player_inbox: Mutex<Receiver<PlayerState>>,
    chat_inbox: Mutex<Receiver<ChatMessage>>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
    peer_addr: SocketAddr,
}

impl SessionClient {
    /// Connect to a host and send the Handshake.
    pub fn connect(
        addr: SocketAddr,
        player_name: &str,
        client_version: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| SessionError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeout))?;
        let peer_addr = stream.peer_addr()?;

        let mut writer = BufWriter::new(stream.try_clone()?);
        let reader = BufReader::new(stream.try_clone()?);

        let handshake = Packet::Handshake(Handshake {
            player_name: player_name.into(),
            client_version: client_version.into(),
        });
        write_packet(&mut writer, &handshake)?;

        let shared = Arc::new(ClientShared {
            connected: AtomicBool::new(true),
            writer: Mutex::new(Some(writer)),
            control: stream,
            server_info: Mutex::new(None),
            bundle: Mutex::new(None),
        });

        let (player_tx, player_rx) = mpsc::channel();
        let (chat_tx, chat_rx) = mpsc::channel();
        let reader_shared = shared.clone();
        let reader_thread = thread::Builder::new()
            .name("lanplay-client-reader".into())
            .spawn(move || reader_loop(reader, &reader_shared, &player_tx, &chat_tx))?;

        info!(%peer_addr, player = player_name, "connected to host");
        Ok(Self {
            shared,
            player_inbox: Mutex::new(player_rx),
            chat_inbox: Mutex::new(chat_rx),
            reader_thread: Mutex::new(Some(reader_thread)),
            peer_addr,
        })
    }

    /// Send one packet. A no-op when disconnected; a failed write disconnects.
    pub fn send(&self, packet: &Packet) {
        let mut writer = lock(&self.shared.writer);
        let Some(stream) = writer.as_mut() else {
            return;
        };
        if let Err(e) = write_packet(stream, packet) {
            warn!(peer = %self.peer_addr, "send failed, disconnecting: {e}");
            drop(writer);
            self.shared.close();
        }
    }

    pub fn send_player_state(&self, state: &PlayerState) {
        self.send(&Packet::PlayerUpdate(state.clone()));
    }

    /// Close the connection and wait for the reader. Idempotent.
    pub fn disconnect(&self) {
        self.shared.close();
        let handle = lock(&self.reader_thread).take();
        if let Some(handle) = handle {
            // Never join from the reader thread itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// All PLAYER_UPDATEs received since the last call, oldest first.
    pub fn drain_received(&self) -> Vec<PlayerState> {
        lock(&self.player_inbox).try_iter().collect()
    }

    pub fn drain_chat(&self) -> Vec<ChatMessage> {
        lock(&self.chat_inbox).try_iter().collect()
    }

    /// The host's HANDSHAKE_ACK, once it has arrived.
    pub fn server_info(&self) -> Option<ServerInfo> {
        lock(&self.shared.server_info).clone()
    }

    /// The host's DOWNLOAD_BUNDLE, once it has arrived.
    pub fn bundle(&self) -> Option<GameBundle> {
        lock(&self.shared.bundle).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn reader_loop(
    mut reader: BufReader<TcpStream>,
    shared: &ClientShared,
    player_tx: &Sender<PlayerState>,
    chat_tx: &Sender<ChatMessage>,
) {
    while shared.connected.load(Ordering::SeqCst) {
        match read_packet(&mut reader) {
            Ok(Packet::HandshakeAck(info)) => {
                info!(server = %info.server_name, session = %info.session_id, "handshake acknowledged");
                *lock(&shared.server_info) = Some(info);
            }
            Ok(Packet::DownloadBundle(bundle)) => {
                debug!(levels = bundle.levels().len(), "received game bundle");
                *lock(&shared.bundle) = Some(bundle);
            }
            Ok(Packet::PlayerUpdate(state)) => {
                // The receiver only goes away with the client itself.
                let _ = player_tx.send(state);
            }
            Ok(Packet::Chat(chat)) => {
                let _ = chat_tx.send(chat);
            }
            Ok(other) => {
                debug!(packet_type = %other.packet_type(), "ignoring packet");
            }
            Err(ReadError::Decode(e)) => {
                warn!("dropping undecodable packet from host: {e}");
            }
            Err(ReadError::Transport(e)) => {
                debug!("host connection closed: {e}");
                break;
            }
        }
    }
    shared.close();
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Instant;

    use lanplay_protocol::{Facing, write_message};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    /// A fake host: accepts one connection and returns its reader and writer.
    fn accept_one(listener: &TcpListener) -> (BufReader<TcpStream>, BufWriter<TcpStream>) {
        let (stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        (reader, BufWriter::new(stream))
    }

    #[test]
    fn connect_sends_handshake_and_stores_ack_and_bundle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = SessionClient::connect(addr, "Ann", "1.0", TIMEOUT).unwrap();
        let (mut reader, mut writer) = accept_one(&listener);

        assert_eq!(
            read_packet(&mut reader).unwrap(),
            Packet::Handshake(Handshake {
                player_name: "Ann".into(),
                client_version: "1.0".into(),
            })
        );

        let info = ServerInfo {
            server_name: "LAN Host".into(),
            version: "1.0".into(),
            session_id: "MarioLive".into(),
        };
        write_packet(&mut writer, &Packet::HandshakeAck(info.clone())).unwrap();
        write_packet(
            &mut writer,
            &Packet::DownloadBundle(GameBundle::new("MarioLive", vec!["Town".into()], "hi")),
        )
        .unwrap();

        assert!(wait_for(|| client.bundle().is_some()));
        assert_eq!(client.server_info(), Some(info));
        assert_eq!(client.bundle().unwrap().motd(), "hi");
        assert_eq!(client.peer_addr(), addr);
    }

    #[test]
    fn player_updates_and_chat_are_queued_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client =
            SessionClient::connect(listener.local_addr().unwrap(), "Ann", "1.0", TIMEOUT).unwrap();
        let (_reader, mut writer) = accept_one(&listener);

        for x in 0..3 {
            let mut state = PlayerState::new("Bob", x as f32, 0.0);
            state.facing = Facing::Left;
            write_packet(&mut writer, &Packet::PlayerUpdate(state)).unwrap();
        }
        write_packet(
            &mut writer,
            &Packet::Chat(ChatMessage {
                from: "Bob".into(),
                text: "hello".into(),
            }),
        )
        .unwrap();

        let mut received = Vec::new();
        assert!(wait_for(|| {
            received.extend(client.drain_received());
            received.len() == 3
        }));
        let xs: Vec<f32> = received.iter().map(|s| s.x).collect();
        assert_eq!(xs, [0.0, 1.0, 2.0]);
        assert!(wait_for(|| !client.drain_chat().is_empty()));
    }

    #[test]
    fn garbage_frame_is_dropped_and_connection_survives() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client =
            SessionClient::connect(listener.local_addr().unwrap(), "Ann", "1.0", TIMEOUT).unwrap();
        let (_reader, mut writer) = accept_one(&listener);

        write_message(&mut writer, b"{\"type\":\"NOPE\"}").unwrap();
        write_packet(
            &mut writer,
            &Packet::PlayerUpdate(PlayerState::new("Bob", 1.0, 2.0)),
        )
        .unwrap();

        assert!(wait_for(|| !client.drain_received().is_empty()));
        assert!(client.is_connected());
    }

    #[test]
    fn host_closing_disconnects_client() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client =
            SessionClient::connect(listener.local_addr().unwrap(), "Ann", "1.0", TIMEOUT).unwrap();
        let (reader, writer) = accept_one(&listener);
        drop(reader);
        drop(writer);

        assert!(wait_for(|| !client.is_connected()));
        // Sending while disconnected is silently ignored.
        client.send_player_state(&PlayerState::new("Ann", 0.0, 0.0));
        client.disconnect();
        client.disconnect();
    }

    #[test]
    fn connect_to_closed_port_is_a_connect_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let err = SessionClient::connect(addr, "Ann", "1.0", Duration::from_millis(500))
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Connect { .. }));
    }
}
