// Game-loop facing session state.
//
// `SessionContext` is the one object the game loop owns for multiplayer. It
// starts `Offline` and only changes mode through `go_online`, `host`, `join`
// and `go_offline`; there is no other place that decides whether the game is
// networked.
//
// Once online, the loop calls `tick()` once per frame with the local player's
// state. `tick` sends that state, sends a Heartbeat when the heartbeat
// interval has elapsed, and folds every PLAYER_UPDATE received since the last
// tick into `remote_players`, replacing whatever was stored under that name.
// Chat received since the last tick moves into a backlog capped at
// `CHAT_BACKLOG` messages; the oldest are dropped when the UI does not drain.
// If the connection has dropped, `tick` moves the context back to `Offline`
// and keeps the last known remote states out of the next status.
//
// `status()` is a read-only snapshot for UI code (server browser, HUD,
// "connected to ..." banners).

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use lanplay_protocol::{ChatMessage, GameBundle, Heartbeat, Packet, PlayerState, ServerInfo};
use tracing::{debug, info, warn};

use crate::arbitrator::{Arbitrator, OnlineMode, OnlineSession};
use crate::config::SessionConfig;
use crate::error::Result;

/// Chat messages kept between `drain_chat` calls.
pub const CHAT_BACKLOG: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    Offline,
    Hosting,
    Joined,
}

impl From<OnlineMode> for SessionMode {
    fn from(mode: OnlineMode) -> Self {
        match mode {
            OnlineMode::Hosting => SessionMode::Hosting,
            OnlineMode::Joined => SessionMode::Joined,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionStatus {
    pub mode: SessionMode,
    pub connected: bool,
    pub server_info: Option<ServerInfo>,
    pub bundle: Option<GameBundle>,
    /// Registered connections on our own server; `None` unless hosting.
    pub client_count: Option<usize>,
    /// Other players by name, sorted.
    pub remote_players: Vec<PlayerState>,
}

pub struct SessionContext {
    config: SessionConfig,
    online: Option<OnlineSession>,
    remote_players: BTreeMap<String, PlayerState>,
    chat_backlog: VecDeque<ChatMessage>,
    last_heartbeat: Option<Instant>,
}

impl SessionContext {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            online: None,
            remote_players: BTreeMap::new(),
            chat_backlog: VecDeque::new(),
            last_heartbeat: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.online
            .as_ref()
            .map_or(SessionMode::Offline, |online| online.mode.into())
    }

    /// Auto-online: join an advertised host or become one.
    pub fn go_online(&mut self, arbitrator: &Arbitrator) -> Result<SessionMode> {
        let online = arbitrator.discover()?;
        Ok(self.attach(online))
    }

    /// Host unconditionally, skipping discovery.
    pub fn host(&mut self, arbitrator: &Arbitrator) -> Result<SessionMode> {
        let online = arbitrator.host()?;
        Ok(self.attach(online))
    }

    /// Join a specific host, skipping discovery.
    pub fn join(&mut self, arbitrator: &Arbitrator, addr: SocketAddr) -> Result<SessionMode> {
        let online = arbitrator.join(addr)?;
        Ok(self.attach(online))
    }

    fn attach(&mut self, online: OnlineSession) -> SessionMode {
        self.go_offline();
        let mode: SessionMode = online.mode.into();
        info!(?mode, peer = %online.client.peer_addr(), "session online");
        self.online = Some(online);
        mode
    }

    /// Leave the session (stopping our server if hosting). Idempotent.
    pub fn go_offline(&mut self) {
        if let Some(online) = self.online.take() {
            online.shutdown();
            info!("session offline");
        }
        self.remote_players.clear();
        self.last_heartbeat = None;
    }

    /// Per-frame update. Does nothing while offline.
    pub fn tick(&mut self, local: &PlayerState) {
        let Some(online) = self.online.as_ref() else {
            return;
        };
        if !online.client.is_connected() {
            warn!(peer = %online.client.peer_addr(), "lost connection to host");
            self.go_offline();
            return;
        }

        online.client.send_player_state(local);

        let now = Instant::now();
        let heartbeat_due = self
            .last_heartbeat
            .is_none_or(|last| now.duration_since(last) >= self.config.heartbeat_interval());
        if heartbeat_due {
            online
                .client
                .send(&Packet::Heartbeat(Heartbeat { sent_at_ms: unix_millis() }));
            self.last_heartbeat = Some(now);
        }

        for state in online.client.drain_received() {
            if state.name != local.name {
                self.remote_players.insert(state.name.clone(), state);
            }
        }
        self.collect_chat();
    }

    fn collect_chat(&mut self) {
        let Some(online) = self.online.as_ref() else {
            return;
        };
        self.chat_backlog.extend(online.client.drain_chat());
        let overflow = self.chat_backlog.len().saturating_sub(CHAT_BACKLOG);
        if overflow > 0 {
            debug!(dropped = overflow, "chat backlog full");
            self.chat_backlog.drain(..overflow);
        }
    }

    pub fn send_chat(&self, text: &str) {
        if let Some(online) = &self.online {
            online.client.send(&Packet::Chat(ChatMessage {
                from: self.config.player_name.clone(),
                text: text.into(),
            }));
        }
    }

    /// Chat received since the last call, oldest first, at most
    /// `CHAT_BACKLOG` messages.
    pub fn drain_chat(&mut self) -> Vec<ChatMessage> {
        self.collect_chat();
        self.chat_backlog.drain(..).collect()
    }

    pub fn status(&self) -> SessionStatus {
        let online = self.online.as_ref();
        SessionStatus {
            mode: self.mode(),
            connected: online.is_some_and(|o| o.client.is_connected()),
            server_info: online.and_then(|o| o.client.server_info()),
            bundle: online.and_then(|o| o.client.bundle()),
            client_count: online
                .and_then(|o| o.host.as_ref())
                .map(|host| host.client_count()),
            remote_players: self.remote_players.values().cloned().collect(),
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.go_offline();
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
