// Session configuration.
//
// Every tunable of the session layer lives in `SessionConfig`: ports, the
// beacon target, discovery timings, identity strings and the host's content
// metadata. All fields have defaults, so a config file only needs the values
// it changes. Loading order is defaults → JSON file → `LANPLAY_*` environment
// variables.
//
// Timings default to the values the prototypes shipped with: beacon every
// 750 ms, listener receive timeout 800 ms, listings stale after 4000 ms,
// auto-online discovery window 1000 ms.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use lanplay_protocol::DEFAULT_MAGIC;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

pub const DEFAULT_SESSION_PORT: u16 = 7777;
pub const DEFAULT_DISCOVERY_PORT: u16 = 7778;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Address the session server binds to.
    pub bind_addr: IpAddr,
    /// TCP session port. 0 lets the OS pick; the beacon advertises the real one.
    pub session_port: u16,
    /// UDP port beacons are sent to and listeners bind.
    pub discovery_port: u16,
    /// Where beacons go. The limited broadcast address on a real LAN.
    pub beacon_target: IpAddr,
    pub magic: String,
    /// Free-form text shown in server browsers.
    pub label: String,
    pub server_name: String,
    /// Version string sent in the handshake and echoed in `ServerInfo`.
    pub client_version: String,
    pub player_name: String,
    pub beacon_interval_ms: u64,
    pub listen_timeout_ms: u64,
    pub staleness_ms: u64,
    pub discovery_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Random backoff before committing to host after an empty discovery
    /// window. 0 disables the extra listen.
    pub host_fallback_jitter_ms: u64,
    pub content: ContentConfig,
}

/// Content metadata the host hands out in its GameBundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub game_id: String,
    pub title: String,
    pub levels: Vec<String>,
    /// Overrides the generated "Welcome to <title>" line.
    pub motd: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            session_port: DEFAULT_SESSION_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            beacon_target: IpAddr::V4(Ipv4Addr::BROADCAST),
            magic: DEFAULT_MAGIC.into(),
            label: "LAN Play 1.0".into(),
            server_name: "LAN Host".into(),
            client_version: "1.0".into(),
            player_name: "Player".into(),
            beacon_interval_ms: 750,
            listen_timeout_ms: 800,
            staleness_ms: 4000,
            discovery_timeout_ms: 1000,
            connect_timeout_ms: 2000,
            write_timeout_ms: 2000,
            heartbeat_interval_ms: 1000,
            host_fallback_jitter_ms: 0,
            content: ContentConfig::default(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            game_id: "MarioLive".into(),
            title: "MARIO! LIVE".into(),
            levels: vec!["Town".into(), "Dungeon".into(), "Castle".into()],
            motd: None,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON config. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SessionError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| SessionError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `LANPLAY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("LANPLAY_SESSION_PORT").and_then(|s| s.parse().ok()) {
            self.session_port = port;
        }
        if let Some(port) = lookup("LANPLAY_DISCOVERY_PORT").and_then(|s| s.parse().ok()) {
            self.discovery_port = port;
        }
        if let Some(target) = lookup("LANPLAY_BEACON_TARGET").and_then(|s| s.parse().ok()) {
            self.beacon_target = target;
        }
        if let Some(name) = lookup("LANPLAY_PLAYER_NAME").filter(|s| !s.trim().is_empty()) {
            self.player_name = name;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.magic.is_empty() || self.magic.contains('|') {
            return Err(SessionError::InvalidConfig(
                "magic must be non-empty and must not contain '|'".into(),
            ));
        }
        let timings = [
            ("beacon_interval_ms", self.beacon_interval_ms),
            ("listen_timeout_ms", self.listen_timeout_ms),
            ("staleness_ms", self.staleness_ms),
            ("discovery_timeout_ms", self.discovery_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
        ];
        if let Some((name, _)) = timings.iter().find(|(_, ms)| *ms == 0) {
            return Err(SessionError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.player_name.trim().is_empty() {
            return Err(SessionError::InvalidConfig("player_name is empty".into()));
        }
        Ok(())
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.session_port, 7777);
        assert_eq!(config.discovery_port, 7778);
        assert_eq!(config.staleness(), Duration::from_millis(4000));
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = SessionConfig::from_json(
            r#"{"session_port": 9000, "content": {"levels": ["Beach"]}}"#,
        )
        .unwrap();
        assert_eq!(config.session_port, 9000);
        assert_eq!(config.discovery_port, DEFAULT_DISCOVERY_PORT);
        assert_eq!(config.content.levels, vec!["Beach".to_string()]);
        assert_eq!(config.content.game_id, "MarioLive");
    }

    #[test]
    fn ip_addresses_parse_from_strings() {
        let config = SessionConfig::from_json(r#"{"beacon_target": "192.168.1.255"}"#).unwrap();
        assert_eq!(config.beacon_target, "192.168.1.255".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn overrides_replace_only_parseable_values() {
        let env: HashMap<&str, &str> = [
            ("LANPLAY_SESSION_PORT", "7001"),
            ("LANPLAY_DISCOVERY_PORT", "not-a-port"),
            ("LANPLAY_PLAYER_NAME", "Ann"),
        ]
        .into_iter()
        .collect();
        let mut config = SessionConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.session_port, 7001);
        assert_eq!(config.discovery_port, DEFAULT_DISCOVERY_PORT);
        assert_eq!(config.player_name, "Ann");
    }

    #[test]
    fn zero_timing_is_rejected() {
        let config = SessionConfig {
            beacon_interval_ms: 0,
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("beacon_interval_ms"));
    }

    #[test]
    fn magic_with_separator_is_rejected() {
        let config = SessionConfig {
            magic: "A|B".into(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_reports_path() {
        let err = SessionConfig::from_json_file(Path::new("/nonexistent/lanplay.json")).unwrap_err();
        assert!(matches!(err, SessionError::ConfigRead { .. }));
        assert!(err.to_string().contains("/nonexistent/lanplay.json"));
    }
}
