// Host-side content metadata ("download play" payload).
//
// The host loads level metadata per game id once at startup; every handshake
// then gets a `GameBundle` built from it. A game id with nothing registered
// still produces a valid bundle with the single default level.

use std::collections::HashMap;

use lanplay_protocol::GameBundle;

use crate::config::ContentConfig;

#[derive(Clone, Debug, Default)]
pub struct ContentCatalog {
    title: String,
    motd: Option<String>,
    levels: HashMap<String, Vec<String>>,
}

impl ContentCatalog {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Catalog with the configured game's levels already loaded.
    pub fn from_config(config: &ContentConfig) -> Self {
        let mut catalog = Self::new(config.title.clone());
        catalog.motd = config.motd.clone();
        catalog.load_game_data(config.game_id.clone(), config.levels.clone());
        catalog
    }

    /// Register (or replace) the level list for a game id.
    pub fn load_game_data(&mut self, game_id: impl Into<String>, levels: Vec<String>) {
        let game_id = game_id.into();
        tracing::debug!(%game_id, levels = levels.len(), "loaded game metadata");
        self.levels.insert(game_id, levels);
    }

    pub fn motd(&self) -> String {
        self.motd
            .clone()
            .unwrap_or_else(|| format!("Welcome to {}", self.title))
    }

    pub fn build_bundle(&self, game_id: &str) -> GameBundle {
        let levels = self.levels.get(game_id).cloned().unwrap_or_default();
        GameBundle::new(game_id, levels, self.motd())
    }
}
