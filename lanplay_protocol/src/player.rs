// Per-peer player state, the payload of PLAYER_UPDATE.
//
// Each peer owns exactly one `PlayerState` (its own), mutates it every
// simulation tick and sends a full copy. Receivers replace their remote copy
// wholesale; they never merge individual fields. `name` is the key that
// identifies a player within a session.

use serde::{Deserialize, Serialize};

/// Horizontal facing, encoded on the wire as the integer -1 or 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Facing {
    Left,
    #[default]
    Right,
}

impl Facing {
    /// -1.0 for left, 1.0 for right. Handy for flipping sprites and velocities.
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }
}

impl From<Facing> for i8 {
    fn from(facing: Facing) -> Self {
        match facing {
            Facing::Left => -1,
            Facing::Right => 1,
        }
    }
}

impl TryFrom<i8> for Facing {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Facing::Left),
            1 => Ok(Facing::Right),
            other => Err(format!("facing must be -1 or 1, got {other}")),
        }
    }
}

/// Snapshot of one player, as produced by its owning peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerState {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub anim_frame: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub atk: i32,
    pub def: i32,
    pub level: i32,
    pub exp: i32,
    pub coins: i32,
    pub jumping: bool,
    pub jump_vel: f32,
}

impl PlayerState {
    /// A fresh level-1 character at `(x, y)` with full HP/MP.
    pub fn new(name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            facing: Facing::Right,
            anim_frame: 0,
            hp: 100,
            max_hp: 100,
            mp: 50,
            max_mp: 50,
            atk: 10,
            def: 5,
            level: 1,
            exp: 0,
            coins: 0,
            jumping: false,
            jump_vel: 0.0,
        }
    }
}
