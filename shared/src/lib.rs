use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 2048;
pub const DEFAULT_HIT_THRESHOLD: u32 = 3;
pub const KINEMATIC_PROJECTILE_SPEED: f32 = 5.0;
pub const PHYSICS_PROJECTILE_SPEED: f32 = 10.0;

/// Opaque participant handle assigned by the transport.
pub type PlayerId = u32;
/// Identifies one projectile (one physical event instance) for its lifetime.
pub type ProjectileId = u32;
/// Small recyclable ordinal shown to players ("Player 1", "Player 2", ...).
pub type DisplayNumber = u32;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        hit_threshold: Option<u32>,
    },
    Heartbeat,
    Fire {
        kind: ProjectileKind,
        direction: (f32, f32),
    },
    Impact {
        projectile_id: ProjectileId,
    },
    ProposeAction {
        action: PlayerAction,
    },
    RequestReset,
    Disconnect,

    Connected {
        player_id: PlayerId,
        display_number: DisplayNumber,
        hit_threshold: u32,
    },
    PlayerJoined {
        player: PlayerInfo,
    },
    PlayerLeft {
        player_id: PlayerId,
        display_number: DisplayNumber,
    },
    ProjectileSpawned {
        projectile_id: ProjectileId,
        owner: PlayerId,
        kind: ProjectileKind,
        velocity: (f32, f32),
    },
    ProjectileRemoved {
        projectile_id: ProjectileId,
    },
    HitRegistered(HitReport),
    GameOver(GameOverReport),
    ActionRelayed(RelayedAction),
    SessionReset {
        players: Vec<PlayerInfo>,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileKind {
    Kinematic,
    Physics,
}

impl ProjectileKind {
    pub fn speed(self) -> f32 {
        match self {
            ProjectileKind::Kinematic => KINEMATIC_PROJECTILE_SPEED,
            ProjectileKind::Physics => PHYSICS_PROJECTILE_SPEED,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub display_number: DisplayNumber,
    pub hit_count: u32,
    pub hit_threshold: u32,
    pub hue: u16,
}

impl PlayerInfo {
    pub fn name(&self) -> String {
        player_name(self.display_number)
    }
}

/// Emitted for every accepted hit.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct HitReport {
    pub player_id: PlayerId,
    pub display_number: DisplayNumber,
    pub hit_count: u32,
    pub hit_threshold: u32,
}

/// Emitted once per session, when the first player reaches their threshold.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct GameOverReport {
    pub losing_player: PlayerId,
    pub display_number: DisplayNumber,
    pub final_count: u32,
    pub hit_threshold: u32,
}

impl GameOverReport {
    pub fn message(&self) -> String {
        format!(
            "{} reached {} hits!",
            player_name(self.display_number),
            self.hit_threshold
        )
    }
}

/// A player-initiated action that every participant must observe in the same order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Chat { text: String },
}

impl PlayerAction {
    /// Payload size in bytes, used by the relay's length limit.
    pub fn payload_len(&self) -> usize {
        match self {
            PlayerAction::Chat { text } => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PlayerAction::Chat { text } => text.trim().is_empty(),
        }
    }
}

/// An action after it passed through the authority.
///
/// `origin` is always the participant that proposed the action, never the
/// authority that rebroadcast it. `sequence` is the authority's total order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RelayedAction {
    pub origin: PlayerId,
    pub sequence: u64,
    pub action: PlayerAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Own,
    Other(PlayerId),
}

impl RelayedAction {
    /// Tells a receiver whether this is its own action echoed back.
    pub fn echo_for(&self, local: PlayerId) -> Echo {
        if self.origin == local {
            Echo::Own
        } else {
            Echo::Other(self.origin)
        }
    }
}

pub fn player_name(display_number: DisplayNumber) -> String {
    format!("Player {}", display_number)
}

/// Unit vector along `direction`, or zero when the input has no length.
pub fn normalize_direction(direction: (f32, f32)) -> (f32, f32) {
    let (x, y) = direction;
    let magnitude = (x * x + y * y).sqrt();
    if magnitude > f32::EPSILON {
        (x / magnitude, y / magnitude)
    } else {
        (0.0, 0.0)
    }
}

pub fn projectile_velocity(kind: ProjectileKind, direction: (f32, f32)) -> (f32, f32) {
    let (nx, ny) = normalize_direction(direction);
    (nx * kind.speed(), ny * kind.speed())
}
