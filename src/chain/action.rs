//! Game Actions
//!
//! Discrete gameplay events mirrored on chain. [`ActionKind`] is a closed
//! sum type: the dispatcher and metrics match on it exhaustively.

use serde::{Serialize, Deserialize};

/// Horizontal movement direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Toward x = 0
    Left,
    /// Toward x = width
    Right,
    /// No horizontal component
    Still,
}

impl Direction {
    /// From a signed axis value.
    pub fn from_axis(axis: i8) -> Self {
        match axis.signum() {
            -1 => Direction::Left,
            1 => Direction::Right,
            _ => Direction::Still,
        }
    }
}

/// What happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Latest player position
    Move {
        /// Net direction of travel
        direction: Direction,
        /// X position (canvas pixels)
        x: f32,
        /// Y position (canvas pixels)
        y: f32,
    },
    /// A bullet was fired
    Shoot {
        /// Bullet spawn x
        origin_x: f32,
        /// Bullet spawn y
        origin_y: f32,
    },
    /// An enemy was destroyed
    Kill {
        /// Enemy entity id
        enemy_id: u32,
        /// Points credited
        points: u32,
    },
    /// Player registration
    Register {
        /// Display name
        name: String,
    },
    /// Final score at game over
    EndGame {
        /// Final score
        final_score: u32,
    },
}

impl ActionKind {
    /// Dispatch class of this action.
    pub fn class(&self) -> ActionClass {
        match self {
            ActionKind::Move { .. } => ActionClass::Move,
            ActionKind::Shoot { .. } | ActionKind::Kill { .. } => ActionClass::Combat,
            ActionKind::Register { .. } | ActionKind::EndGame { .. } => ActionClass::Lifecycle,
        }
    }

    /// Short name for logs and the transaction feed.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Move { .. } => "move",
            ActionKind::Shoot { .. } => "shoot",
            ActionKind::Kill { .. } => "kill",
            ActionKind::Register { .. } => "register",
            ActionKind::EndGame { .. } => "end_game",
        }
    }
}

/// Submission class. Each class has its own FIFO queue and concurrency rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionClass {
    /// Register / EndGame: serialized, highest launch priority
    Lifecycle,
    /// Shoot / Kill: bounded concurrency, never dropped
    Combat,
    /// Moves: strictly one in flight, coalesced under backpressure
    Move,
}

impl ActionClass {
    /// Launch priority order when rate-limit tokens are scarce.
    pub const PRIORITY: [ActionClass; 3] = [ActionClass::Lifecycle, ActionClass::Combat, ActionClass::Move];

    /// Must this class be confirmed in order?
    pub fn is_ordering_sensitive(self) -> bool {
        !matches!(self, ActionClass::Combat)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ActionClass::Lifecycle => 0,
            ActionClass::Combat => 1,
            ActionClass::Move => 2,
        }
    }
}

/// An immutable action ready for submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameAction {
    /// Engine-wide monotonic sequence number
    pub sequence: u64,
    /// Creation time, milliseconds since the engine epoch
    pub created_at_ms: u64,
    /// The action itself
    pub kind: ActionKind,
}

impl GameAction {
    /// Dispatch class.
    pub fn class(&self) -> ActionClass {
        self.kind.class()
    }
}

/// What the session signer receives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Target program identifier
    pub program_id: String,
    /// Sequence number of the action
    pub sequence: u64,
    /// Creation time, milliseconds since the engine epoch
    pub created_at_ms: u64,
    /// The action
    pub action: ActionKind,
}

impl ActionPayload {
    /// Build the payload for an action.
    pub fn new(program_id: &str, action: &GameAction) -> Self {
        Self {
            program_id: program_id.to_string(),
            sequence: action.sequence,
            created_at_ms: action.created_at_ms,
            action: action.kind.clone(),
        }
    }

    /// Serialize to compact binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
