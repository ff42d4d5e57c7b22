//! Game Events
//!
//! Events produced by a simulation tick. The action encoder turns the
//! chain-relevant ones into transactions; the rest feed the host UI and logs.

use serde::{Serialize, Deserialize};
use crate::core::vec2::Vec2;
use crate::game::state::{EntityId, EnemyKind};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Player moved further than the report threshold
    PlayerMoved {
        /// -1 left, +1 right, 0 when the net displacement was vertical only
        direction: i8,
        /// Position at end of tick
        position: Vec2,
    },

    /// Player fired a bullet
    ShotFired {
        /// The new bullet
        bullet_id: EntityId,
        /// Spawn position of the bullet
        origin: Vec2,
    },

    /// A bullet destroyed an enemy
    EnemyKilled {
        /// The destroyed enemy
        enemy_id: EntityId,
        /// Bullet that landed the final hit
        bullet_id: EntityId,
        /// Points credited
        points: u32,
        /// Score after crediting
        new_score: u32,
    },

    /// An enemy appeared
    EnemySpawned {
        /// The new enemy
        enemy_id: EntityId,
        /// Archetype
        kind: EnemyKind,
    },

    /// An enemy fell past the bottom edge
    EnemyEscaped {
        /// The enemy
        enemy_id: EntityId,
    },

    /// An enemy touched the player
    PlayerHit {
        /// Enemy that hit the player
        enemy_id: EntityId,
        /// Lives remaining after the hit
        lives_left: u32,
    },

    /// The player ran out of lives
    GameOver {
        /// Final score
        final_score: u32,
    },
}

/// A game event with timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,
    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Player moved event.
    pub fn player_moved(tick: u64, direction: i8, position: Vec2) -> Self {
        Self::new(tick, GameEventData::PlayerMoved { direction, position })
    }

    /// Shot fired event.
    pub fn shot_fired(tick: u64, bullet_id: EntityId, origin: Vec2) -> Self {
        Self::new(tick, GameEventData::ShotFired { bullet_id, origin })
    }

    /// Enemy killed event.
    pub fn enemy_killed(
        tick: u64,
        enemy_id: EntityId,
        bullet_id: EntityId,
        points: u32,
        new_score: u32,
    ) -> Self {
        Self::new(
            tick,
            GameEventData::EnemyKilled {
                enemy_id,
                bullet_id,
                points,
                new_score,
            },
        )
    }

    /// Game over event.
    pub fn game_over(tick: u64, final_score: u32) -> Self {
        Self::new(tick, GameEventData::GameOver { final_score })
    }

    /// Does this event change the score?
    pub fn affects_score(&self) -> bool {
        matches!(self.data, GameEventData::EnemyKilled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let e = GameEvent::enemy_killed(5, EntityId(3), EntityId(2), 10, 40);
        assert_eq!(e.tick, 5);
        assert!(e.affects_score());

        let m = GameEvent::player_moved(6, 1, Vec2::new(10.0, 20.0));
        assert!(!m.affects_score());
        assert!(matches!(m.data, GameEventData::PlayerMoved { direction: 1, .. }));
    }
}
