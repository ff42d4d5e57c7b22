//! Enemy Spawning
//!
//! Time-based spawn schedule with difficulty scaling. Every
//! `level_duration_ticks` the difficulty level rises: enemies arrive more
//! often and fall faster, down to a minimum interval and up to a maximum
//! speed. All randomness comes from the state's seeded RNG.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::{EnemyData, EnemyKind, EntityId, EntityKind, SimulationState, SimulationError};

/// Configuration for enemy spawning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Tick of the first spawn
    pub first_spawn_tick: u64,
    /// Spawn interval at level 0 (ticks)
    pub base_interval_ticks: u64,
    /// Interval reduction per level (ticks)
    pub interval_step_ticks: u64,
    /// Shortest allowed interval (ticks)
    pub min_interval_ticks: u64,
    /// Ticks per difficulty level
    pub level_duration_ticks: u64,
    /// Fall speed at level 0 (pixels per tick)
    pub base_fall_speed: f32,
    /// Fall speed increase per level
    pub fall_speed_step: f32,
    /// Fastest base fall speed
    pub max_fall_speed: f32,
    /// Level from which tanks may appear
    pub tank_min_level: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            first_spawn_tick: 30,
            base_interval_ticks: 60,      // one enemy per second at start
            interval_step_ticks: 6,
            min_interval_ticks: 15,
            level_duration_ticks: 600,    // 10 seconds @ 60Hz
            base_fall_speed: 1.5,
            fall_speed_step: 0.25,
            max_fall_speed: 5.0,
            tank_min_level: 2,
        }
    }
}

impl SpawnConfig {
    /// Difficulty level at a tick.
    pub fn difficulty_level(&self, tick: u64) -> u32 {
        (tick / self.level_duration_ticks.max(1)) as u32
    }

    /// Spawn interval at a tick.
    pub fn spawn_interval(&self, tick: u64) -> u64 {
        let reduction = self.interval_step_ticks * self.difficulty_level(tick) as u64;
        self.base_interval_ticks
            .saturating_sub(reduction)
            .max(self.min_interval_ticks)
            .max(1)
    }

    /// Base fall speed at a tick.
    pub fn fall_speed(&self, tick: u64) -> f32 {
        let level = self.difficulty_level(tick) as f32;
        (self.base_fall_speed + self.fall_speed_step * level).min(self.max_fall_speed)
    }
}

/// Pick an enemy archetype for the current level.
fn choose_kind(state: &mut SimulationState, level: u32, config: &SpawnConfig) -> EnemyKind {
    let roll = state.rng.next_int(100);
    if level >= config.tank_min_level && roll < 15 {
        EnemyKind::Tank
    } else if roll < 50 {
        EnemyKind::Grunt
    } else {
        EnemyKind::Scout
    }
}

/// Spawn an enemy if the schedule says so.
///
/// Returns the new enemy's id and pushes an `EnemySpawned` event.
pub fn maybe_spawn_enemy(
    state: &mut SimulationState,
    config: &SpawnConfig,
    events: &mut Vec<GameEvent>,
) -> Result<Option<EntityId>, SimulationError> {
    if state.tick < state.next_spawn_tick {
        return Ok(None);
    }

    let level = config.difficulty_level(state.tick);
    let kind = choose_kind(state, level, config);
    let radius = kind.radius();

    let x = state.rng.next_range(radius, state.bounds.x - radius);
    let position = Vec2::new(x, -radius);
    let velocity = Vec2::DOWN.scale(config.fall_speed(state.tick) * kind.speed_multiplier());

    let id = state.spawn(
        position,
        velocity,
        radius,
        EntityKind::Enemy(EnemyData {
            kind,
            points: kind.points(),
            spawn_tick: state.tick,
            hit_points: kind.hit_points(),
        }),
    )?;

    state.next_spawn_tick = state.tick + config.spawn_interval(state.tick);
    events.push(GameEvent::new(state.tick, GameEventData::EnemySpawned { enemy_id: id, kind }));

    Ok(Some(id))
}
