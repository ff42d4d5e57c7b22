//! Simulation Tick
//!
//! One fixed-timestep advance of the shooter. Given the same seed and the
//! same input sequence, the sequence of states is identical.
//!
//! Per tick, in order:
//! 1. apply input to the player (move, clamp, fire)
//! 2. advance bullets and enemies
//! 3. spawn enemies on schedule
//! 4. detect collisions against start-of-tick positions
//! 5. remove dead entities, report movement, check game over

use serde::{Serialize, Deserialize};
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::vec2::Vec2;
use crate::game::collision::{check_bullet_enemy_hits, check_enemy_player_contacts, PositionSnapshot};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::input::{InputFrame, InputRecording};
use crate::game::spawn::{maybe_spawn_enemy, SpawnConfig};
use crate::game::state::{BulletData, EntityKind, SimulationError, SimulationState};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Whether the game is over
    pub game_over: bool,
}

/// Configuration for the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed
    pub seed: u64,
    /// Canvas width (logical pixels)
    pub width: f32,
    /// Canvas height (logical pixels)
    pub height: f32,
    /// Horizontal player speed (pixels per tick)
    pub player_speed: f32,
    /// Player collision radius
    pub player_radius: f32,
    /// Lives at start
    pub player_lives: u32,
    /// Ticks between shots (12 ticks = 5 shots per second)
    pub fire_cooldown_ticks: u32,
    /// Bullet speed (pixels per tick, upward)
    pub bullet_speed: f32,
    /// Bullet collision radius
    pub bullet_radius: f32,
    /// Damage per bullet
    pub bullet_damage: u32,
    /// Invulnerability after being hit (ticks)
    pub invulnerable_ticks: u32,
    /// Minimum net displacement before a move is reported (pixels)
    pub move_report_threshold: f32,
    /// Enemy spawning
    pub spawn: SpawnConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            width: crate::CANVAS_WIDTH,
            height: crate::CANVAS_HEIGHT,
            player_speed: 5.0,
            player_radius: 16.0,
            player_lives: 3,
            fire_cooldown_ticks: 12,
            bullet_speed: 9.0,
            bullet_radius: 3.0,
            bullet_damage: 1,
            invulnerable_ticks: 90,
            move_report_threshold: 2.0,
            spawn: SpawnConfig::default(),
        }
    }
}

/// Run one simulation tick.
///
/// After game over this is a no-op that reports `game_over`.
/// Invariant violations are returned, never swallowed.
pub fn tick(
    state: &mut SimulationState,
    input: InputFrame,
    config: &SimConfig,
) -> Result<TickResult, SimulationError> {
    let mut result = TickResult::default();

    if state.game_over {
        result.game_over = true;
        return Ok(result);
    }

    // 0. Advance tick counter, capture start-of-tick positions
    state.tick += 1;
    let snapshot = PositionSnapshot::capture(state);

    // 1. Apply player input
    apply_input(state, input, config, &mut result.events)?;

    // 2. Advance bullets and enemies
    advance_projectiles(state, &mut result.events);

    // 3. Spawn new enemies
    maybe_spawn_enemy(state, &config.spawn, &mut result.events)?;

    // 4. Collisions
    process_bullet_hits(state, &snapshot, &mut result.events)?;
    process_player_contacts(state, &snapshot, config, &mut result.events)?;

    // 5. Cleanup and reporting
    state.remove_dead();
    report_movement(state, config, &mut result.events)?;

    if state.lives() == 0 {
        state.game_over = true;
        result.events.push(GameEvent::game_over(state.tick, state.score));
    }
    result.game_over = state.game_over;

    #[cfg(feature = "debug-tracing")]
    trace!(
        tick = state.tick,
        entities = state.entities.len(),
        events = result.events.len(),
        "tick complete"
    );

    Ok(result)
}

/// Move the player, clamp to the canvas and fire if possible.
fn apply_input(
    state: &mut SimulationState,
    input: InputFrame,
    config: &SimConfig,
    events: &mut Vec<GameEvent>,
) -> Result<(), SimulationError> {
    let bounds = state.bounds;
    let player = state.player_mut()?;
    let radius = player.radius;

    player.velocity = Vec2::new(input.horizontal() as f32 * config.player_speed, 0.0);
    player.position += player.velocity;
    player.position = player
        .position
        .clamp_to(Vec2::new(radius, radius), Vec2::new(bounds.x - radius, bounds.y - radius));

    let mut fire_from = None;
    if let EntityKind::Player(data) = &mut player.kind {
        data.fire_cooldown = data.fire_cooldown.saturating_sub(1);
        data.invulnerable_ticks = data.invulnerable_ticks.saturating_sub(1);

        if input.shoot_held() && data.fire_cooldown == 0 {
            data.fire_cooldown = config.fire_cooldown_ticks;
            fire_from = Some(Vec2::new(player.position.x, player.position.y - radius));
        }
    }

    if let Some(origin) = fire_from {
        let owner = state.player_id;
        let bullet_id = state.spawn(
            origin,
            Vec2::UP.scale(config.bullet_speed),
            config.bullet_radius,
            EntityKind::Bullet(BulletData {
                owner,
                damage: config.bullet_damage,
            }),
        )?;
        state.shots_fired += 1;
        events.push(GameEvent::shot_fired(state.tick, bullet_id, origin));
    }

    Ok(())
}

/// Integrate bullets and enemies; retire those that leave the canvas.
fn advance_projectiles(state: &mut SimulationState, events: &mut Vec<GameEvent>) {
    let height = state.bounds.y;
    let tick = state.tick;

    for entity in state.entities.iter_mut().filter(|e| e.alive && !e.is_player()) {
        entity.position += entity.velocity;

        if entity.is_bullet() && entity.position.y + entity.radius < 0.0 {
            entity.alive = false;
        } else if entity.is_enemy() && entity.position.y - entity.radius > height {
            entity.alive = false;
            events.push(GameEvent::new(tick, GameEventData::EnemyEscaped { enemy_id: entity.id }));
        }
    }
}

/// Apply bullet hits; credit score for each destroyed enemy.
fn process_bullet_hits(
    state: &mut SimulationState,
    snapshot: &PositionSnapshot,
    events: &mut Vec<GameEvent>,
) -> Result<(), SimulationError> {
    let hits = check_bullet_enemy_hits(state, snapshot);

    for hit in hits {
        if let Some(bullet) = state.get_mut(hit.bullet_id) {
            bullet.alive = false;
        }

        let mut destroyed = None;
        if let Some(enemy) = state.get_mut(hit.enemy_id) {
            if let EntityKind::Enemy(data) = &mut enemy.kind {
                data.hit_points = data.hit_points.saturating_sub(hit.damage);
                if data.hit_points == 0 && enemy.alive {
                    enemy.alive = false;
                    destroyed = Some(data.points);
                }
            }
        }

        if let Some(points) = destroyed {
            let new_score = state.add_score(points)?;
            state.kills += 1;
            events.push(GameEvent::enemy_killed(
                state.tick,
                hit.enemy_id,
                hit.bullet_id,
                points,
                new_score,
            ));
        }
    }

    Ok(())
}

/// Enemies that reach the player cost a life and are destroyed.
fn process_player_contacts(
    state: &mut SimulationState,
    snapshot: &PositionSnapshot,
    config: &SimConfig,
    events: &mut Vec<GameEvent>,
) -> Result<(), SimulationError> {
    let contacts = check_enemy_player_contacts(state, snapshot);

    for enemy_id in contacts {
        let player = state.player_mut()?;
        let EntityKind::Player(data) = &mut player.kind else {
            return Err(SimulationError::PlayerMissing);
        };
        if data.invulnerable_ticks > 0 || data.lives == 0 {
            continue;
        }

        data.lives -= 1;
        data.invulnerable_ticks = config.invulnerable_ticks;
        let lives_left = data.lives;

        if let Some(enemy) = state.get_mut(enemy_id) {
            enemy.alive = false;
        }
        events.push(GameEvent::new(
            state.tick,
            GameEventData::PlayerHit { enemy_id, lives_left },
        ));
    }

    Ok(())
}

/// Emit a move once the player has drifted past the report threshold.
fn report_movement(
    state: &mut SimulationState,
    config: &SimConfig,
    events: &mut Vec<GameEvent>,
) -> Result<(), SimulationError> {
    let position = state.player()?.position;
    let delta = position - state.last_reported_position;

    if delta.length() >= config.move_report_threshold {
        let direction = if delta.x > 0.0 {
            1
        } else if delta.x < 0.0 {
            -1
        } else {
            0
        };
        state.last_reported_position = position;
        events.push(GameEvent::player_moved(state.tick, direction, position));
    }

    Ok(())
}

/// Replay a game from a recording.
///
/// Returns the final state and every event produced.
pub fn replay(
    config: &SimConfig,
    recording: &InputRecording,
    tick_count: u64,
) -> Result<(SimulationState, Vec<GameEvent>), SimulationError> {
    let mut state = SimulationState::new(config);
    let mut all_events = Vec::new();

    for t in 1..=tick_count {
        let result = tick(&mut state, recording.input_at(t), config)?;
        all_events.extend(result.events);

        if result.game_over {
            break;
        }
    }

    Ok((state, all_events))
}
