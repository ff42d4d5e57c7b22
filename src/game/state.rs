//! Simulation State Definitions
//!
//! All state types for the shooter simulation.
//! Entities live in a dense, id-sorted arena: ids come from a monotonic
//! counter and are never reused, so appending keeps the vector ordered and
//! iteration order is deterministic.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::core::rng::DeterministicRng;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::tick::SimConfig;

// =============================================================================
// ENTITY ID
// =============================================================================

/// Stable entity identifier.
///
/// Ordered by allocation: a lower id was spawned earlier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// ENTITY VARIANTS
// =============================================================================

/// Player-specific state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    /// Remaining lives
    pub lives: u32,
    /// Ticks until the weapon can fire again
    pub fire_cooldown: u32,
    /// Ticks of post-hit invulnerability left
    pub invulnerable_ticks: u32,
}

/// Bullet-specific state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulletData {
    /// Entity that fired the bullet
    pub owner: EntityId,
    /// Hit points removed from an enemy on contact
    pub damage: u32,
}

/// Enemy archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnemyKind {
    /// Small and fast
    Scout = 0,
    /// Baseline enemy
    Grunt = 1,
    /// Large, slow, takes several hits
    Tank = 2,
}

impl EnemyKind {
    /// Collision radius in pixels.
    pub fn radius(self) -> f32 {
        match self {
            EnemyKind::Scout => 10.0,
            EnemyKind::Grunt => 15.0,
            EnemyKind::Tank => 22.0,
        }
    }

    /// Score awarded for destroying this enemy.
    pub fn points(self) -> u32 {
        match self {
            EnemyKind::Scout => 15,
            EnemyKind::Grunt => 10,
            EnemyKind::Tank => 30,
        }
    }

    /// Multiplier applied to the level's base fall speed.
    pub fn speed_multiplier(self) -> f32 {
        match self {
            EnemyKind::Scout => 1.5,
            EnemyKind::Grunt => 1.0,
            EnemyKind::Tank => 0.6,
        }
    }

    /// Hit points at spawn.
    pub fn hit_points(self) -> u32 {
        match self {
            EnemyKind::Scout | EnemyKind::Grunt => 1,
            EnemyKind::Tank => 3,
        }
    }
}

/// Enemy-specific state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyData {
    /// Archetype
    pub kind: EnemyKind,
    /// Score value when destroyed
    pub points: u32,
    /// Tick the enemy appeared
    pub spawn_tick: u64,
    /// Remaining hit points
    pub hit_points: u32,
}

/// Type-specific entity payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityKind {
    /// The ship controlled by the keyboard
    Player(PlayerData),
    /// A projectile
    Bullet(BulletData),
    /// A falling enemy
    Enemy(EnemyData),
}

/// A simulated entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier
    pub id: EntityId,
    /// Center position (canvas pixels)
    pub position: Vec2,
    /// Velocity (pixels per tick)
    pub velocity: Vec2,
    /// Bounding-circle radius
    pub radius: f32,
    /// Cleared when the entity should be removed at end of tick
    pub alive: bool,
    /// Variant data
    pub kind: EntityKind,
}

impl Entity {
    /// Is this the player ship?
    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player(_))
    }

    /// Is this a bullet?
    pub fn is_bullet(&self) -> bool {
        matches!(self.kind, EntityKind::Bullet(_))
    }

    /// Is this an enemy?
    pub fn is_enemy(&self) -> bool {
        matches!(self.kind, EntityKind::Enemy(_))
    }

    fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.id.0);
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        hasher.update_f32(self.radius);
        hasher.update_bool(self.alive);
        match &self.kind {
            EntityKind::Player(p) => {
                hasher.update_u8(0);
                hasher.update_u32(p.lives);
                hasher.update_u32(p.fire_cooldown);
                hasher.update_u32(p.invulnerable_ticks);
            }
            EntityKind::Bullet(b) => {
                hasher.update_u8(1);
                hasher.update_u32(b.owner.0);
                hasher.update_u32(b.damage);
            }
            EntityKind::Enemy(e) => {
                hasher.update_u8(2);
                hasher.update_u8(e.kind as u8);
                hasher.update_u32(e.points);
                hasher.update_u64(e.spawn_tick);
                hasher.update_u32(e.hit_points);
            }
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Simulation invariant violations.
///
/// These indicate a programming error. They are surfaced to the host and
/// never swallowed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// An entity id was allocated twice.
    #[error("entity id {0} reused")]
    DuplicateEntityId(EntityId),

    /// Score would exceed the representable range.
    #[error("score overflow adding {points} to {score}")]
    ScoreOverflow {
        /// Score before the update
        score: u32,
        /// Points being added
        points: u32,
    },

    /// The player entity is gone.
    #[error("player entity missing")]
    PlayerMissing,
}

// =============================================================================
// SIMULATION STATE
// =============================================================================

/// Complete state of one game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// RNG seed (for verification)
    pub rng_seed: u64,
    /// Deterministic RNG state
    pub rng: DeterministicRng,
    /// Elapsed ticks
    pub tick: u64,
    /// Current score
    pub score: u32,
    /// All entities, sorted by id
    pub entities: Vec<Entity>,
    /// Next entity id (monotonic counter)
    pub next_entity_id: u32,
    /// The player's entity id
    pub player_id: EntityId,
    /// Set once the player has no lives left
    pub game_over: bool,
    /// Tick at which the next enemy spawns
    pub next_spawn_tick: u64,
    /// Player position last reported as a move
    pub last_reported_position: Vec2,
    /// Enemies destroyed
    pub kills: u32,
    /// Bullets fired
    pub shots_fired: u32,
    /// Canvas size
    pub bounds: Vec2,
}

impl SimulationState {
    /// Create a new game with the player at the bottom center.
    pub fn new(config: &SimConfig) -> Self {
        let bounds = Vec2::new(config.width, config.height);
        let start = Vec2::new(config.width / 2.0, config.height - config.player_radius - 8.0);

        let player = Entity {
            id: EntityId(0),
            position: start,
            velocity: Vec2::ZERO,
            radius: config.player_radius,
            alive: true,
            kind: EntityKind::Player(PlayerData {
                lives: config.player_lives,
                fire_cooldown: 0,
                invulnerable_ticks: 0,
            }),
        };

        Self {
            rng_seed: config.seed,
            rng: DeterministicRng::new(config.seed),
            tick: 0,
            score: 0,
            entities: vec![player],
            next_entity_id: 1,
            player_id: EntityId(0),
            game_over: false,
            next_spawn_tick: config.spawn.first_spawn_tick,
            last_reported_position: start,
            kills: 0,
            shots_fired: 0,
            bounds,
        }
    }

    /// Insert a new entity and return its id.
    pub fn spawn(
        &mut self,
        position: Vec2,
        velocity: Vec2,
        radius: f32,
        kind: EntityKind,
    ) -> Result<EntityId, SimulationError> {
        let id = EntityId(self.next_entity_id);
        if self.entities.last().is_some_and(|e| e.id >= id) {
            return Err(SimulationError::DuplicateEntityId(id));
        }
        self.next_entity_id += 1;

        self.entities.push(Entity {
            id,
            position,
            velocity,
            radius,
            alive: true,
            kind,
        });
        Ok(id)
    }

    /// Get an entity by id.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|idx| &self.entities[idx])
    }

    /// Get an entity mutably by id.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        match self.entities.binary_search_by_key(&id, |e| e.id) {
            Ok(idx) => Some(&mut self.entities[idx]),
            Err(_) => None,
        }
    }

    /// The player entity.
    pub fn player(&self) -> Result<&Entity, SimulationError> {
        self.get(self.player_id).ok_or(SimulationError::PlayerMissing)
    }

    /// The player entity, mutably.
    pub fn player_mut(&mut self) -> Result<&mut Entity, SimulationError> {
        let id = self.player_id;
        self.get_mut(id).ok_or(SimulationError::PlayerMissing)
    }

    /// Remaining lives (0 if the player is missing).
    pub fn lives(&self) -> u32 {
        match self.player().map(|p| &p.kind) {
            Ok(EntityKind::Player(data)) => data.lives,
            _ => 0,
        }
    }

    /// Credit points to the score.
    pub fn add_score(&mut self, points: u32) -> Result<u32, SimulationError> {
        self.score = self.score.checked_add(points).ok_or(SimulationError::ScoreOverflow {
            score: self.score,
            points,
        })?;
        Ok(self.score)
    }

    /// Drop every entity flagged dead. The player is never removed.
    pub fn remove_dead(&mut self) {
        self.entities.retain(|e| e.alive || e.is_player());
    }

    /// Number of live enemies.
    pub fn enemy_count(&self) -> usize {
        self.entities.iter().filter(|e| e.alive && e.is_enemy()).count()
    }

    /// Number of live bullets.
    pub fn bullet_count(&self) -> usize {
        self.entities.iter().filter(|e| e.alive && e.is_bullet()).count()
    }

    /// Whole seconds of game time elapsed.
    pub fn elapsed_seconds(&self, tick_rate: u32) -> u32 {
        (self.tick / tick_rate.max(1) as u64) as u32
    }

    /// Compute hash of current state for replay verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, self.rng_seed, |hasher| {
            let [s0, s1] = self.rng.state();
            hasher.update_u64(s0);
            hasher.update_u64(s1);
            hasher.update_u32(self.score);
            hasher.update_u32(self.next_entity_id);
            hasher.update_bool(self.game_over);
            hasher.update_u64(self.next_spawn_tick);
            hasher.update_vec2(self.last_reported_position);

            for entity in &self.entities {
                entity.hash_into(hasher);
            }
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
