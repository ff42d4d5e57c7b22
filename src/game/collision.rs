//! Collision Detection
//!
//! Deterministic pairwise bounding-circle tests.
//! Tests run against start-of-tick positions captured in a
//! [`PositionSnapshot`]; entities spawned during the tick are not in the
//! snapshot and cannot collide until the next tick.

use crate::core::vec2::Vec2;
use crate::game::state::{EntityId, EntityKind, SimulationState};

/// Check if two circles overlap.
#[inline]
pub fn circles_overlap(pos_a: Vec2, radius_a: f32, pos_b: Vec2, radius_b: f32) -> bool {
    let combined = radius_a + radius_b;
    pos_a.distance_squared(pos_b) <= combined * combined
}

/// Entity positions at the start of a tick, sorted by id.
#[derive(Debug, Clone, Default)]
pub struct PositionSnapshot {
    positions: Vec<(EntityId, Vec2)>,
}

impl PositionSnapshot {
    /// Capture positions of every live entity.
    pub fn capture(state: &SimulationState) -> Self {
        let positions = state
            .entities
            .iter()
            .filter(|e| e.alive)
            .map(|e| (e.id, e.position))
            .collect();
        Self { positions }
    }

    /// Start-of-tick position for an entity, if it existed then.
    pub fn position_of(&self, id: EntityId) -> Option<Vec2> {
        self.positions
            .binary_search_by_key(&id, |(eid, _)| *eid)
            .ok()
            .map(|idx| self.positions[idx].1)
    }

    /// Number of captured entities.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A bullet landing on an enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulletHit {
    /// The bullet (consumed)
    pub bullet_id: EntityId,
    /// The enemy struck
    pub enemy_id: EntityId,
    /// Damage dealt
    pub damage: u32,
}

/// Find bullet–enemy hits in deterministic order.
///
/// Enemies are visited in ascending id order and each takes bullets in
/// ascending id order. A bullet is spent on the first enemy it touches.
/// An enemy stops absorbing bullets once the hits would destroy it, so
/// surplus bullets fly on.
pub fn check_bullet_enemy_hits(state: &SimulationState, snapshot: &PositionSnapshot) -> Vec<BulletHit> {
    let mut hits = Vec::new();
    let mut spent: Vec<EntityId> = Vec::new();

    let bullets: Vec<(EntityId, Vec2, f32, u32)> = state
        .entities
        .iter()
        .filter(|e| e.alive)
        .filter_map(|e| match &e.kind {
            EntityKind::Bullet(b) => snapshot
                .position_of(e.id)
                .map(|pos| (e.id, pos, e.radius, b.damage)),
            _ => None,
        })
        .collect();

    for enemy in state.entities.iter().filter(|e| e.alive) {
        let EntityKind::Enemy(data) = &enemy.kind else {
            continue;
        };
        let Some(enemy_pos) = snapshot.position_of(enemy.id) else {
            continue;
        };

        let mut remaining = data.hit_points;
        for (bullet_id, bullet_pos, bullet_radius, damage) in &bullets {
            if remaining == 0 {
                break;
            }
            if spent.contains(bullet_id) {
                continue;
            }
            if circles_overlap(*bullet_pos, *bullet_radius, enemy_pos, enemy.radius) {
                spent.push(*bullet_id);
                remaining = remaining.saturating_sub(*damage);
                hits.push(BulletHit {
                    bullet_id: *bullet_id,
                    enemy_id: enemy.id,
                    damage: *damage,
                });
            }
        }
    }

    hits
}

/// Find enemies touching the player, in ascending id order.
pub fn check_enemy_player_contacts(state: &SimulationState, snapshot: &PositionSnapshot) -> Vec<EntityId> {
    let Ok(player) = state.player() else {
        return Vec::new();
    };
    let Some(player_pos) = snapshot.position_of(player.id) else {
        return Vec::new();
    };

    state
        .entities
        .iter()
        .filter(|e| e.alive && e.is_enemy())
        .filter_map(|enemy| {
            let pos = snapshot.position_of(enemy.id)?;
            circles_overlap(pos, enemy.radius, player_pos, player.radius).then_some(enemy.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{BulletData, EnemyData, EnemyKind};
    use crate::game::tick::SimConfig;

    fn enemy(hit_points: u32) -> EntityKind {
        EntityKind::Enemy(EnemyData {
            kind: EnemyKind::Grunt,
            points: 10,
            spawn_tick: 0,
            hit_points,
        })
    }

    fn bullet() -> EntityKind {
        EntityKind::Bullet(BulletData { owner: EntityId(0), damage: 1 })
    }

    #[test]
    fn test_circles_overlap() {
        let a = Vec2::new(0.0, 0.0);
        assert!(circles_overlap(a, 5.0, Vec2::new(9.0, 0.0), 5.0));
        assert!(circles_overlap(a, 5.0, Vec2::new(10.0, 0.0), 5.0));
        assert!(!circles_overlap(a, 5.0, Vec2::new(10.1, 0.0), 5.0));
    }

    #[test]
    fn test_hits_use_snapshot_positions() {
        let mut state = SimulationState::new(&SimConfig::default());
        let e = state.spawn(Vec2::new(100.0, 100.0), Vec2::ZERO, 15.0, enemy(1)).unwrap();
        let b = state.spawn(Vec2::new(100.0, 110.0), Vec2::ZERO, 3.0, bullet()).unwrap();
        let snapshot = PositionSnapshot::capture(&state);

        // Move the bullet away after the snapshot: the hit still counts
        state.get_mut(b).unwrap().position = Vec2::new(500.0, 500.0);
        let hits = check_bullet_enemy_hits(&state, &snapshot);
        assert_eq!(hits, vec![BulletHit { bullet_id: b, enemy_id: e, damage: 1 }]);
    }

    #[test]
    fn test_entities_spawned_after_snapshot_do_not_collide() {
        let mut state = SimulationState::new(&SimConfig::default());
        state.spawn(Vec2::new(100.0, 100.0), Vec2::ZERO, 15.0, enemy(1)).unwrap();
        let snapshot = PositionSnapshot::capture(&state);
        state.spawn(Vec2::new(100.0, 100.0), Vec2::ZERO, 3.0, bullet()).unwrap();

        assert!(check_bullet_enemy_hits(&state, &snapshot).is_empty());
    }

    #[test]
    fn test_multi_kill_order_is_by_enemy_id() {
        let mut state = SimulationState::new(&SimConfig::default());
        let b1 = state.spawn(Vec2::new(300.0, 100.0), Vec2::ZERO, 3.0, bullet()).unwrap();
        let b2 = state.spawn(Vec2::new(100.0, 100.0), Vec2::ZERO, 3.0, bullet()).unwrap();
        let e1 = state.spawn(Vec2::new(100.0, 100.0), Vec2::ZERO, 15.0, enemy(1)).unwrap();
        let e2 = state.spawn(Vec2::new(300.0, 100.0), Vec2::ZERO, 15.0, enemy(1)).unwrap();
        let snapshot = PositionSnapshot::capture(&state);

        let hits = check_bullet_enemy_hits(&state, &snapshot);
        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].enemy_id, hits[0].bullet_id), (e1, b2));
        assert_eq!((hits[1].enemy_id, hits[1].bullet_id), (e2, b1));
    }

    #[test]
    fn test_surplus_bullets_pass_through() {
        let mut state = SimulationState::new(&SimConfig::default());
        let e = state.spawn(Vec2::new(100.0, 100.0), Vec2::ZERO, 15.0, enemy(1)).unwrap();
        state.spawn(Vec2::new(100.0, 100.0), Vec2::ZERO, 3.0, bullet()).unwrap();
        state.spawn(Vec2::new(101.0, 100.0), Vec2::ZERO, 3.0, bullet()).unwrap();
        let snapshot = PositionSnapshot::capture(&state);

        let hits = check_bullet_enemy_hits(&state, &snapshot);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].enemy_id, e);
    }

    #[test]
    fn test_enemy_player_contact() {
        let mut state = SimulationState::new(&SimConfig::default());
        let player_pos = state.player().unwrap().position;
        let near = state.spawn(player_pos, Vec2::ZERO, 15.0, enemy(1)).unwrap();
        state.spawn(Vec2::new(10.0, 10.0), Vec2::ZERO, 15.0, enemy(1)).unwrap();
        let snapshot = PositionSnapshot::capture(&state);

        assert_eq!(check_enemy_player_contacts(&state, &snapshot), vec![near]);
    }
}
