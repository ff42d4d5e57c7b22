//! Action Encoder
//!
//! Turns simulation events into [`GameAction`]s ready for the dispatcher.
//!
//! - Moves are coalesced over a trailing-edge window: the first move opens
//!   it, later moves overwrite the position, one Move leaves when it closes.
//! - Shots are forwarded individually up to a cap per second of game time,
//!   counted in simulation ticks.
//! - Kills are always forwarded.
//! - Register and EndGame go out at most once per session.
//!
//! Without an active session gameplay events are dropped and counted.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::chain::action::{ActionKind, Direction, GameAction};
use crate::core::vec2::Vec2;
use crate::game::events::{GameEvent, GameEventData};

/// Encoder tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Move coalescing window
    pub move_window_ms: u64,
    /// Shots forwarded per second of game time
    pub max_shots_per_sec: u32,
    /// Minimum player name length (trimmed, in characters)
    pub min_name_len: usize,
    /// Maximum player name length (trimmed, in characters)
    pub max_name_len: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            move_window_ms: 200,
            max_shots_per_sec: 5,
            min_name_len: 3,
            max_name_len: 20,
        }
    }
}

/// Local rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// No active session.
    #[error("no active session")]
    NoSession,

    /// Register already sent for this session.
    #[error("player already registered for this session")]
    AlreadyRegistered,

    /// EndGame already sent for this session.
    #[error("game already ended for this session")]
    AlreadyEnded,

    /// Name shorter than the minimum.
    #[error("name too short: {len} < {min}")]
    NameTooShort {
        /// Trimmed length
        len: usize,
        /// Minimum
        min: usize,
    },

    /// Name longer than the maximum.
    #[error("name too long: {len} > {max}")]
    NameTooLong {
        /// Trimmed length
        len: usize,
        /// Maximum
        max: usize,
    },

    /// Name contains a character outside [A-Za-z0-9_- ].
    #[error("invalid character in name: {0:?}")]
    InvalidNameChar(char),
}

#[derive(Debug, Clone, Copy)]
struct MoveWindow {
    opened_at: Instant,
    direction: Direction,
    position: Vec2,
}

/// Stateful event-to-action translator.
#[derive(Debug)]
pub struct ActionEncoder {
    config: EncoderConfig,
    epoch: Instant,
    tick_rate: u32,
    next_sequence: u64,
    move_window: Option<MoveWindow>,
    shot_ticks: VecDeque<u64>,
    registered: bool,
    ended: bool,
    suppressed: u64,
    throttled_shots: u64,
}

impl ActionEncoder {
    /// Create an encoder. Action timestamps are measured from `epoch`;
    /// the shot cap window is `tick_rate` simulation ticks.
    pub fn new(config: EncoderConfig, epoch: Instant, tick_rate: u32) -> Self {
        Self {
            config,
            epoch,
            tick_rate: tick_rate.max(1),
            next_sequence: 1,
            move_window: None,
            shot_ticks: VecDeque::new(),
            registered: false,
            ended: false,
            suppressed: 0,
            throttled_shots: 0,
        }
    }

    fn make_action(&mut self, kind: ActionKind, now: Instant) -> GameAction {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        GameAction {
            sequence,
            created_at_ms: now.saturating_duration_since(self.epoch).as_millis() as u64,
            kind,
        }
    }

    /// Translate one simulation event.
    ///
    /// Returns an action to submit right away, if any. Moves are held in the
    /// coalescing window; collect them with [`ActionEncoder::flush_moves`].
    pub fn encode(&mut self, event: &GameEvent, session_active: bool, now: Instant) -> Option<GameAction> {
        let chain_relevant = matches!(
            event.data,
            GameEventData::PlayerMoved { .. }
                | GameEventData::ShotFired { .. }
                | GameEventData::EnemyKilled { .. }
                | GameEventData::GameOver { .. }
        );
        if !chain_relevant {
            return None;
        }
        if !session_active {
            self.suppressed += 1;
            debug!("No session, suppressing event at tick {}", event.tick);
            return None;
        }

        match &event.data {
            GameEventData::PlayerMoved { direction, position } => {
                let direction = Direction::from_axis(*direction);
                match &mut self.move_window {
                    Some(window) => {
                        window.direction = direction;
                        window.position = *position;
                    }
                    None => {
                        self.move_window = Some(MoveWindow {
                            opened_at: now,
                            direction,
                            position: *position,
                        });
                    }
                }
                None
            }
            GameEventData::ShotFired { origin, .. } => {
                let window = u64::from(self.tick_rate);
                while let Some(&t) = self.shot_ticks.front() {
                    if event.tick.saturating_sub(t) >= window {
                        self.shot_ticks.pop_front();
                    } else {
                        break;
                    }
                }
                if self.shot_ticks.len() >= self.config.max_shots_per_sec as usize {
                    self.throttled_shots += 1;
                    debug!("Shot rate cap reached, dropping shot at tick {}", event.tick);
                    return None;
                }
                self.shot_ticks.push_back(event.tick);
                Some(self.make_action(
                    ActionKind::Shoot { origin_x: origin.x, origin_y: origin.y },
                    now,
                ))
            }
            GameEventData::EnemyKilled { enemy_id, points, .. } => Some(self.make_action(
                ActionKind::Kill { enemy_id: enemy_id.0, points: *points },
                now,
            )),
            GameEventData::GameOver { final_score } => {
                match self.end_game(*final_score, session_active, now) {
                    Ok(action) => Some(action),
                    Err(e) => {
                        debug!("EndGame not sent: {}", e);
                        None
                    }
                }
            }
            GameEventData::EnemySpawned { .. }
            | GameEventData::EnemyEscaped { .. }
            | GameEventData::PlayerHit { .. } => None,
        }
    }

    /// Emit the coalesced Move once its window has elapsed.
    pub fn flush_moves(&mut self, now: Instant) -> Option<GameAction> {
        let window = self.move_window?;
        if now.saturating_duration_since(window.opened_at) < Duration::from_millis(self.config.move_window_ms) {
            return None;
        }
        self.move_window = None;
        Some(self.make_action(
            ActionKind::Move {
                direction: window.direction,
                x: window.position.x,
                y: window.position.y,
            },
            now,
        ))
    }

    /// Build the Register action.
    pub fn register(&mut self, name: &str, session_active: bool, now: Instant) -> Result<GameAction, EncodeError> {
        if !session_active {
            return Err(EncodeError::NoSession);
        }
        if self.registered {
            return Err(EncodeError::AlreadyRegistered);
        }
        let name = self.validate_name(name)?;
        self.registered = true;
        Ok(self.make_action(ActionKind::Register { name }, now))
    }

    /// Build the EndGame action.
    pub fn end_game(&mut self, final_score: u32, session_active: bool, now: Instant) -> Result<GameAction, EncodeError> {
        if !session_active {
            return Err(EncodeError::NoSession);
        }
        if self.ended {
            return Err(EncodeError::AlreadyEnded);
        }
        self.ended = true;
        Ok(self.make_action(ActionKind::EndGame { final_score }, now))
    }

    /// Check a player name. Returns the trimmed name.
    pub fn validate_name(&self, name: &str) -> Result<String, EncodeError> {
        let trimmed = name.trim();
        let len = trimmed.chars().count();
        if len < self.config.min_name_len {
            return Err(EncodeError::NameTooShort { len, min: self.config.min_name_len });
        }
        if len > self.config.max_name_len {
            return Err(EncodeError::NameTooLong { len, max: self.config.max_name_len });
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' ')))
        {
            return Err(EncodeError::InvalidNameChar(c));
        }
        Ok(trimmed.to_string())
    }

    /// Allow another Register after the previous one failed on chain.
    pub fn release_registration(&mut self) {
        self.registered = false;
    }

    /// A new session was installed: clear the once-per-session guards.
    pub fn reset_session(&mut self) {
        self.registered = false;
        self.ended = false;
        self.move_window = None;
        self.shot_ticks.clear();
    }

    /// Forget any Move waiting in the coalescing window.
    pub fn drop_pending_move(&mut self) {
        self.move_window = None;
    }

    /// Register already sent this session?
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Events dropped for lack of a session.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }

    /// Shots dropped by the rate cap.
    pub fn throttled_shots(&self) -> u64 {
        self.throttled_shots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::EntityId;

    fn moved(tick: u64, x: f32) -> GameEvent {
        GameEvent::player_moved(tick, 1, Vec2::new(x, 500.0))
    }

    fn shot(tick: u64) -> GameEvent {
        GameEvent::shot_fired(tick, EntityId(tick as u32), Vec2::new(100.0, 480.0))
    }

    #[test]
    fn test_three_moves_one_submission() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);

        assert!(enc.encode(&moved(1, 10.0), true, t0).is_none());
        assert!(enc.encode(&moved(4, 20.0), true, t0 + Duration::from_millis(50)).is_none());
        assert!(enc.encode(&moved(9, 30.0), true, t0 + Duration::from_millis(150)).is_none());

        assert!(enc.flush_moves(t0 + Duration::from_millis(199)).is_none());
        let action = enc.flush_moves(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Move { direction: Direction::Right, x: 30.0, y: 500.0 }
        );
        assert!(enc.flush_moves(t0 + Duration::from_millis(400)).is_none());
    }

    #[test]
    fn test_shot_rate_cap() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);

        let sent = (0..7).filter(|i| enc.encode(&shot(*i), true, t0).is_some()).count();
        assert_eq!(sent, 5);
        assert_eq!(enc.throttled_shots(), 2);

        // The window is measured in ticks: tick 0 leaves it at tick 60
        assert!(enc.encode(&shot(59), true, t0 + Duration::from_secs(5)).is_none());
        assert!(enc.encode(&shot(60), true, t0).is_some());
        assert_eq!(enc.throttled_shots(), 3);
    }

    #[test]
    fn test_cooldown_paced_fire_never_throttled() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);
        let dt = Duration::from_nanos(16_666_666);

        // One shot every 12 ticks, frame timestamps slightly short of real time
        for i in 0..50u64 {
            let tick = i * 12;
            let now = t0 + dt * tick as u32;
            assert!(enc.encode(&shot(tick), true, now).is_some(), "shot at tick {} throttled", tick);
        }
        assert_eq!(enc.throttled_shots(), 0);
    }

    #[test]
    fn test_kills_always_forwarded() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);
        for i in 0..20u32 {
            let event = GameEvent::enemy_killed(1, EntityId(i + 1), EntityId(100), 10, 10 * (i + 1));
            let action = enc.encode(&event, true, t0).unwrap();
            assert_eq!(action.kind, ActionKind::Kill { enemy_id: i + 1, points: 10 });
        }
    }

    #[test]
    fn test_sequence_strictly_increasing() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);
        let mut seqs = Vec::new();

        seqs.push(enc.encode(&shot(1), true, t0).unwrap().sequence);
        enc.encode(&moved(2, 40.0), true, t0);
        seqs.push(enc.register("pilot", true, t0).unwrap().sequence);
        seqs.push(enc.flush_moves(t0 + Duration::from_millis(250)).unwrap().sequence);
        seqs.push(enc.end_game(10, true, t0).unwrap().sequence);

        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_lifecycle_once_per_session() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);

        assert!(enc.register("pilot", true, t0).is_ok());
        assert_eq!(enc.register("pilot", true, t0), Err(EncodeError::AlreadyRegistered));
        assert!(enc.end_game(100, true, t0).is_ok());
        assert_eq!(enc.end_game(100, true, t0), Err(EncodeError::AlreadyEnded));

        let over = GameEvent::game_over(50, 100);
        assert!(enc.encode(&over, true, t0).is_none());

        enc.reset_session();
        assert!(enc.register("pilot", true, t0).is_ok());
        assert!(enc.encode(&over, true, t0).is_some());
    }

    #[test]
    fn test_release_registration_allows_retry() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);
        enc.register("pilot", true, t0).unwrap();
        enc.release_registration();
        assert!(!enc.is_registered());
        assert!(enc.register("pilot", true, t0).is_ok());
    }

    #[test]
    fn test_no_session_suppresses() {
        let t0 = Instant::now();
        let mut enc = ActionEncoder::new(EncoderConfig::default(), t0, 60);

        assert!(enc.encode(&shot(1), false, t0).is_none());
        assert!(enc.encode(&moved(2, 5.0), false, t0).is_none());
        assert!(enc.flush_moves(t0 + Duration::from_secs(1)).is_none());
        assert_eq!(enc.suppressed_count(), 2);
        assert_eq!(enc.register("pilot", false, t0), Err(EncodeError::NoSession));
    }

    #[test]
    fn test_name_validation() {
        let enc = ActionEncoder::new(EncoderConfig::default(), Instant::now(), 60);

        assert_eq!(enc.validate_name("  ace_1 "), Ok("ace_1".to_string()));
        assert_eq!(enc.validate_name("Top Gun-2"), Ok("Top Gun-2".to_string()));
        assert_eq!(enc.validate_name(" ab "), Err(EncodeError::NameTooShort { len: 2, min: 3 }));
        assert_eq!(
            enc.validate_name(&"x".repeat(21)),
            Err(EncodeError::NameTooLong { len: 21, max: 20 })
        );
        assert_eq!(enc.validate_name("bad!name"), Err(EncodeError::InvalidNameChar('!')));
    }
}
