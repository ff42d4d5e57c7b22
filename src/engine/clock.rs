//! Simulation Clock
//!
//! Fixed-timestep accumulator. Real frame time goes in, a number of
//! simulation ticks to run comes out.
//!
//! ```text
//! Stopped --start--> Running <--pause/start--> Paused
//!    \                  |                        /
//!     `----------------destroy------------------'
//!                       v
//!                   Destroyed
//! ```

use std::time::{Duration, Instant};

use serde::{Serialize, Deserialize};
use tracing::debug;

/// Clock tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Catch-up limit per frame
    pub max_ticks_per_frame: u32,
    /// Frame deltas above this are clamped
    pub max_frame_delta_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::TICK_RATE,
            max_ticks_per_frame: 5,
            max_frame_delta_ms: 250,
        }
    }
}

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockState {
    /// Never started
    Stopped,
    /// Ticking
    Running,
    /// Frozen, resumable
    Paused,
    /// Terminal
    Destroyed,
}

/// Clock errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Used after destroy.
    #[error("instance destroyed")]
    Destroyed,
}

/// Fixed-step simulation clock.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    config: ClockConfig,
    state: ClockState,
    accumulator: Duration,
    last_frame: Option<Instant>,
    total_ticks: u64,
    dropped_ticks: u64,
}

impl SimulationClock {
    /// Stopped clock.
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            state: ClockState::Stopped,
            accumulator: Duration::ZERO,
            last_frame: None,
            total_ticks: 0,
            dropped_ticks: 0,
        }
    }

    /// Duration of one tick.
    pub fn fixed_dt(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.config.tick_rate.max(1)))
    }

    /// Start or resume. Time is re-baselined on the next frame.
    pub fn start(&mut self) -> Result<(), ClockError> {
        match self.state {
            ClockState::Destroyed => Err(ClockError::Destroyed),
            ClockState::Running => Ok(()),
            ClockState::Stopped | ClockState::Paused => {
                self.state = ClockState::Running;
                self.last_frame = None;
                self.accumulator = Duration::ZERO;
                Ok(())
            }
        }
    }

    /// Freeze tick advancement.
    pub fn pause(&mut self) -> Result<(), ClockError> {
        match self.state {
            ClockState::Destroyed => Err(ClockError::Destroyed),
            ClockState::Running => {
                self.state = ClockState::Paused;
                Ok(())
            }
            ClockState::Stopped | ClockState::Paused => Ok(()),
        }
    }

    /// Enter the terminal state. Idempotent.
    pub fn destroy(&mut self) {
        self.state = ClockState::Destroyed;
        self.last_frame = None;
        self.accumulator = Duration::ZERO;
    }

    /// Feed a frame timestamp; returns how many ticks to run now.
    pub fn advance(&mut self, now: Instant) -> u32 {
        if self.state != ClockState::Running {
            return 0;
        }
        let Some(last) = self.last_frame.replace(now) else {
            return 0;
        };

        let max_delta = Duration::from_millis(self.config.max_frame_delta_ms);
        self.accumulator += now.saturating_duration_since(last).min(max_delta);

        let dt = self.fixed_dt();
        let mut ticks = 0;
        while self.accumulator >= dt && ticks < self.config.max_ticks_per_frame {
            self.accumulator -= dt;
            ticks += 1;
        }
        if self.accumulator >= dt {
            // Catch-up cap hit: forget the backlog
            let dropped = (self.accumulator.as_nanos() / dt.as_nanos()) as u64;
            self.dropped_ticks += dropped;
            self.accumulator = Duration::ZERO;
            debug!("Clock fell behind, dropped {} ticks", dropped);
        }

        self.total_ticks += u64::from(ticks);
        ticks
    }

    /// Current state.
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Running?
    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    /// Paused?
    pub fn is_paused(&self) -> bool {
        self.state == ClockState::Paused
    }

    /// Destroyed?
    pub fn is_destroyed(&self) -> bool {
        self.state == ClockState::Destroyed
    }

    /// Ticks handed out so far.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Ticks discarded by the catch-up cap.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }

    /// Configured tick rate.
    pub fn tick_rate(&self) -> u32 {
        self.config.tick_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> (SimulationClock, Instant) {
        let mut clock = SimulationClock::new(ClockConfig::default());
        clock.start().unwrap();
        let t0 = Instant::now();
        assert_eq!(clock.advance(t0), 0);
        (clock, t0)
    }

    #[test]
    fn test_one_tick_per_dt() {
        let (mut clock, t0) = running();
        let dt = clock.fixed_dt();
        let mut now = t0;
        for _ in 0..60 {
            now += dt;
            assert_eq!(clock.advance(now), 1);
        }
        assert_eq!(clock.total_ticks(), 60);
    }

    #[test]
    fn test_accumulates_partial_frames() {
        let (mut clock, t0) = running();
        let half = clock.fixed_dt() / 2;
        assert_eq!(clock.advance(t0 + half), 0);
        assert_eq!(clock.advance(t0 + half * 2), 1);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let (mut clock, t0) = running();
        // Backgrounded tab: 3 seconds in one frame
        assert_eq!(clock.advance(t0 + Duration::from_secs(3)), 5);
        assert!(clock.dropped_ticks() > 0);

        let dt = clock.fixed_dt();
        assert_eq!(clock.advance(t0 + Duration::from_secs(3) + dt), 1);
    }

    #[test]
    fn test_pause_freezes_and_resume_rebaselines() {
        let (mut clock, t0) = running();
        let dt = clock.fixed_dt();
        assert_eq!(clock.advance(t0 + dt), 1);

        clock.pause().unwrap();
        assert!(clock.is_paused());
        assert_eq!(clock.advance(t0 + dt * 30), 0);

        clock.start().unwrap();
        let resumed = t0 + Duration::from_secs(10);
        assert_eq!(clock.advance(resumed), 0);
        assert_eq!(clock.advance(resumed + dt), 1);
    }

    #[test]
    fn test_start_is_noop_when_running() {
        let (mut clock, t0) = running();
        let dt = clock.fixed_dt();
        clock.advance(t0 + dt / 2);
        clock.start().unwrap();
        assert_eq!(clock.advance(t0 + dt), 1);
    }

    #[test]
    fn test_destroy_is_terminal() {
        let (mut clock, t0) = running();
        clock.destroy();
        clock.destroy();
        assert!(clock.is_destroyed());
        assert_eq!(clock.start(), Err(ClockError::Destroyed));
        assert_eq!(clock.pause(), Err(ClockError::Destroyed));
        assert_eq!(clock.advance(t0 + Duration::from_secs(1)), 0);
        assert_eq!(ClockError::Destroyed.to_string(), "instance destroyed");
    }
}
