//! Input Capture and Sampling
//!
//! Keyboard state is tracked by the [`InputSampler`] as key events arrive and
//! sampled once per tick into a compact [`InputFrame`]. Frames can be
//! recorded into an [`InputRecording`] for deterministic replay.

use serde::{Serialize, Deserialize};

// =============================================================================
// KEYS
// =============================================================================

/// The only keys the engine consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Move left
    ArrowLeft,
    /// Move right
    ArrowRight,
    /// Shoot attempt (subject to cooldown)
    Space,
}

impl Key {
    /// Map a DOM `KeyboardEvent.code` string to a key.
    ///
    /// Returns None for keys the engine ignores.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ArrowLeft" => Some(Key::ArrowLeft),
            "ArrowRight" => Some(Key::ArrowRight),
            "Space" | " " => Some(Key::Space),
            _ => None,
        }
    }
}

// =============================================================================
// INPUT FRAME
// =============================================================================

/// Sampled input state for a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputFrame {
    /// Packed key flags:
    /// - Bit 0: left held
    /// - Bit 1: right held
    /// - Bit 2: shoot held
    pub flags: u8,
}

impl InputFrame {
    /// Left flag bit
    pub const FLAG_LEFT: u8 = 0x01;

    /// Right flag bit
    pub const FLAG_RIGHT: u8 = 0x02;

    /// Shoot flag bit
    pub const FLAG_SHOOT: u8 = 0x04;

    /// Create an idle frame.
    pub const fn new() -> Self {
        Self { flags: 0 }
    }

    /// Create a frame from explicit key states.
    pub const fn with_keys(left: bool, right: bool, shoot: bool) -> Self {
        let mut flags = 0;
        if left {
            flags |= Self::FLAG_LEFT;
        }
        if right {
            flags |= Self::FLAG_RIGHT;
        }
        if shoot {
            flags |= Self::FLAG_SHOOT;
        }
        Self { flags }
    }

    /// Horizontal direction: -1 (left), 0 (none or both), +1 (right).
    #[inline]
    pub fn horizontal(&self) -> i8 {
        let left = self.flags & Self::FLAG_LEFT != 0;
        let right = self.flags & Self::FLAG_RIGHT != 0;
        match (left, right) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        }
    }

    /// Check if shoot is held this frame.
    #[inline]
    pub fn shoot_held(&self) -> bool {
        self.flags & Self::FLAG_SHOOT != 0
    }

    /// Check if this is an idle frame.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.flags == 0
    }
}

// =============================================================================
// INPUT SAMPLER
// =============================================================================

/// Tracks held keys between frames.
///
/// The host forwards key events; the clock samples once per tick.
/// After [`detach`](Self::detach) every event is ignored and sampling
/// yields idle frames.
#[derive(Debug, Default)]
pub struct InputSampler {
    left: bool,
    right: bool,
    shoot: bool,
    detached: bool,
}

impl InputSampler {
    /// Create a sampler with no keys held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a key press.
    pub fn key_down(&mut self, key: Key) {
        self.set(key, true);
    }

    /// Handle a key release.
    pub fn key_up(&mut self, key: Key) {
        self.set(key, false);
    }

    fn set(&mut self, key: Key, held: bool) {
        if self.detached {
            return;
        }
        match key {
            Key::ArrowLeft => self.left = held,
            Key::ArrowRight => self.right = held,
            Key::Space => self.shoot = held,
        }
    }

    /// Release every key (window blur, pause).
    pub fn release_all(&mut self) {
        self.left = false;
        self.right = false;
        self.shoot = false;
    }

    /// Stop listening for good.
    pub fn detach(&mut self) {
        self.release_all();
        self.detached = true;
    }

    /// Whether the sampler still accepts events.
    pub fn is_attached(&self) -> bool {
        !self.detached
    }

    /// Sample the current key state.
    pub fn sample(&self) -> InputFrame {
        InputFrame::with_keys(self.left, self.right, self.shoot)
    }
}

// =============================================================================
// INPUT RECORDING
// =============================================================================

/// Input state change at a given tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDelta {
    /// Tick when this input state began
    pub tick: u64,
    /// The new input state
    pub frame: InputFrame,
}

/// Delta-compressed input recording for one session.
///
/// Only stores ticks where input CHANGED.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InputRecording {
    deltas: Vec<InputDelta>,
    end_tick: u64,
    #[serde(skip)]
    last_frame: InputFrame,
}

impl InputRecording {
    /// Create an empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record input for a tick.
    pub fn record(&mut self, tick: u64, frame: InputFrame) {
        self.end_tick = tick;
        if frame != self.last_frame {
            self.deltas.push(InputDelta { tick, frame });
            self.last_frame = frame;
        }
    }

    /// Get input at a specific tick.
    pub fn input_at(&self, tick: u64) -> InputFrame {
        let idx = self.deltas.partition_point(|d| d.tick <= tick);
        if idx == 0 {
            InputFrame::new()
        } else {
            self.deltas[idx - 1].frame
        }
    }

    /// Last recorded tick.
    pub fn end_tick(&self) -> u64 {
        self.end_tick
    }

    /// Number of delta entries.
    pub fn delta_count(&self) -> usize {
        self.deltas.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
