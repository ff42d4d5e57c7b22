//! Game Logic Module
//!
//! The deterministic shooter simulation and its renderer.
//!
//! ## Module Structure
//!
//! - `input`: Keyboard sampling and input recordings
//! - `state`: Entity arena and simulation state
//! - `tick`: Fixed-step simulation
//! - `collision`: Bounding-circle collision detection
//! - `spawn`: Enemy spawn schedule and difficulty scaling
//! - `events`: Events produced by a tick
//! - `render`: Canvas abstraction and frame drawing

pub mod input;
pub mod state;
pub mod tick;
pub mod collision;
pub mod spawn;
pub mod events;
pub mod render;

// Re-export key types
pub use input::{InputFrame, InputRecording, InputSampler, Key};
pub use state::{Entity, EntityId, EntityKind, SimulationError, SimulationState};
pub use tick::{SimConfig, TickResult};
pub use events::{GameEvent, GameEventData};
pub use render::{Canvas, Color, CommandCanvas, DrawCommand, Renderer};
