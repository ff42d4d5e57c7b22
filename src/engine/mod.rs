//! Engine Module
//!
//! The host-facing engine and what it needs to run.
//!
//! ## Module Structure
//!
//! - `clock`: Fixed-timestep clock and lifecycle state
//! - `config`: Engine configuration (defaults, JSON, environment)
//! - `listener`: Host callbacks
//! - `facade`: The [`Engine`] itself

pub mod clock;
pub mod config;
pub mod listener;
pub mod facade;

pub use clock::{ClockConfig, ClockError, ClockState, SimulationClock};
pub use config::{ConfigError, EngineConfig};
pub use listener::{EngineListener, ListenerId, Listeners, NoopListener};
pub use facade::{Engine, EngineError, PendingRegistration, RegistrationError};
