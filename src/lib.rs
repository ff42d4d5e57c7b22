//! # Chain Shooter Engine
//!
//! Real-time arcade shooter whose player actions are mirrored on chain
//! through a gasless session signer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CHAIN SHOOTER ENGINE                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── vec2.rs     - 2D float vector                           │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Simulation (deterministic)                │
//! │  ├── input.rs    - Keyboard sampling and recordings          │
//! │  ├── state.rs    - Entity arena and game state               │
//! │  ├── tick.rs     - Fixed-step simulation                     │
//! │  ├── collision.rs- Bounding-circle collisions                │
//! │  ├── spawn.rs    - Enemy schedule and difficulty             │
//! │  └── render.rs   - Canvas drawing                            │
//! │                                                              │
//! │  chain/          - Transaction pipeline (non-deterministic)  │
//! │  ├── encoder.rs  - Events to actions                         │
//! │  ├── dispatcher.rs - Queue, retries, rate limit              │
//! │  ├── metrics.rs  - Rolling statistics                        │
//! │  └── feed.rs     - Recent transactions                       │
//! │                                                              │
//! │  engine/         - Host surface                              │
//! │  ├── clock.rs    - Fixed-timestep clock                      │
//! │  ├── config.rs   - Configuration                             │
//! │  └── facade.rs   - Engine                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules never read the system clock and draw all
//! randomness from a seeded Xorshift128+. Entities live in an id-sorted
//! `Vec`, so iteration order is fixed. Given the same seed and input
//! recording, a replay reaches the same state hash.
//!
//! Chain submissions run beside the simulation and never feed back into it:
//! a failed transaction does not roll back local gameplay.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod chain;
pub mod engine;

// Re-export commonly used types
pub use core::vec2::Vec2;
pub use core::rng::DeterministicRng;
pub use game::input::{InputFrame, Key};
pub use game::state::{EntityId, SimulationState};
pub use game::render::{Canvas, CommandCanvas};
pub use chain::action::{ActionKind, GameAction};
pub use chain::signer::{SessionHandle, SessionSigner, Signature, SignerError};
pub use chain::metrics::PerformanceStats;
pub use engine::{Engine, EngineConfig, EngineError, EngineListener, NoopListener};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;

/// Logical canvas width
pub const CANVAS_WIDTH: f32 = 800.0;

/// Logical canvas height
pub const CANVAS_HEIGHT: f32 = 600.0;
