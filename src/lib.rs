//! # Flappy Swarm
//!
//! Deterministic flappy-style simulation driven by concurrent autonomous
//! controllers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FLAPPY SWARM                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point arithmetic             │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  game/           - Simulation logic (deterministic)          │
//! │  ├── agent.rs    - Agent physics                             │
//! │  ├── obstacle.rs - Gap columns and collision                 │
//! │  ├── spawner.rs  - Periodic obstacle spawning                │
//! │  ├── state.rs    - Episode state                             │
//! │  ├── tick.rs     - Authoritative step and replay             │
//! │  ├── collision.rs - Bounds and obstacle pruning              │
//! │  ├── events.rs   - Per-step events                           │
//! │  ├── snapshot.rs - Published sensor views                    │
//! │  └── input.rs    - Jump batches and recordings               │
//! │                                                              │
//! │  engine/         - Concurrency (non-deterministic timing)    │
//! │  ├── simulation.rs - Mutation lock, step, restart, loop      │
//! │  ├── bridge.rs   - Controller synchronisation protocol       │
//! │  └── throttle.rs - Adaptive ticks-per-frame                  │
//! │                                                              │
//! │  network/        - WebSocket controller gateway              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are **100% deterministic**:
//! - No floating-point arithmetic in simulation logic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from a seeded Xorshift128+ per episode
//!
//! Given the same config, generation and input batches, an episode replays
//! to an identical state hash. Timing only decides *which* batch a step
//! sees, and the engine records that.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod demo;
pub mod engine;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{Config, ConfigError, EngineConfig, SimConfig};
pub use core::fixed::{Fixed, FIXED_ONE, FIXED_HALF, FIXED_SCALE};
pub use core::rng::DeterministicRng;
pub use engine::{Controller, EpisodeOver, SimulationEngine, SyncBridge};
pub use game::input::InputBatch;
pub use game::snapshot::Snapshot;
pub use game::state::{AgentId, EpisodeState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
