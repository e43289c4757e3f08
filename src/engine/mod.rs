//! Engine Module
//!
//! Everything concurrent lives here; the simulation itself stays pure in
//! [`crate::game`].
//!
//! - `simulation`: mutation lock, step/restart, frame loop
//! - `bridge`: controller-facing synchronisation protocol
//! - `throttle`: adaptive ticks-per-frame control

pub mod bridge;
pub mod simulation;
pub mod throttle;

pub use bridge::{Controller, EpisodeOver, SyncBridge};
pub use simulation::{EngineStatus, FrameReport, SimulationEngine, StepReport};
pub use throttle::{AdaptiveThrottle, TpsMeter};
