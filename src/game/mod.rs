//! Simulation Logic Module
//!
//! All episode simulation code. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `agent`: Vertical physics of one agent
//! - `obstacle`: Scrolling gap columns and their collision test
//! - `spawner`: Periodic obstacle countdown
//! - `state`: Episode state and ids
//! - `tick`: Authoritative step and replay
//! - `collision`: Bounds and obstacle pruning
//! - `snapshot`: Immutable published views
//! - `input`: Jump batches and input recording
//! - `events`: Step events for logging/replay

pub mod agent;
pub mod obstacle;
pub mod spawner;
pub mod state;
pub mod tick;
pub mod collision;
pub mod snapshot;
pub mod input;
pub mod events;

// Re-export key types
pub use agent::AgentState;
pub use obstacle::{ObstacleId, ObstacleState};
pub use spawner::ObstacleSpawner;
pub use state::{AgentId, EpisodeMode, EpisodeState};
pub use tick::{step, replay_episode, StepResult};
pub use snapshot::{AgentSensors, Snapshot};
pub use input::{EpisodeRecording, InputBatch, RecordingError};
pub use events::{EliminationCause, EpisodeEvent, EpisodeEventData};
