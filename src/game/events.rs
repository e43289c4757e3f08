//! Episode Events
//!
//! Events generated during a step, for logging and replay comparison.

use serde::{Serialize, Deserialize};

use crate::game::obstacle::ObstacleId;
use crate::game::state::AgentId;

/// Why an agent was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EliminationCause {
    /// Left the vertical bounds of the field.
    OutOfBounds,
    /// Hit an obstacle column.
    Collision(ObstacleId),
}

/// Event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeEventData {
    /// A new obstacle entered on the right.
    ObstacleSpawned {
        obstacle_id: ObstacleId,
        gap_top: i32,
    },

    /// The scoring reference passed an obstacle.
    ObstacleScored {
        obstacle_id: ObstacleId,
        new_score: u32,
    },

    /// An agent was removed from the live set.
    AgentEliminated {
        agent_id: AgentId,
        cause: EliminationCause,
    },

    /// The live set became empty.
    EpisodeEnded {
        score: u32,
    },
}

/// An event stamped with the step that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeEvent {
    /// Step id the event belongs to.
    pub step_id: u64,

    /// Event data
    pub data: EpisodeEventData,
}

impl EpisodeEvent {
    /// Create obstacle spawned event.
    pub fn obstacle_spawned(step_id: u64, obstacle_id: ObstacleId, gap_top: i32) -> Self {
        Self {
            step_id,
            data: EpisodeEventData::ObstacleSpawned { obstacle_id, gap_top },
        }
    }

    /// Create obstacle scored event.
    pub fn obstacle_scored(step_id: u64, obstacle_id: ObstacleId, new_score: u32) -> Self {
        Self {
            step_id,
            data: EpisodeEventData::ObstacleScored { obstacle_id, new_score },
        }
    }

    /// Create agent eliminated event.
    pub fn agent_eliminated(step_id: u64, agent_id: AgentId, cause: EliminationCause) -> Self {
        Self {
            step_id,
            data: EpisodeEventData::AgentEliminated { agent_id, cause },
        }
    }

    /// Create episode ended event.
    pub fn episode_ended(step_id: u64, score: u32) -> Self {
        Self {
            step_id,
            data: EpisodeEventData::EpisodeEnded { score },
        }
    }
}
