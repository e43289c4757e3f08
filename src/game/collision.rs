//! Collision Detection
//!
//! Deterministic pruning of the live agent set against the field bounds and
//! the active obstacles.

use crate::config::SimConfig;
use crate::game::events::EliminationCause;
use crate::game::state::{AgentId, EpisodeState};

/// An agent removed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elimination {
    /// Removed agent.
    pub agent_id: AgentId,
    /// What removed it.
    pub cause: EliminationCause,
}

/// Remove every agent that is out of bounds or hits an obstacle.
///
/// Bounds are checked for every live agent first, then obstacles in FIFO
/// order against agents in id order. Removal is immediate: an agent removed
/// by one obstacle is not tested against later ones.
pub fn prune_agents(state: &mut EpisodeState, config: &SimConfig) -> Vec<Elimination> {
    let mut eliminated = Vec::new();
    let bound = config.ground_y();

    state.agents.retain(|id, agent| {
        if agent.off_screen(config.agent_height, bound) {
            eliminated.push(Elimination {
                agent_id: *id,
                cause: EliminationCause::OutOfBounds,
            });
            false
        } else {
            true
        }
    });

    for obstacle in &state.obstacles {
        if state.agents.is_empty() {
            break;
        }
        state.agents.retain(|id, agent| {
            if obstacle.collides(agent, config) {
                eliminated.push(Elimination {
                    agent_id: *id,
                    cause: EliminationCause::Collision(obstacle.id),
                });
                false
            } else {
                true
            }
        });
    }

    eliminated
}
