//! State Snapshots
//!
//! Immutable value copies of an episode handed to controllers. Positions are
//! normalised to fractions of the field so controllers never need the
//! simulation's geometry.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::config::SimConfig;
use crate::core::fixed::{to_f64, Fixed};
use crate::game::state::{AgentId, EpisodeState};

/// Normalised view of one live agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSensors {
    /// Top edge over field height.
    pub position_fraction: f64,
    /// Velocity over terminal velocity, in `[-1, 1]`.
    pub velocity_fraction: f64,
}

/// Published view of an episode at one step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Episode generation.
    pub generation: u64,
    /// Step the snapshot was taken after.
    pub step_id: u64,
    /// Score at that step.
    pub score: u32,
    /// Whether the episode had ended.
    pub over: bool,
    /// Live agents.
    pub agents: BTreeMap<AgentId, AgentSensors>,
    /// Top of the nearest unscored gap over field height, 0 if none.
    pub nearest_gap_top: f64,
    /// Bottom of the nearest unscored gap over field height, 1 if none.
    pub nearest_gap_bottom: f64,
}

impl Snapshot {
    /// Copy the observable parts of `state`.
    pub fn capture(state: &EpisodeState, config: &SimConfig) -> Self {
        let height = f64::from(config.field_height);
        let terminal = config.agent_physics().terminal_velocity;

        let agents = state
            .agents
            .iter()
            .map(|(id, agent)| {
                let sensors = AgentSensors {
                    position_fraction: to_f64(agent.y) / height,
                    velocity_fraction: velocity_fraction(agent.velocity, terminal),
                };
                (*id, sensors)
            })
            .collect();

        let (nearest_gap_top, nearest_gap_bottom) = match state.nearest_gap() {
            Some((top, bottom)) => (
                (f64::from(top) / height).clamp(0.0, 1.0),
                (f64::from(bottom) / height).clamp(0.0, 1.0),
            ),
            None => (0.0, 1.0),
        };

        Self {
            generation: state.generation,
            step_id: state.step_id,
            score: state.score,
            over: state.is_over(),
            agents,
            nearest_gap_top,
            nearest_gap_bottom,
        }
    }

    /// Sensor vector `[position, velocity, gap_top, gap_bottom]` for an agent.
    pub fn sensors(&self, id: AgentId) -> Option<[f64; 4]> {
        self.agents.get(&id).map(|s| {
            [
                s.position_fraction,
                s.velocity_fraction,
                self.nearest_gap_top,
                self.nearest_gap_bottom,
            ]
        })
    }

    /// Number of live agents.
    pub fn alive_count(&self) -> usize {
        self.agents.len()
    }

    /// Whether `self` is newer than the `(generation, step_id)` a caller last saw.
    pub fn is_newer_than(&self, seen: Option<(u64, u64)>) -> bool {
        match seen {
            None => true,
            Some(seen) => (self.generation, self.step_id) > seen,
        }
    }
}

fn velocity_fraction(velocity: Fixed, terminal: Fixed) -> f64 {
    if terminal == 0 {
        return 0.0;
    }
    (to_f64(velocity) / to_f64(terminal)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::from_int;
    use crate::game::obstacle::{ObstacleId, ObstacleState};

    #[test]
    fn test_capture_fractions() {
        let config = SimConfig::default();
        let mut state = EpisodeState::new(&config, 2, 5);
        {
            let agent = state.agents.get_mut(&AgentId(0)).unwrap();
            agent.y = from_int(240);
            agent.velocity = from_int(48);
        }
        state.agents.get_mut(&AgentId(1)).unwrap().velocity = from_int(-200);
        state.step_id = 17;

        let snapshot = Snapshot::capture(&state, &config);

        assert_eq!(snapshot.generation, 5);
        assert_eq!(snapshot.step_id, 17);
        assert_eq!(snapshot.alive_count(), 2);

        let sensors = snapshot.sensors(AgentId(0)).unwrap();
        assert_eq!(sensors, [0.5, 0.5, 0.0, 1.0]);
        assert_eq!(snapshot.agents[&AgentId(1)].velocity_fraction, -1.0);
        assert!(snapshot.sensors(AgentId(9)).is_none());
    }

    #[test]
    fn test_capture_nearest_gap() {
        let config = SimConfig::default();
        let mut state = EpisodeState::new(&config, 1, 0);
        state.obstacles.push_back(ObstacleState {
            id: ObstacleId(0),
            x: 300,
            width: config.obstacle_width(),
            gap_top: 120,
            gap_height: config.gap_height,
            passed: false,
            scored: false,
        });
        state.ahead.push_back(ObstacleId(0));

        let snapshot = Snapshot::capture(&state, &config);

        assert_eq!(snapshot.nearest_gap_top, 0.25);
        assert_eq!(snapshot.nearest_gap_bottom, 0.625);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let config = SimConfig::default();
        let mut state = EpisodeState::new(&config, 3, 0);
        let snapshot = Snapshot::capture(&state, &config);

        state.agents.clear();
        state.score = 9;

        assert_eq!(snapshot.alive_count(), 3);
        assert_eq!(snapshot.score, 0);
    }

    #[test]
    fn test_novelty_ordering() {
        let config = SimConfig::default();
        let mut state = EpisodeState::new(&config, 1, 2);
        state.step_id = 10;
        let snapshot = Snapshot::capture(&state, &config);

        assert!(snapshot.is_newer_than(None));
        assert!(snapshot.is_newer_than(Some((2, 9))));
        assert!(!snapshot.is_newer_than(Some((2, 10))));
        // A new generation restarts step ids but is still newer.
        assert!(snapshot.is_newer_than(Some((1, 500))));
        assert!(!snapshot.is_newer_than(Some((3, 0))));
    }
}
