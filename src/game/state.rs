//! Episode State Definitions
//!
//! All state owned by one episode of the simulation.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::SimConfig;
use crate::core::hash::{StateHash, compute_state_hash};
use crate::core::rng::{DeterministicRng, derive_episode_seed};
use crate::game::agent::AgentState;
use crate::game::events::EpisodeEvent;
use crate::game::obstacle::{ObstacleId, ObstacleState};
use crate::game::spawner::ObstacleSpawner;

// =============================================================================
// AGENT ID
// =============================================================================

/// Agent identifier, unique within an episode.
///
/// Ids are assigned `0..population` at restart. Implements Ord for
/// deterministic BTreeMap ordering.
///
/// Serialized as a bare integer. Human-readable formats also accept a
/// decimal string, since JSON map keys are strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

impl Serialize for AgentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for AgentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Keys buffered by internally tagged enums reach us as strings.
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AgentIdVisitor)
        } else {
            u32::deserialize(deserializer).map(AgentId)
        }
    }
}

struct AgentIdVisitor;

impl<'de> Visitor<'de> for AgentIdVisitor {
    type Value = AgentId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an agent id as an integer or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<AgentId, E> {
        u32::try_from(v)
            .map(AgentId)
            .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<AgentId, E> {
        u32::try_from(v)
            .map(AgentId)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<AgentId, E> {
        v.parse()
            .map(AgentId)
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

// =============================================================================
// EPISODE MODE
// =============================================================================

/// Episode lifecycle. `Playing -> Over` happens exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeMode {
    /// Agents alive, simulation advancing.
    Playing,
    /// Every agent has been removed; frozen until restart.
    Over,
}

// =============================================================================
// EPISODE STATE
// =============================================================================

/// Complete state of one episode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpisodeState {
    /// Restart counter, survives across episodes.
    pub generation: u64,

    /// Seed this episode's RNG was derived from.
    pub seed: u64,

    /// Lifecycle mode.
    pub mode: EpisodeMode,

    /// Completed steps since restart.
    pub step_id: u64,

    /// Obstacles passed by the scoring reference.
    pub score: u32,

    /// Ticks per external frame, mirrored from the throttle.
    pub tick_multiplier: u32,

    /// Population the episode started with.
    pub population: u32,

    /// Live agents. Removal is permanent for the episode.
    pub agents: BTreeMap<AgentId, AgentState>,

    /// Active obstacles, oldest (leftmost) first.
    pub obstacles: VecDeque<ObstacleState>,

    /// Obstacles not yet scored, oldest first. Subsequence of `obstacles`.
    pub ahead: VecDeque<ObstacleId>,

    /// Ground tiling offset in `[0, tile_size)`.
    pub ground_offset: i32,

    /// Obstacle countdown.
    pub spawner: ObstacleSpawner,

    /// Episode RNG.
    pub rng: DeterministicRng,

    /// Events generated this tick (cleared each tick).
    #[serde(skip)]
    events: Vec<EpisodeEvent>,
}

impl EpisodeState {
    /// Start an episode with `population` agents.
    ///
    /// Agents spawn at random heights in the upper-middle band of the field,
    /// drawn from the episode RNG in id order.
    pub fn new(config: &SimConfig, population: u32, generation: u64) -> Self {
        let seed = derive_episode_seed(config.seed, generation);
        let mut rng = DeterministicRng::new(seed);

        let base_y = config.field_height * 3 / 4 - config.agent_height / 2;
        let spread = (config.field_height / 2).max(1) as u32;

        let agents = (0..population)
            .map(|i| {
                let id = AgentId(i);
                let y = base_y - rng.next_int(spread) as i32;
                (id, AgentState::new(id, y))
            })
            .collect();

        Self {
            generation,
            seed,
            mode: EpisodeMode::Playing,
            step_id: 0,
            score: 0,
            tick_multiplier: 1,
            population,
            agents,
            obstacles: VecDeque::new(),
            ahead: VecDeque::new(),
            ground_offset: 0,
            spawner: ObstacleSpawner::new(config.spawn_delay),
            rng,
            events: Vec::new(),
        }
    }

    /// Number of live agents.
    #[inline]
    pub fn alive_count(&self) -> usize {
        self.agents.len()
    }

    /// Whether the episode has ended.
    #[inline]
    pub fn is_over(&self) -> bool {
        self.mode == EpisodeMode::Over
    }

    /// Get a live agent.
    pub fn get_agent(&self, id: &AgentId) -> Option<&AgentState> {
        self.agents.get(id)
    }

    /// Look up an active obstacle. The list is sorted by id.
    pub fn obstacle(&self, id: ObstacleId) -> Option<&ObstacleState> {
        self.obstacles
            .binary_search_by_key(&id, |o| o.id)
            .ok()
            .map(|idx| &self.obstacles[idx])
    }

    /// Mutable lookup of an active obstacle.
    pub fn obstacle_mut(&mut self, id: ObstacleId) -> Option<&mut ObstacleState> {
        match self.obstacles.binary_search_by_key(&id, |o| o.id) {
            Ok(idx) => self.obstacles.get_mut(idx),
            Err(_) => None,
        }
    }

    /// Gap `(top, bottom)` of the oldest obstacle not yet scored.
    pub fn nearest_gap(&self) -> Option<(i32, i32)> {
        self.ahead
            .front()
            .and_then(|id| self.obstacle(*id))
            .map(|o| (o.gap_top, o.gap_bottom()))
    }

    /// Push an event.
    pub fn push_event(&mut self, event: EpisodeEvent) {
        self.events.push(event);
    }

    /// Take all events (clears the buffer).
    pub fn take_events(&mut self) -> Vec<EpisodeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Check the ordering invariants of the obstacle lists.
    ///
    /// Violations are programming errors, so this only runs in debug builds.
    pub fn debug_check_invariants(&self) {
        debug_assert!(
            self.obstacles.iter().zip(self.obstacles.iter().skip(1)).all(|(a, b)| a.id < b.id && a.x <= b.x),
            "active obstacles out of FIFO order"
        );
        debug_assert!(
            self.ahead.iter().zip(self.ahead.iter().skip(1)).all(|(a, b)| a < b),
            "ahead list out of order"
        );
        debug_assert!(
            self.ahead.iter().all(|id| self.obstacle(*id).is_some()),
            "ahead list references a retired obstacle"
        );
        debug_assert!(
            self.agents.keys().all(|id| id.0 < self.population),
            "agent id outside the starting population"
        );
    }

    /// Compute the state hash.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.step_id, self.generation, |hasher| {
            hasher.update_u64(self.seed);
            hasher.update_bool(self.is_over());
            hasher.update_u32(self.score);

            // Agents in sorted order
            hasher.update_u32(self.agents.len() as u32);
            for agent in self.agents.values() {
                hasher.update_u32(agent.id.0);
                hasher.update_fixed(agent.y);
                hasher.update_fixed(agent.velocity);
            }

            // Obstacles in FIFO order
            hasher.update_u32(self.obstacles.len() as u32);
            for obstacle in &self.obstacles {
                hasher.update_u64(obstacle.id.0);
                hasher.update_i32(obstacle.x);
                hasher.update_i32(obstacle.gap_top);
                hasher.update_bool(obstacle.passed);
                hasher.update_bool(obstacle.scored);
            }

            hasher.update_u32(self.ahead.len() as u32);
            for id in &self.ahead {
                hasher.update_u64(id.0);
            }

            hasher.update_i32(self.ground_offset);
            hasher.update_i32(self.spawner.timer());

            let rng_state = self.rng.state();
            hasher.update_u64(rng_state[0]);
            hasher.update_u64(rng_state[1]);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_episode() {
        let config = SimConfig::default();
        let state = EpisodeState::new(&config, 5, 1);

        assert_eq!(state.mode, EpisodeMode::Playing);
        assert_eq!(state.step_id, 0);
        assert_eq!(state.score, 0);
        assert_eq!(state.alive_count(), 5);
        assert_eq!(
            state.agents.keys().copied().collect::<Vec<_>>(),
            (0..5).map(AgentId).collect::<Vec<_>>()
        );
        assert!(state.obstacles.is_empty());
        assert!(state.nearest_gap().is_none());
    }

    #[test]
    fn test_spawn_heights_in_field() {
        let config = SimConfig::default();
        let state = EpisodeState::new(&config, 200, 4);

        for agent in state.agents.values() {
            assert!(!agent.off_screen(config.agent_height, config.ground_y()));
            assert_eq!(agent.velocity, 0);
        }
    }

    #[test]
    fn test_same_generation_same_state() {
        let config = SimConfig::default();
        let a = EpisodeState::new(&config, 10, 2);
        let b = EpisodeState::new(&config, 10, 2);
        assert_eq!(a.compute_hash(), b.compute_hash());

        let c = EpisodeState::new(&config, 10, 3);
        assert_ne!(a.compute_hash(), c.compute_hash());
    }

    #[test]
    fn test_agent_id_serde() {
        assert_eq!(serde_json::to_string(&AgentId(7)).unwrap(), "7");
        assert_eq!(serde_json::from_str::<AgentId>("7").unwrap(), AgentId(7));
        assert_eq!(serde_json::from_str::<AgentId>("\"12\"").unwrap(), AgentId(12));
        assert!(serde_json::from_str::<AgentId>("-1").is_err());
        assert!(serde_json::from_str::<AgentId>("\"x\"").is_err());

        let bytes = bincode::serialize(&AgentId(300)).unwrap();
        assert_eq!(bincode::deserialize::<AgentId>(&bytes).unwrap(), AgentId(300));
    }

    #[test]
    fn test_obstacle_lookup() {
        let config = SimConfig::default();
        let mut state = EpisodeState::new(&config, 1, 0);
        for i in 0..3 {
            let obstacle = ObstacleState::spawn(ObstacleId(i), &mut state.rng, &config);
            state.obstacles.push_back(obstacle);
            state.ahead.push_back(ObstacleId(i));
        }

        assert_eq!(state.obstacle(ObstacleId(1)).map(|o| o.id), Some(ObstacleId(1)));
        assert!(state.obstacle(ObstacleId(9)).is_none());

        let gap = state.nearest_gap().unwrap();
        let first = &state.obstacles[0];
        assert_eq!(gap, (first.gap_top, first.gap_bottom()));

        state.obstacle_mut(ObstacleId(2)).unwrap().scored = true;
        assert!(state.obstacles[2].scored);
        state.debug_check_invariants();
    }
}
