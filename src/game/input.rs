//! Input Batches and Recording
//!
//! Controllers submit one batch per tick mapping agent ids to a jump
//! decision. The engine can record every consumed batch so an episode can
//! be replayed bit-for-bit.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::config::SimConfig;
use crate::core::hash::StateHash;
use crate::game::state::{AgentId, EpisodeState};

/// Jump decisions for one tick.
///
/// Absent agents coast. Ids of agents that are no longer alive are ignored
/// by the step, since controllers legitimately keep sending them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputBatch(pub BTreeMap<AgentId, bool>);

impl InputBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one agent's decision.
    pub fn set(&mut self, id: AgentId, jump: bool) {
        self.0.insert(id, jump);
    }

    /// Agents asked to jump, in id order.
    pub fn jumpers(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.0.iter().filter(|(_, jump)| **jump).map(|(id, _)| *id)
    }

    /// Number of decisions in the batch.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the batch holds no decisions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(AgentId, bool)> for InputBatch {
    fn from_iter<I: IntoIterator<Item = (AgentId, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A batch consumed by the step that started at `step_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedInput {
    /// Step counter value when the batch was drained.
    pub step_id: u64,
    /// The batch.
    pub batch: InputBatch,
}

/// Recording errors.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    /// Binary encoding failed.
    #[error("Recording encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Everything needed to replay one episode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpisodeRecording {
    /// Generation the episode ran as.
    pub generation: u64,
    /// Starting population.
    pub population: u32,
    /// Simulation config in effect.
    pub config: SimConfig,
    /// Consumed batches, ascending by step id.
    pub inputs: Vec<RecordedInput>,
    /// Step counter at the end of the recording.
    pub final_step: u64,
    /// State hash at `final_step`, once finished.
    pub final_hash: Option<StateHash>,
}

impl EpisodeRecording {
    /// Start recording an episode.
    pub fn new(config: SimConfig, population: u32, generation: u64) -> Self {
        Self {
            generation,
            population,
            config,
            inputs: Vec::new(),
            final_step: 0,
            final_hash: None,
        }
    }

    /// Record a batch drained at `step_id`.
    pub fn record(&mut self, step_id: u64, batch: &InputBatch) {
        debug_assert!(
            self.inputs.last().map_or(true, |last| last.step_id < step_id),
            "recorded inputs out of step order"
        );
        self.inputs.push(RecordedInput {
            step_id,
            batch: batch.clone(),
        });
    }

    /// Close the recording at the given state.
    pub fn finish(&mut self, state: &EpisodeState) {
        self.close(state.step_id, state.compute_hash());
    }

    /// Close the recording at a known step and hash.
    pub fn close(&mut self, final_step: u64, final_hash: StateHash) {
        self.final_step = final_step;
        self.final_hash = Some(final_hash);
    }

    /// Whether the recording has been closed.
    pub fn is_closed(&self) -> bool {
        self.final_hash.is_some()
    }

    /// Batch drained at `step_id`, if any.
    pub fn input_at(&self, step_id: u64) -> Option<&InputBatch> {
        self.inputs
            .binary_search_by_key(&step_id, |r| r.step_id)
            .ok()
            .map(|idx| &self.inputs[idx].batch)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordingError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RecordingError> {
        Ok(bincode::deserialize(data)?)
    }
}
