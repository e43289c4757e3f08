//! Authoritative Simulation Step
//!
//! The per-tick state transition. Must be 100% deterministic: the same
//! episode state, input and config always produce the same next state.
//! Input intake and snapshot publication wrap this in
//! [`crate::engine::SimulationEngine`].

use crate::config::SimConfig;
use crate::game::collision::prune_agents;
use crate::game::events::{EpisodeEvent, EpisodeEventData};
use crate::game::input::{EpisodeRecording, InputBatch};
use crate::game::state::{EpisodeMode, EpisodeState};

/// Result of a step.
#[derive(Debug, Default)]
pub struct StepResult {
    /// Events generated this step
    pub events: Vec<EpisodeEvent>,
    /// Whether the episode ended during this step
    pub episode_ended: bool,
    /// Jump impulses applied
    pub jumps_applied: usize,
}

/// Run one simulation step.
///
/// # Arguments
///
/// * `state` - The episode state (will be mutated)
/// * `input` - Batch drained for this tick, if any
/// * `config` - Simulation configuration
///
/// Once the episode is over only the step counter advances.
pub fn step(
    state: &mut EpisodeState,
    input: Option<&InputBatch>,
    config: &SimConfig,
) -> StepResult {
    let mut result = StepResult::default();

    // 0. Advance step counter
    state.step_id += 1;

    if state.mode == EpisodeMode::Over {
        return result;
    }

    // 1. Apply jumps, integrate agents
    result.jumps_applied = update_agents(state, input, config);

    // 2. Scroll the ground
    state.ground_offset = (state.ground_offset + config.scroll_speed).rem_euclid(config.tile_size);

    // 3. Retire, move and spawn obstacles
    update_obstacles(state, config);

    // 4. Score the oldest unscored obstacle
    update_score(state, config);

    // 5. Remove agents that left the field or hit a column
    process_collisions(state, config);

    // 6. Check end condition
    check_end_conditions(state, &mut result);

    state.debug_check_invariants();

    result.events = state.take_events();
    result
}

/// Apply queued jumps and integrate every live agent.
fn update_agents(state: &mut EpisodeState, input: Option<&InputBatch>, config: &SimConfig) -> usize {
    let physics = config.agent_physics();
    let mut jumps = 0;

    if let Some(batch) = input {
        for id in batch.jumpers() {
            // Unknown or removed ids are ignored.
            if let Some(agent) = state.agents.get_mut(&id) {
                agent.jump(&physics);
                jumps += 1;
            }
        }
    }

    for agent in state.agents.values_mut() {
        agent.advance(&physics);
    }

    jumps
}

/// Retire the head once off-field, scroll the rest, run the spawner.
fn update_obstacles(state: &mut EpisodeState, config: &SimConfig) {
    // Obstacles never overtake each other, so only the head can be off-field.
    if state.obstacles.front().is_some_and(|o| o.off_field()) {
        if let Some(retired) = state.obstacles.pop_front() {
            if state.ahead.front() == Some(&retired.id) {
                state.ahead.pop_front();
            }
        }
    }

    for obstacle in state.obstacles.iter_mut() {
        obstacle.advance(config.scroll_speed);
    }

    if let Some(obstacle) = state.spawner.tick(&mut state.rng, config) {
        let event = EpisodeEvent::obstacle_spawned(state.step_id, obstacle.id, obstacle.gap_top);
        state.ahead.push_back(obstacle.id);
        state.obstacles.push_back(obstacle);
        state.push_event(event);
    }
}

/// Score at most one obstacle per step: the head of the ahead list.
fn update_score(state: &mut EpisodeState, config: &SimConfig) {
    let Some(&head) = state.ahead.front() else {
        return;
    };

    let passed = match state.obstacle_mut(head) {
        Some(obstacle) => {
            let passed = obstacle.check_passed(config.score_line_x);
            if passed {
                obstacle.scored = true;
            }
            passed
        }
        None => false,
    };

    if passed {
        state.ahead.pop_front();
        state.score += 1;
        let event = EpisodeEvent::obstacle_scored(state.step_id, head, state.score);
        state.push_event(event);
    }
}

/// Prune agents and record eliminations.
fn process_collisions(state: &mut EpisodeState, config: &SimConfig) {
    let eliminated = prune_agents(state, config);
    for elimination in eliminated {
        let event = EpisodeEvent::agent_eliminated(state.step_id, elimination.agent_id, elimination.cause);
        state.push_event(event);
    }
}

/// End the episode once the live set is empty.
fn check_end_conditions(state: &mut EpisodeState, result: &mut StepResult) {
    if state.agents.is_empty() {
        state.mode = EpisodeMode::Over;
        result.episode_ended = true;
        let event = EpisodeEvent::episode_ended(state.step_id, state.score);
        state.push_event(event);
    }
}

/// Replay a recorded episode from its starting state.
///
/// Returns the state at the recording's final step and every event.
pub fn replay_episode(recording: &EpisodeRecording) -> (EpisodeState, Vec<EpisodeEvent>) {
    let mut state = EpisodeState::new(&recording.config, recording.population, recording.generation);
    let mut all_events = Vec::new();

    while state.step_id < recording.final_step {
        let input = recording.input_at(state.step_id);
        let result = step(&mut state, input, &recording.config);
        all_events.extend(result.events);
    }

    (state, all_events)
}

/// Whether an event list scores any obstacle twice.
pub fn has_duplicate_scores(events: &[EpisodeEvent]) -> bool {
    let mut seen = std::collections::BTreeSet::new();
    events.iter().any(|event| match &event.data {
        EpisodeEventData::ObstacleScored { obstacle_id, .. } => !seen.insert(*obstacle_id),
        _ => false,
    })
}
