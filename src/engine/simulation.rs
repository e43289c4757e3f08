//! Simulation Engine
//!
//! Owns the episode state behind a single mutation lock and wraps the pure
//! [`crate::game::tick::step`] with input intake, game-over cancellation and
//! snapshot publication. One task should drive [`SimulationEngine::step`]
//! (usually through [`SimulationEngine::run`]); any number of controllers
//! talk to it through the [`SyncBridge`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::{EngineConfig, SimConfig};
use crate::core::hash::StateHash;
use crate::engine::bridge::{EpisodeChannels, PendingInput, SyncBridge};
use crate::engine::throttle::{AdaptiveThrottle, TpsMeter};
use crate::game::events::EpisodeEventData;
use crate::game::input::{EpisodeRecording, InputBatch};
use crate::game::snapshot::Snapshot;
use crate::game::state::EpisodeState;
use crate::game::tick;

/// State guarded by the mutation lock.
struct EngineInner {
    state: EpisodeState,
    input_rx: mpsc::Receiver<PendingInput>,
    throttle: AdaptiveThrottle,
    /// Shared so readers can copy it without holding the lock.
    recording: Option<Arc<EpisodeRecording>>,
}

/// What one step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Generation the step ran in.
    pub generation: u64,
    /// Step counter after the step.
    pub step_id: u64,
    /// Whether a batch was drained.
    pub consumed_input: bool,
    /// Whether a snapshot was published.
    pub published: bool,
    /// Whether the episode ended this step.
    pub episode_ended: bool,
}

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Steps run.
    pub steps: u32,
    /// Whether any step had demand.
    pub demanded: bool,
    /// Multiplier for the next frame.
    pub next_multiplier: u32,
}

/// Point-in-time summary for logs and status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    /// Current generation.
    pub generation: u64,
    /// Current step counter.
    pub step_id: u64,
    /// Current score.
    pub score: u32,
    /// Live agents.
    pub alive: usize,
    /// Whether the episode has ended.
    pub over: bool,
    /// Current ticks-per-frame multiplier.
    pub multiplier: u32,
}

/// The authoritative simulation.
pub struct SimulationEngine {
    sim: SimConfig,
    engine: EngineConfig,
    inner: Mutex<EngineInner>,
    bridge: SyncBridge,
}

impl SimulationEngine {
    /// Create an engine with a generation-0 episode of `population` agents.
    pub fn new(sim: SimConfig, engine: EngineConfig, population: u32) -> Self {
        let state = EpisodeState::new(&sim, population, 0);
        let (channels, input_rx) = EpisodeChannels::new(Snapshot::capture(&state, &sim));
        let recording = engine
            .record_inputs
            .then(|| Arc::new(EpisodeRecording::new(sim.clone(), population, 0)));

        info!(population, seed = state.seed, "simulation engine created");

        Self {
            inner: Mutex::new(EngineInner {
                state,
                input_rx,
                throttle: AdaptiveThrottle::new(&engine.throttle),
                recording,
            }),
            bridge: SyncBridge::new(channels),
            sim,
            engine,
        }
    }

    /// Handle for controllers.
    pub fn bridge(&self) -> SyncBridge {
        self.bridge.clone()
    }

    /// Simulation config.
    pub fn sim_config(&self) -> &SimConfig {
        &self.sim
    }

    /// Run one authoritative step.
    ///
    /// The lock covers intake, the transition and snapshot capture. The
    /// bounded wait for waiters to claim the snapshot happens after it is
    /// released.
    pub async fn step(&self) -> StepReport {
        let claim_timeout = Duration::from_millis(self.engine.claim_timeout_ms);

        let (report, snapshot, channels) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            // Restart swaps channels under this lock, so these match the state.
            let channels = self.bridge.channels();
            let was_over = inner.state.is_over();

            // 1. Input intake
            let input = if was_over {
                None
            } else {
                take_input(inner, self.engine.max_recorded_inputs)
            };

            // 2-7. Authoritative transition
            let result = tick::step(&mut inner.state, input.as_ref(), &self.sim);

            for event in &result.events {
                match &event.data {
                    EpisodeEventData::AgentEliminated { agent_id, cause } => {
                        debug!(step_id = event.step_id, %agent_id, ?cause, "agent eliminated");
                    }
                    EpisodeEventData::ObstacleScored { obstacle_id, new_score } => {
                        debug!(step_id = event.step_id, obstacle = obstacle_id.0, score = new_score, "obstacle scored");
                    }
                    _ => {}
                }
            }

            if result.episode_ended {
                channels.cancel();
                info!(
                    generation = inner.state.generation,
                    step_id = inner.state.step_id,
                    score = inner.state.score,
                    "episode over"
                );
            }

            // 8. Publication, only when somebody asked for it
            let snapshot = if inner.state.is_over() || !channels.take_demand() {
                None
            } else {
                Some(Snapshot::capture(&inner.state, &self.sim))
            };

            let report = StepReport {
                generation: inner.state.generation,
                step_id: inner.state.step_id,
                consumed_input: input.is_some(),
                published: snapshot.is_some(),
                episode_ended: result.episode_ended,
            };
            (report, snapshot, channels)
        };

        if let Some(snapshot) = snapshot {
            channels.publish(snapshot, claim_timeout).await;
        }

        report
    }

    /// Start a new episode with fresh ids `0..population`.
    ///
    /// Runs under the mutation lock, so it never interleaves with a step.
    /// Callers blocked on the previous episode are released with
    /// [`crate::engine::EpisodeOver`].
    #[instrument(skip(self))]
    pub async fn restart(&self, population: u32) -> u64 {
        let mut inner = self.inner.lock().await;
        let generation = inner.state.generation + 1;

        let state = EpisodeState::new(&self.sim, population, generation);
        let (channels, input_rx) = EpisodeChannels::new(Snapshot::capture(&state, &self.sim));

        if let Some(previous) = inner.recording.take() {
            debug!(
                generation = previous.generation,
                inputs = previous.inputs.len(),
                "discarding previous recording"
            );
        }
        inner.recording = self
            .engine
            .record_inputs
            .then(|| Arc::new(EpisodeRecording::new(self.sim.clone(), population, generation)));

        let seed = state.seed;
        inner.state = state;
        inner.input_rx = input_rx;
        self.bridge.replace(channels);

        info!(generation, population, seed, "episode restarted");
        generation
    }

    /// Run one external frame: `multiplier` steps, then feed the throttle.
    pub async fn run_frame(&self, measured_tps: Option<f64>) -> FrameReport {
        let steps = self.inner.lock().await.throttle.multiplier();

        let mut demanded = false;
        for _ in 0..steps {
            demanded |= self.step().await.published;
        }

        let mut inner = self.inner.lock().await;
        let next_multiplier = inner.throttle.end_frame(demanded, measured_tps);
        inner.state.tick_multiplier = next_multiplier;

        FrameReport {
            steps,
            demanded,
            next_multiplier,
        }
    }

    /// Drive frames at the configured frame rate until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let frame = Duration::from_secs_f64(1.0 / f64::from(self.engine.frame_rate.max(1)));
        let mut frame_interval = interval(frame);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut meter = TpsMeter::default();
        let mut last_multiplier = 0;

        info!(frame_rate = self.engine.frame_rate, "engine loop started");

        loop {
            tokio::select! {
                _ = frame_interval.tick() => {
                    let tps = meter.record_frame(Instant::now());
                    let report = self.run_frame(tps).await;
                    if report.next_multiplier != last_multiplier {
                        debug!(multiplier = report.next_multiplier, ?tps, "throttle changed");
                        last_multiplier = report.next_multiplier;
                    }
                }
                _ = shutdown.recv() => {
                    info!("engine loop shutting down");
                    break;
                }
            }
        }
    }

    /// Recording of the current episode, closed at the current step unless
    /// it already filled up.
    pub async fn recording(&self) -> Option<EpisodeRecording> {
        let (shared, end) = {
            let inner = self.inner.lock().await;
            let shared = inner.recording.clone()?;
            let end = (!shared.is_closed()).then(|| (inner.state.step_id, inner.state.compute_hash()));
            (shared, end)
        };

        let mut recording = (*shared).clone();
        if let Some((final_step, final_hash)) = end {
            recording.close(final_step, final_hash);
        }
        Some(recording)
    }

    /// Hash of the current state.
    pub async fn state_hash(&self) -> StateHash {
        self.inner.lock().await.state.compute_hash()
    }

    /// Snapshot of the live state, bypassing the bridge.
    pub async fn peek(&self) -> Snapshot {
        let inner = self.inner.lock().await;
        Snapshot::capture(&inner.state, &self.sim)
    }

    /// Summary of the current episode.
    pub async fn status(&self) -> EngineStatus {
        let inner = self.inner.lock().await;
        EngineStatus {
            generation: inner.state.generation,
            step_id: inner.state.step_id,
            score: inner.state.score,
            alive: inner.state.alive_count(),
            over: inner.state.is_over(),
            multiplier: inner.throttle.multiplier(),
        }
    }
}

/// Drain at most one pending batch, acknowledge it and record it.
fn take_input(inner: &mut EngineInner, max_recorded: usize) -> Option<InputBatch> {
    let pending = inner.input_rx.try_recv().ok()?;
    if let Some(recording) = inner.recording.as_mut() {
        record_input(recording, &inner.state, &pending.batch, max_recorded);
    }
    // The submitter may have given up; the batch still applies.
    let _ = pending.ack.send(());
    Some(pending.batch)
}

/// Append a batch drained before stepping `state`. A full recording is
/// closed at `state`, which is still the pre-step state, so it keeps
/// replaying exactly up to that point.
fn record_input(
    recording: &mut Arc<EpisodeRecording>,
    state: &EpisodeState,
    batch: &InputBatch,
    max_recorded: usize,
) {
    if recording.is_closed() {
        return;
    }
    let recording = Arc::make_mut(recording);
    if recording.inputs.len() >= max_recorded {
        recording.finish(state);
        warn!(
            generation = state.generation,
            step_id = state.step_id,
            max_recorded,
            "input recording full, closing it"
        );
        return;
    }
    recording.record(state.step_id, batch);
}
