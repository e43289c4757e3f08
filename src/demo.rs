//! In-process Heuristic Controllers
//!
//! A stand-in for an external decision maker: reads sensor vectors from the
//! bridge, jumps every agent that sits below the centre of the next gap, and
//! restarts the episode when it ends.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::engine::{EpisodeOver, SimulationEngine};
use crate::game::input::InputBatch;
use crate::game::snapshot::Snapshot;

/// Jump rule over the normalised sensor vector.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicPilot {
    /// Agent height over field height.
    agent_height_fraction: f64,
}

impl HeuristicPilot {
    /// Pilot for agents of the configured size.
    pub fn new(config: &SimConfig) -> Self {
        Self {
            agent_height_fraction: f64::from(config.agent_height) / f64::from(config.field_height),
        }
    }

    /// Decide from `[position, velocity, gap_top, gap_bottom]`.
    pub fn decide(&self, sensors: [f64; 4]) -> bool {
        let [position, velocity, gap_top, gap_bottom] = sensors;
        let agent_centre = position + self.agent_height_fraction / 2.0;
        let gap_centre = (gap_top + gap_bottom) / 2.0;
        agent_centre > gap_centre && velocity >= 0.0
    }

    /// Decisions for every live agent in a snapshot.
    pub fn batch(&self, snapshot: &Snapshot) -> InputBatch {
        snapshot
            .agents
            .keys()
            .filter_map(|id| snapshot.sensors(*id).map(|s| (*id, self.decide(s))))
            .collect()
    }
}

/// Drive `engine` with a [`HeuristicPilot`] until shutdown, restarting with
/// `population` agents whenever an episode ends.
pub async fn run_heuristic_controller(
    engine: Arc<SimulationEngine>,
    population: u32,
    mut shutdown: broadcast::Receiver<()>,
) {
    let pilot = HeuristicPilot::new(engine.sim_config());
    let bridge = engine.bridge();
    let mut controller = bridge.controller();
    let mut best_score = 0;

    info!(population, "heuristic controller started");

    loop {
        let round = async {
            let snapshot = controller.await_next_state().await?;
            controller.submit_input(pilot.batch(&snapshot)).await?;
            Ok::<_, EpisodeOver>(())
        };

        tokio::select! {
            result = round => {
                if result.is_err() {
                    let status = engine.status().await;
                    // Someone else may already have restarted.
                    if status.over {
                        best_score = best_score.max(status.score);
                        info!(
                            generation = status.generation,
                            score = status.score,
                            best_score,
                            steps = status.step_id,
                            "episode finished, restarting"
                        );
                        engine.restart(population).await;
                    }
                }
            }
            _ = shutdown.recv() => {
                debug!("heuristic controller stopping");
                break;
            }
        }
    }
}
