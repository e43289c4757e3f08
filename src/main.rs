//! Flappy Swarm Server
//!
//! Runs the authoritative simulation loop and serves it to WebSocket
//! controllers. Optionally drives the population with built-in heuristic
//! controllers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use flappy_swarm::{
    demo::run_heuristic_controller,
    network::GameServer,
    Config, SimulationEngine, VERSION,
};

/// Environment variable naming an optional JSON config file.
const CONFIG_ENV: &str = "FLAPPY_SWARM_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = load_config()?;

    info!("Flappy Swarm Server v{}", VERSION);
    info!(
        "Field {}x{}, gap {}, spawn every {} ticks, {} fps",
        config.sim.field_width,
        config.sim.field_height,
        config.sim.gap_height,
        config.sim.spawn_delay,
        config.engine.frame_rate
    );

    let population = config.sim.population;
    let engine = Arc::new(SimulationEngine::new(
        config.sim.clone(),
        config.engine.clone(),
        population,
    ));
    info!("Initial state hash: {}", hex::encode(engine.state_hash().await));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let engine_task = tokio::spawn({
        let engine = engine.clone();
        let shutdown = shutdown_tx.subscribe();
        async move { engine.run(shutdown).await }
    });

    let demo_task = config.demo_controllers.then(|| {
        tokio::spawn(run_heuristic_controller(
            engine.clone(),
            population,
            shutdown_tx.subscribe(),
        ))
    });

    let status_task = tokio::spawn({
        let engine = engine.clone();
        let mut shutdown = shutdown_tx.subscribe();
        async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let status = engine.status().await;
                        info!(
                            generation = status.generation,
                            step = status.step_id,
                            score = status.score,
                            alive = status.alive,
                            multiplier = status.multiplier,
                            "status"
                        );
                    }
                    _ = shutdown.recv() => break,
                }
            }
        }
    });

    let server = Arc::new(GameServer::new(config.server.clone(), engine.clone()));
    let server_task = tokio::spawn({
        let server = server.clone();
        async move { server.run().await }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("Interrupt received, shutting down");
        }
        result = wait_server(server_task) => {
            warn!("Controller gateway stopped: {:?}", result);
        }
    }

    server.shutdown();
    let _ = shutdown_tx.send(());

    engine_task.await.context("Engine loop panicked")?;
    status_task.await.context("Status task panicked")?;
    if let Some(demo) = demo_task {
        demo.await.context("Heuristic controller panicked")?;
    }

    info!("Final state hash: {}", hex::encode(engine.state_hash().await));
    Ok(())
}

/// Load the config named by [`CONFIG_ENV`], or defaults.
fn load_config() -> anyhow::Result<Config> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let config = Config::from_json_file(&path)
                .with_context(|| format!("Failed to load config from {}", path))?;
            info!("Loaded config from {}", path);
            Ok(config)
        }
        Err(_) => Ok(Config::default()),
    }
}

async fn wait_server(
    task: tokio::task::JoinHandle<Result<(), flappy_swarm::network::GameServerError>>,
) -> anyhow::Result<()> {
    task.await.context("Controller gateway panicked")??;
    Ok(())
}
