//! WebSocket Controller Gateway
//!
//! Async WebSocket server that lets remote controllers drive the simulation.
//! Each connection gets its own [`Controller`] so snapshot novelty is tracked
//! per connection; all connections share the engine's bridge.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde::{Serialize, Deserialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::engine::{Controller, EpisodeOver, SimulationEngine};
use crate::network::protocol::{server_time_ms, ClientMessage, ErrorCode, ServerMessage};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest population a client may restart with.
    pub max_population: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 64,
            max_population: 10_000,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// How long a closing connection may spend flushing replies.
const FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

fn shutdown_message() -> ServerMessage {
    ServerMessage::Shutdown {
        reason: "Server shutting down".to_string(),
    }
}

/// Per-connection identifier for log correlation.
pub type ConnectionId = Uuid;

/// Connected controller bookkeeping.
struct ConnectedClient {
    addr: SocketAddr,
    connected_at: Instant,
    messages: u64,
}

type ClientMap = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The controller gateway.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Simulation being served.
    engine: Arc<SimulationEngine>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server for `engine`.
    pub fn new(config: ServerConfig, engine: Arc<SimulationEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            engine,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Controller gateway listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let id = Uuid::new_v4();
            info!(connection = %id, "New controller connection from {}", addr);

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            clients.write().await.insert(id, ConnectedClient {
                addr,
                connected_at: Instant::now(),
                messages: 0,
            });

            // Spawn message sender task
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut controller = engine.bridge().controller();

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let parsed = match msg {
                            Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text),
                            Some(Ok(Message::Binary(data))) => ClientMessage::from_slice(&data),
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(connection = %id, "Client disconnected");
                                break;
                            }
                            Some(Err(e)) => {
                                error!(connection = %id, "WebSocket error: {}", e);
                                break;
                            }
                            _ => continue,
                        };

                        let client_msg = match parsed {
                            Ok(m) => m,
                            Err(e) => {
                                debug!(connection = %id, "Invalid message: {}", e);
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Invalid message format",
                                )).await;
                                continue;
                            }
                        };

                        if let Some(client) = clients.write().await.get_mut(&id) {
                            client.messages += 1;
                        }

                        // Waits on the bridge can outlive the engine loop.
                        let reply = tokio::select! {
                            reply = Self::handle_client_message(
                                client_msg,
                                &mut controller,
                                &engine,
                                &config,
                            ) => reply,
                            _ = shutdown_rx.recv() => {
                                let _ = msg_tx.send(shutdown_message()).await;
                                break;
                            }
                        };
                        if msg_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(shutdown_message()).await;
                        break;
                    }
                }
            }

            // Let queued replies flush, then stop the writer.
            drop(msg_tx);
            if tokio::time::timeout(FLUSH_TIMEOUT, &mut sender_task).await.is_err() {
                debug!(connection = %id, "Sender task did not flush in time");
                sender_task.abort();
            }

            if let Some(client) = clients.write().await.remove(&id) {
                info!(
                    connection = %id,
                    addr = %client.addr,
                    messages = client.messages,
                    connected_secs = client.connected_at.elapsed().as_secs(),
                    "Controller cleaned up"
                );
            }
        });
    }

    /// Handle one client message and produce the reply.
    async fn handle_client_message(
        msg: ClientMessage,
        controller: &mut Controller,
        engine: &SimulationEngine,
        config: &ServerConfig,
    ) -> ServerMessage {
        let episode_over = |_: EpisodeOver| ServerMessage::EpisodeOver {
            generation: engine.bridge().generation(),
        };

        match msg {
            ClientMessage::AwaitState => match controller.await_next_state().await {
                Ok(snapshot) => ServerMessage::State((*snapshot).clone()),
                Err(over) => episode_over(over),
            },
            ClientMessage::CurrentState => match controller.current_state() {
                Ok(snapshot) => ServerMessage::State((*snapshot).clone()),
                Err(over) => episode_over(over),
            },
            ClientMessage::SubmitInput { actions } => match controller.submit_input(actions).await {
                Ok(()) => ServerMessage::InputAck,
                Err(over) => episode_over(over),
            },
            ClientMessage::Restart { population } => {
                let population = population.unwrap_or(engine.sim_config().population);
                if population == 0 || population > config.max_population {
                    return ServerMessage::error(
                        ErrorCode::InvalidInput,
                        format!("population must be in 1..={}", config.max_population),
                    );
                }
                let generation = engine.restart(population).await;
                ServerMessage::Restarted { generation, population }
            }
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: server_time_ms(),
            },
        }
    }

    /// Signal shutdown to the accept loop and every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of connected controllers.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
