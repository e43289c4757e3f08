//! Protocol Messages
//!
//! Wire format for controller-server communication over WebSocket.
//! Messages are JSON objects tagged by a `type` field. Binary frames carry
//! the same JSON as UTF-8 bytes.

use serde::{Serialize, Deserialize};

use crate::game::input::InputBatch;
use crate::game::snapshot::Snapshot;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from a controller to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Wait for a snapshot this connection has not seen yet.
    AwaitState,

    /// Latest snapshot, without waiting.
    CurrentState,

    /// Jump decisions for the next tick, keyed by agent id.
    SubmitInput { actions: InputBatch },

    /// Start a new episode. Omitted population uses the configured one.
    Restart {
        #[serde(default)]
        population: Option<u32>,
    },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from the server to a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A published snapshot.
    State(Snapshot),

    /// The submitted batch was drained by the engine.
    InputAck,

    /// The episode has ended; send `restart` to continue. Carries the
    /// generation current when the error was raised.
    EpisodeOver { generation: u64 },

    /// A new episode started.
    Restarted { generation: u64, population: u32 },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// Message parsed but a value is out of range.
    InvalidInput,
    /// Connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from a binary frame holding UTF-8 JSON.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}

/// Milliseconds since the Unix epoch, for pongs.
pub fn server_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::game::state::{AgentId, EpisodeState};

    #[test]
    fn test_client_message_wire_shape() {
        let msg = ClientMessage::from_json(r#"{"type":"await_state"}"#).unwrap();
        assert_eq!(msg, ClientMessage::AwaitState);

        let msg = ClientMessage::from_json(r#"{"type":"restart"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Restart { population: None });

        let msg = ClientMessage::from_json(r#"{"type":"restart","population":50}"#).unwrap();
        assert_eq!(msg, ClientMessage::Restart { population: Some(50) });

        let json = ClientMessage::Ping { timestamp: 42 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"ping","timestamp":42}"#);
    }

    #[test]
    fn test_submit_input_parses_string_keys() {
        let msg = ClientMessage::from_json(
            r#"{"type":"submit_input","actions":{"0":true,"3":false,"12":true}}"#,
        )
        .unwrap();

        let ClientMessage::SubmitInput { actions } = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(actions.len(), 3);
        assert_eq!(actions.jumpers().collect::<Vec<_>>(), vec![AgentId(0), AgentId(12)]);
    }

    #[test]
    fn test_submit_input_roundtrip() {
        let mut actions = InputBatch::new();
        actions.set(AgentId(5), true);
        let msg = ClientMessage::SubmitInput { actions };

        let json = msg.to_json().unwrap();
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
        assert_eq!(ClientMessage::from_slice(json.as_bytes()).unwrap(), msg);
    }

    #[test]
    fn test_state_message_roundtrip() {
        let config = SimConfig::default();
        let state = EpisodeState::new(&config, 3, 2);
        let msg = ServerMessage::State(Snapshot::capture(&state, &config));

        let json = msg.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"state""#));

        let parsed = ServerMessage::from_json(&json).unwrap();
        let ServerMessage::State(snapshot) = parsed else {
            panic!("Wrong message type");
        };
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.alive_count(), 3);
        assert!(snapshot.sensors(AgentId(2)).is_some());
    }

    #[test]
    fn test_unit_and_error_messages() {
        assert_eq!(ServerMessage::InputAck.to_json().unwrap(), r#"{"type":"input_ack"}"#);

        let msg = ServerMessage::error(ErrorCode::InvalidInput, "population must be positive");
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""code":"invalid_input""#));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"matchmaking"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }
}
