//! Network Layer
//!
//! WebSocket gateway for remote controllers.
//! This layer is **non-deterministic** - all simulation logic runs through `game/`.

pub mod protocol;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode};
pub use server::{GameServer, ServerConfig, GameServerError, ConnectionId};
