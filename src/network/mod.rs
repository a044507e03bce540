//! Network Layer
//!
//! HTTP surface over the turn engine.
//! No game rules live here; all decisions are made in `game/`.

pub mod protocol;
pub mod server;

pub use protocol::{ActionBody, ClaimBody, ErrorBody, StatusBody, SubmitBody, Submission};
pub use server::{router, ApiError, ConfigError, GameServer, GameServerError, ServerConfig};
