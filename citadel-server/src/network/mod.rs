//! Network Layer
//!
//! WebSocket server for real-time lobby and game communication.
//! Connection state lives here; all session and game rules run through
//! `session/` and `game/`.

pub mod coordinator;
pub mod grace;
pub mod protocol;
pub mod registry;
pub mod server;

pub use coordinator::{Audience, Coordinator, CoordinatorConfig, Effects, Outbound};
pub use grace::GraceScheduler;
pub use protocol::{ClientMessage, ErrorCode, PlayerView, ServerError, ServerMessage, SessionView};
pub use registry::{ConnectionId, ConnectionRegistry, Presence};
pub use server::{GameServer, GameServerError, ServerConfig};
