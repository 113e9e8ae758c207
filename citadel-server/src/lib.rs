//! # Citadel Game Server
//!
//! Session and turn-state coordinator for a Citadels-style role-draft card
//! game played over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CITADEL SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Xorshift128+ PRNG and seed derivation     │
//! │                                                              │
//! │  game/           - Round state machines (pure)               │
//! │  ├── state.rs    - Game, players, rules                      │
//! │  ├── draft.rs    - Role draft                                │
//! │  ├── action.rs   - Coins, cards, building                    │
//! │  ├── catalog.rs  - District deck                             │
//! │  └── events.rs   - Outcomes of accepted moves                │
//! │                                                              │
//! │  session/        - Lobbies (pure)                            │
//! │  ├── directory.rs- Create, join, leave, kick                 │
//! │  └── lobby.rs    - Readiness, seat map, game start           │
//! │                                                              │
//! │  network/        - Connections (async)                       │
//! │  ├── registry.rs - Identity ↔ connection                     │
//! │  ├── grace.rs    - Disconnect grace windows                  │
//! │  ├── coordinator.rs - Event → effects transition             │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! `game/` and `session/` never see a socket or a clock. The coordinator
//! takes the current instant as an argument and returns the messages to
//! send, so the whole state machine can be driven from tests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod session;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::{Game, GamePhase, GameRules, Username};
pub use network::{Coordinator, GameServer, ServerConfig};
pub use session::{Session, SessionDirectory, SessionError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listening port
pub const DEFAULT_PORT: u16 = 3001;

/// Capacity of a session created without an explicit maximum
pub const DEFAULT_MAX_PLAYERS: usize = 8;

/// Seconds a disconnected seated player keeps their seat
pub const DEFAULT_GRACE_SECS: u64 = 30;
