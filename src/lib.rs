//! Core of a live bughouse chess service: one authoritative actor per match
//! owning clocks, boards and reserves, an engine-subprocess bridge speaking
//! the UBI line protocol, and a team-scoped tactical-messaging channel.
//!
//! Transport (HTTP/WebSocket), persistence, accounts and matchmaking are
//! collaborators outside this crate; everything here is an in-process
//! call/notify contract built on actix actors.

pub mod engine;
pub mod errors;
pub mod game;
pub mod models;
pub mod team;

pub use engine::{BridgeConfig, EngineBridge};
pub use errors::{GameError, RegistryError, TeamMessageError};
pub use game::board::{BoardLedger, ReserveCounts, START_POSITION};
pub use game::clock::ClockSet;
pub use game::oracle::{AppliedMove, ChessOracle, LegalityOracle};
pub use game::session::{GameSessionActor, SessionConfig};
pub use models::app_state::AppState;
pub use models::messages::*;
pub use models::seat::{BoardId, PieceKind, Seat, Team};
pub use team::{TeamChannels, TeamMessage, TeamSignal};
