use actix::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::GameError;
use crate::game::board::ReserveCounts;
use crate::models::seat::{BoardId, PieceKind, Seat, Team};

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    Resignation,
    Timeout,
    Agreement,
    KingCapture,
}

/// Who won, if anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "team")]
pub enum GameOutcome {
    Win(Team),
    Draw,
}

/// Terminal result of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub outcome: GameOutcome,
    pub reason: ResultReason,
}

/// Ordinary move or reserve drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Move,
    Drop,
}

/// The most recent applied move, with the clock picture at that instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub board: BoardId,
    pub seat: Seat,
    pub notation: String,
    pub kind: MoveKind,
    /// All 4 clocks, [`Seat::index`] order, at the moment the move applied.
    pub clocks_ms: [u64; 4],
    /// Wall-clock milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Full read-only picture of a match, safe to hand to any subscriber.
/// Clock values are computed at snapshot time, never stored stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub match_id: Uuid,
    /// BFEN position per board, [`BoardId::index`] order.
    pub boards: [String; 2],
    /// Reserve counts indexed by [team][drop board].
    pub reserves: [[ReserveCounts; 2]; 2],
    /// Milliseconds remaining per seat, [`Seat::index`] order.
    pub clocks_ms: [u64; 4],
    pub ticking: Vec<Seat>,
    pub last_move: Option<MoveRecord>,
    pub draw_offers: Vec<Seat>,
    pub result: Option<MatchResult>,
}

impl GameSnapshot {
    pub fn clock_ms(&self, seat: Seat) -> u64 {
        self.clocks_ms[seat.index()]
    }

    pub fn is_ticking(&self, seat: Seat) -> bool {
        self.ticking.contains(&seat)
    }

    pub fn board(&self, board: BoardId) -> &str {
        &self.boards[board.index()]
    }

    pub fn reserve(&self, team: Team, board: BoardId) -> &ReserveCounts {
        &self.reserves[team.index()][board.index()]
    }
}

/// Apply an ordinary move for `seat`, coordinate notation (`e2e4`, `e7e8q`).
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<GameSnapshot, GameError>")]
pub struct MakeMove {
    pub seat: Seat,
    pub notation: String,
}

/// Drop a reserve piece for `seat` on `square`.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<GameSnapshot, GameError>")]
pub struct DropPiece {
    pub seat: Seat,
    pub piece: PieceKind,
    pub square: String,
}

/// Concede the match for `seat`'s team.
#[derive(Debug, Clone, Copy, Message)]
#[rtype(result = "Result<GameSnapshot, GameError>")]
pub struct Resign {
    pub seat: Seat,
}

/// Record a draw offer; all 4 seats offering ends the match by agreement.
#[derive(Debug, Clone, Copy, Message)]
#[rtype(result = "Result<GameSnapshot, GameError>")]
pub struct OfferDraw {
    pub seat: Seat,
}

/// Read-only query for the current snapshot.
#[derive(Debug, Clone, Copy, Message)]
#[rtype(result = "Result<GameSnapshot, GameError>")]
pub struct GetState;

/// Read-only query for just the two BFEN position strings.
#[derive(Debug, Clone, Copy, Message)]
#[rtype(result = "Result<[String; 2], GameError>")]
pub struct GetBfen;

/// Read-only probe: may `seat` pick up the piece on `square` right now?
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<bool, GameError>")]
pub struct CanSelectPiece {
    pub seat: Seat,
    pub square: String,
}

/// Read-only query for the legal destination squares from `square`.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<Vec<String>, GameError>")]
pub struct GetMoves {
    pub seat: Seat,
    pub square: String,
}

/// Register a notification subscriber. Late joiners receive no history;
/// they query [`GetState`] for a fresh snapshot.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub recipient: Recipient<SessionNotification>,
}

/// Broadcast to subscribers in the order mutations were applied.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub enum SessionNotification {
    StateUpdated(GameSnapshot),
    GameOver(GameSnapshot),
}

impl SessionNotification {
    pub fn snapshot(&self) -> &GameSnapshot {
        match self {
            SessionNotification::StateUpdated(s) | SessionNotification::GameOver(s) => s,
        }
    }
}
