use thiserror::Error;

use crate::models::seat::PieceKind;

/// Errors returned synchronously by the game session actor.
///
/// Every rejected request carries the precise reason so a UI can explain
/// why a move was refused instead of showing a generic failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// The acting seat is not the side to move on its board.
    #[error("not your turn")]
    NotYourTurn,

    /// The match already has a result; moves and drops are refused.
    #[error("game is over")]
    GameOver,

    /// Resignation or draw offer after the match already ended.
    #[error("game is already over")]
    GameAlreadyOver,

    /// The acting team's reserve for that board has no such piece.
    #[error("no {0} in reserve")]
    NoPieceInReserve(PieceKind),

    /// The stored position string could not be read back by the oracle.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The legality oracle rejected a move; reason passed through unmodified.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The legality oracle rejected a drop; reason passed through unmodified.
    #[error("illegal drop: {0}")]
    IllegalDrop(String),
}

/// Errors from parsing the teammate signal vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeamMessageError {
    /// The line does not carry the `teammsg ` prefix at all.
    #[error("not a team message")]
    NotATeamMessage,

    /// The line is a team message but violates the closed grammar.
    #[error("invalid team message: {0}")]
    InvalidTeamMessage(String),
}

/// Errors from the match registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// All configured engine-bridge slots are in use.
    #[error("engine bridge capacity exhausted")]
    EngineCapacityExhausted,

    /// No running match under that id.
    #[error("match not found: {0}")]
    MatchNotFound(String),
}
