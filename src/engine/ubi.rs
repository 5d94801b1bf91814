//! UBI, the line-based text protocol spoken to a bughouse engine subprocess.
//! Outbound commands render to single newline-terminated lines; inbound bytes
//! are reassembled into lines by [`LineBuffer`] and parsed into [`UbiEvent`]s.

use std::fmt;

use thiserror::Error;

use crate::errors::TeamMessageError;
use crate::models::seat::{BoardId, PieceKind, Seat};
use crate::team::TeamSignal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UbiParseError {
    #[error("unrecognized line: {0}")]
    Unrecognized(String),

    #[error("malformed bestmove: {0}")]
    MalformedBestMove(String),

    #[error(transparent)]
    TeamMessage(#[from] TeamMessageError),
}

/// Command sent to the engine subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UbiCommand {
    Ubi,
    NewGame,
    IsReady,
    Position { board: BoardId, bfen: String },
    Clock { seat: Seat, ms: u64 },
    Go { board: BoardId },
    PartnerMsg(TeamSignal),
    Quit,
}

impl fmt::Display for UbiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UbiCommand::Ubi => f.write_str("ubi"),
            UbiCommand::NewGame => f.write_str("ubinewgame"),
            UbiCommand::IsReady => f.write_str("isready"),
            UbiCommand::Position { board, bfen } => {
                write!(f, "position board {} bfen {}", board.label(), bfen)
            }
            UbiCommand::Clock { seat, ms } => write!(f, "clock {} {}", seat.token(), ms),
            UbiCommand::Go { board } => write!(f, "go board {}", board.label()),
            UbiCommand::PartnerMsg(signal) => f.write_str(&signal.to_partnermsg()),
            UbiCommand::Quit => f.write_str("quit"),
        }
    }
}

/// A move as the engine states it: a reserve drop or coordinate notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMove {
    Drop { piece: PieceKind, square: String },
    Move { notation: String },
}

fn valid_square(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 2 && (b'a'..=b'h').contains(&bytes[0]) && (b'1'..=b'8').contains(&bytes[1])
}

impl EngineMove {
    pub fn parse(token: &str) -> Result<EngineMove, UbiParseError> {
        let token = token.trim().to_lowercase();
        // The grammar is pure ASCII; checking up front keeps the byte
        // slicing below on char boundaries.
        if !token.is_ascii() {
            return Err(UbiParseError::MalformedBestMove(token));
        }
        if let Some((piece, square)) = token.split_once('@') {
            let piece = match piece.as_bytes() {
                [c] => PieceKind::from_letter(*c as char),
                _ => None,
            }
            .ok_or_else(|| UbiParseError::MalformedBestMove(token.clone()))?;
            if !valid_square(square) {
                return Err(UbiParseError::MalformedBestMove(token));
            }
            Ok(EngineMove::Drop {
                piece,
                square: square.to_string(),
            })
        } else {
            if !(4..=5).contains(&token.len())
                || !valid_square(&token[0..2])
                || !valid_square(&token[2..4])
            {
                return Err(UbiParseError::MalformedBestMove(token));
            }
            Ok(EngineMove::Move { notation: token })
        }
    }
}

/// Line received from the engine subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UbiEvent {
    UbiOk,
    ReadyOk,
    Id(String),
    Info(String),
    BestMove { board: BoardId, mv: EngineMove },
    TeamMsg(TeamSignal),
}

/// Parse one complete inbound line. Callers log and skip errors; one bad line
/// must never wedge the bridge.
pub fn parse_line(line: &str) -> Result<UbiEvent, UbiParseError> {
    let trimmed = line.trim();
    let mut tokens = trimmed.split_whitespace();
    match tokens.next() {
        Some("ubiok") => Ok(UbiEvent::UbiOk),
        Some("readyok") => Ok(UbiEvent::ReadyOk),
        Some("id") => Ok(UbiEvent::Id(trimmed["id".len()..].trim().to_string())),
        Some("info") => Ok(UbiEvent::Info(trimmed["info".len()..].trim().to_string())),
        Some("teammsg") => Ok(UbiEvent::TeamMsg(TeamSignal::parse_teammsg(trimmed)?)),
        Some("bestmove") => {
            let malformed = || UbiParseError::MalformedBestMove(trimmed.to_string());
            if tokens.next() != Some("board") {
                return Err(malformed());
            }
            let board = tokens
                .next()
                .and_then(BoardId::from_label)
                .ok_or_else(malformed)?;
            let mv = EngineMove::parse(tokens.next().ok_or_else(malformed)?)?;
            if tokens.next().is_some() {
                return Err(malformed());
            }
            Ok(UbiEvent::BestMove { board, mv })
        }
        _ => Err(UbiParseError::Unrecognized(trimmed.to_string())),
    }
}

/// Reassembles newline-terminated UTF-8 lines from arbitrarily split byte
/// deliveries. A trailing partial line is held until its newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> LineBuffer {
        LineBuffer::default()
    }

    /// Feed a chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&raw[..pos]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }
}
