use std::fmt;

use chess::{Color, Piece};
use serde::{Deserialize, Serialize};

/// One of the two boards of a bughouse match. Board A is board 1, board B is
/// board 2; the UBI protocol labels them `A`/`B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardId {
    A,
    B,
}

impl BoardId {
    pub const ALL: [BoardId; 2] = [BoardId::A, BoardId::B];

    /// The board that feeds this board's reserves and vice versa.
    pub fn other(self) -> BoardId {
        match self {
            BoardId::A => BoardId::B,
            BoardId::B => BoardId::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            BoardId::A => 0,
            BoardId::B => 1,
        }
    }

    /// Wire label used in UBI `position`/`go`/`bestmove` lines.
    pub fn label(self) -> &'static str {
        match self {
            BoardId::A => "A",
            BoardId::B => "B",
        }
    }

    pub fn from_label(token: &str) -> Option<BoardId> {
        match token {
            "A" | "a" => Some(BoardId::A),
            "B" | "b" => Some(BoardId::B),
            _ => None,
        }
    }
}

/// One of the two cross-board teams. Team A holds board A's white and board
/// B's black; team B the mirror. Membership is derived from the seat, never
/// stored anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    A,
    B,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::A, Team::B];

    pub fn other(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Team::A => 0,
            Team::B => 1,
        }
    }

    pub fn seats(self) -> [Seat; 2] {
        match self {
            Team::A => [Seat::AWhite, Seat::BBlack],
            Team::B => [Seat::ABlack, Seat::BWhite],
        }
    }
}

/// One of the 4 fixed board/color positions of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    AWhite,
    ABlack,
    BWhite,
    BBlack,
}

impl Seat {
    pub const ALL: [Seat; 4] = [Seat::AWhite, Seat::ABlack, Seat::BWhite, Seat::BBlack];

    pub fn board(self) -> BoardId {
        match self {
            Seat::AWhite | Seat::ABlack => BoardId::A,
            Seat::BWhite | Seat::BBlack => BoardId::B,
        }
    }

    pub fn color(self) -> Color {
        match self {
            Seat::AWhite | Seat::BWhite => Color::White,
            Seat::ABlack | Seat::BBlack => Color::Black,
        }
    }

    pub fn team(self) -> Team {
        match self {
            Seat::AWhite | Seat::BBlack => Team::A,
            Seat::ABlack | Seat::BWhite => Team::B,
        }
    }

    /// The seat this one alternates with: same board, other color.
    pub fn opponent(self) -> Seat {
        match self {
            Seat::AWhite => Seat::ABlack,
            Seat::ABlack => Seat::AWhite,
            Seat::BWhite => Seat::BBlack,
            Seat::BBlack => Seat::BWhite,
        }
    }

    /// The teammate on the other board.
    pub fn partner(self) -> Seat {
        match self {
            Seat::AWhite => Seat::BBlack,
            Seat::BBlack => Seat::AWhite,
            Seat::ABlack => Seat::BWhite,
            Seat::BWhite => Seat::ABlack,
        }
    }

    /// Stable index into per-seat arrays (clock set, snapshots).
    pub fn index(self) -> usize {
        match self {
            Seat::AWhite => 0,
            Seat::ABlack => 1,
            Seat::BWhite => 2,
            Seat::BBlack => 3,
        }
    }

    /// Wire token used in UBI `clock` lines: `1w`, `1b`, `2w`, `2b`.
    pub fn token(self) -> &'static str {
        match self {
            Seat::AWhite => "1w",
            Seat::ABlack => "1b",
            Seat::BWhite => "2w",
            Seat::BBlack => "2b",
        }
    }

    pub fn from_token(token: &str) -> Option<Seat> {
        match token {
            "1w" => Some(Seat::AWhite),
            "1b" => Some(Seat::ABlack),
            "2w" => Some(Seat::BWhite),
            "2b" => Some(Seat::BBlack),
            _ => None,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Droppable and capturable piece kinds. Kings appear only in oracle capture
/// reports; they are never held in a reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    /// Kinds a reserve can hold, in reserve-array order.
    pub const RESERVE: [PieceKind; 5] = [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
    ];

    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    /// Parses the lowercase piece letters of the drop/team-message grammar.
    /// Kings are not part of that vocabulary.
    pub fn from_letter(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            _ => None,
        }
    }

    pub fn reserve_index(self) -> Option<usize> {
        match self {
            PieceKind::Pawn => Some(0),
            PieceKind::Knight => Some(1),
            PieceKind::Bishop => Some(2),
            PieceKind::Rook => Some(3),
            PieceKind::Queen => Some(4),
            PieceKind::King => None,
        }
    }
}

impl From<Piece> for PieceKind {
    fn from(piece: Piece) -> PieceKind {
        match piece {
            Piece::Pawn => PieceKind::Pawn,
            Piece::Knight => PieceKind::Knight,
            Piece::Bishop => PieceKind::Bishop,
            Piece::Rook => PieceKind::Rook,
            Piece::Queen => PieceKind::Queen,
            Piece::King => PieceKind::King,
        }
    }
}

impl From<PieceKind> for Piece {
    fn from(kind: PieceKind) -> Piece {
        match kind {
            PieceKind::Pawn => Piece::Pawn,
            PieceKind::Knight => Piece::Knight,
            PieceKind::Bishop => Piece::Bishop,
            PieceKind::Rook => Piece::Rook,
            PieceKind::Queen => Piece::Queen,
            PieceKind::King => Piece::King,
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PieceKind::Pawn => "pawn",
            PieceKind::Knight => "knight",
            PieceKind::Bishop => "bishop",
            PieceKind::Rook => "rook",
            PieceKind::Queen => "queen",
            PieceKind::King => "king",
        };
        f.write_str(name)
    }
}
