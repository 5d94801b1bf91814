use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::GameError;
use crate::game::oracle::LegalityOracle;
use crate::models::seat::{BoardId, PieceKind, Seat, Team};

/// Standard starting position, used for both boards of a fresh match.
pub const START_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Piece counts of one reserve pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveCounts {
    counts: [u32; 5],
}

impl ReserveCounts {
    pub fn count(&self, kind: PieceKind) -> u32 {
        kind.reserve_index().map_or(0, |i| self.counts[i])
    }

    fn add(&mut self, kind: PieceKind) {
        if let Some(i) = kind.reserve_index() {
            self.counts[i] += 1;
        }
    }

    fn take(&mut self, kind: PieceKind) -> bool {
        match kind.reserve_index() {
            Some(i) if self.counts[i] > 0 => {
                self.counts[i] -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

/// What a successful ledger mutation did, for the session to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOutcome {
    /// Capture routed to a reserve, if any: which team gained which kind.
    pub capture: Option<(Team, PieceKind)>,
    /// The oracle reported the opposing king was removed from the board.
    pub king_captured: bool,
}

/// The two board positions and the four reserve pools of a match.
///
/// A capture on board N by team X lands in X's pool for the *other* board,
/// where X's partner spends it with a drop. Promoted pieces are tracked by
/// square so they revert to pawns when captured; the oracle's serialized
/// position cannot carry that flag.
#[derive(Debug)]
pub struct BoardLedger {
    positions: [String; 2],
    /// Indexed by [team][board the pool is spendable on].
    reserves: [[ReserveCounts; 2]; 2],
    /// Squares currently holding a promoted piece, per board.
    promoted: [HashSet<String>; 2],
}

impl BoardLedger {
    pub fn new() -> BoardLedger {
        BoardLedger {
            positions: [START_POSITION.to_string(), START_POSITION.to_string()],
            reserves: Default::default(),
            promoted: Default::default(),
        }
    }

    pub fn position(&self, board: BoardId) -> &str {
        &self.positions[board.index()]
    }

    pub fn reserves(&self) -> [[ReserveCounts; 2]; 2] {
        self.reserves
    }

    pub fn reserve(&self, team: Team, board: BoardId) -> &ReserveCounts {
        &self.reserves[team.index()][board.index()]
    }

    /// Validate and apply an ordinary move for `seat` on its board. Nothing is
    /// mutated when the oracle rejects.
    pub fn apply_move(
        &mut self,
        oracle: &dyn LegalityOracle,
        seat: Seat,
        notation: &str,
    ) -> Result<LedgerOutcome, GameError> {
        let board = seat.board();
        let b = board.index();
        let applied = oracle.apply_move(&self.positions[b], notation)?;

        // Resolve the captured kind before relocating the mover's own
        // promoted flag: a flagged square yields a pawn, not its face value.
        let capture = applied.capture.map(|kind| {
            let kind = if self.promoted[b].remove(&applied.to) {
                PieceKind::Pawn
            } else {
                kind
            };
            (seat.team(), kind)
        });
        let was_promoted = self.promoted[b].remove(&applied.from);
        if applied.promotion || was_promoted {
            self.promoted[b].insert(applied.to.clone());
        }

        let king_captured = matches!(capture, Some((_, PieceKind::King)));
        if let Some((team, kind)) = capture {
            if kind != PieceKind::King {
                // Feeds the partner's board, never the board it was taken on.
                self.reserves[team.index()][board.other().index()].add(kind);
            }
        }
        self.positions[b] = applied.position;
        Ok(LedgerOutcome {
            capture,
            king_captured,
        })
    }

    /// Validate and apply a reserve drop for `seat` on its board. The pool is
    /// only debited once the oracle has accepted the drop.
    pub fn apply_drop(
        &mut self,
        oracle: &dyn LegalityOracle,
        seat: Seat,
        piece: PieceKind,
        square: &str,
    ) -> Result<LedgerOutcome, GameError> {
        let board = seat.board();
        let pool = &self.reserves[seat.team().index()][board.index()];
        if pool.count(piece) == 0 {
            return Err(GameError::NoPieceInReserve(piece));
        }
        let next = oracle.apply_drop(&self.positions[board.index()], piece, square)?;
        self.reserves[seat.team().index()][board.index()].take(piece);
        self.positions[board.index()] = next;
        Ok(LedgerOutcome {
            capture: None,
            king_captured: false,
        })
    }

    #[cfg(test)]
    pub(crate) fn set_position(&mut self, board: BoardId, position: &str) {
        self.positions[board.index()] = position.to_string();
    }

    #[cfg(test)]
    pub(crate) fn grant(&mut self, team: Team, board: BoardId, kind: PieceKind) {
        self.reserves[team.index()][board.index()].add(kind);
    }
}

impl Default for BoardLedger {
    fn default() -> Self {
        Self::new()
    }
}
