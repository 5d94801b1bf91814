use std::str::FromStr;

use chess::{Board, BoardBuilder, ChessMove, MoveGen, Piece, Rank, Square};

use crate::errors::GameError;
use crate::models::seat::PieceKind;

/// Outcome of a successfully applied move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// Position after the move, serialized.
    pub position: String,
    pub from: String,
    pub to: String,
    /// Kind of piece removed from the board, if the move captured.
    pub capture: Option<PieceKind>,
    /// Whether the move promoted a pawn.
    pub promotion: bool,
}

/// The external chess-rules collaborator. The session core never decides move
/// legality itself; it orchestrates turns, clocks, reserves and termination
/// around this oracle's verdicts.
pub trait LegalityOracle: Send + 'static {
    /// Validate and apply `notation` to `position`, reporting any capture.
    fn apply_move(&self, position: &str, notation: &str) -> Result<AppliedMove, GameError>;

    /// Validate and apply a reserve drop, returning the new position.
    /// Rejects occupied squares, back-rank pawns and positions the rules
    /// engine considers unreachable.
    fn apply_drop(&self, position: &str, piece: PieceKind, square: &str)
        -> Result<String, GameError>;

    /// Whether the side to move may pick up the piece on `square`.
    fn is_selectable(&self, position: &str, square: &str) -> Result<bool, GameError>;

    /// Legal destination squares for the piece on `square`.
    fn moves_from(&self, position: &str, square: &str) -> Result<Vec<String>, GameError>;
}

/// Legality oracle backed by the `chess` crate.
#[derive(Debug, Default, Clone)]
pub struct ChessOracle;

impl ChessOracle {
    fn board(position: &str) -> Result<Board, GameError> {
        Board::from_str(position).map_err(|e| GameError::InvalidPosition(e.to_string()))
    }
}

/// Parse coordinate notation (`e2e4`, `a7a8q`) into a move.
fn parse_notation(notation: &str) -> Result<ChessMove, GameError> {
    let lowered = notation.trim().to_lowercase();
    // Coordinate notation is pure ASCII; the length check and the square
    // slices below count bytes.
    if !lowered.is_ascii() || lowered.len() < 4 || lowered.len() > 5 {
        return Err(GameError::IllegalMove(format!(
            "malformed notation: {notation}"
        )));
    }
    let from = Square::from_str(&lowered[0..2])
        .map_err(|_| GameError::IllegalMove(format!("bad source square in {notation}")))?;
    let to = Square::from_str(&lowered[2..4])
        .map_err(|_| GameError::IllegalMove(format!("bad destination square in {notation}")))?;
    let promotion = match lowered.len() {
        5 => match lowered.as_bytes()[4] {
            b'n' => Some(Piece::Knight),
            b'b' => Some(Piece::Bishop),
            b'r' => Some(Piece::Rook),
            b'q' => Some(Piece::Queen),
            _ => {
                return Err(GameError::IllegalMove(format!(
                    "bad promotion piece in {notation}"
                )))
            }
        },
        _ => None,
    };
    Ok(ChessMove::new(from, to, promotion))
}

impl LegalityOracle for ChessOracle {
    fn apply_move(&self, position: &str, notation: &str) -> Result<AppliedMove, GameError> {
        let board = Self::board(position)?;
        let mv = parse_notation(notation)?;
        if !board.legal(mv) {
            return Err(GameError::IllegalMove(format!("{notation} is not legal")));
        }
        let from = mv.get_source();
        let to = mv.get_dest();
        let mut capture = board.piece_on(to).map(PieceKind::from);
        // En passant: the destination is empty but a pawn still comes off.
        if capture.is_none()
            && board.piece_on(from) == Some(Piece::Pawn)
            && from.get_file() != to.get_file()
        {
            capture = Some(PieceKind::Pawn);
        }
        let next = board.make_move_new(mv);
        Ok(AppliedMove {
            position: next.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            capture,
            promotion: mv.get_promotion().is_some(),
        })
    }

    fn apply_drop(
        &self,
        position: &str,
        piece: PieceKind,
        square: &str,
    ) -> Result<String, GameError> {
        let board = Self::board(position)?;
        let target = Square::from_str(&square.trim().to_lowercase())
            .map_err(|_| GameError::IllegalDrop(format!("bad square: {square}")))?;
        if board.piece_on(target).is_some() {
            return Err(GameError::IllegalDrop(format!("{target} is occupied")));
        }
        if piece == PieceKind::Pawn
            && matches!(target.get_rank(), Rank::First | Rank::Eighth)
        {
            return Err(GameError::IllegalDrop(
                "pawns may not be dropped on a back rank".to_string(),
            ));
        }
        let color = board.side_to_move();
        let mut builder = BoardBuilder::from(&board);
        builder.piece(target, piece.into(), color);
        builder.side_to_move(!color);
        // A drop is a full move; any en-passant right lapses.
        builder.en_passant(None);
        let next = Board::try_from(&builder)
            .map_err(|e| GameError::IllegalDrop(e.to_string()))?;
        Ok(next.to_string())
    }

    fn is_selectable(&self, position: &str, square: &str) -> Result<bool, GameError> {
        let board = Self::board(position)?;
        let target = match Square::from_str(&square.trim().to_lowercase()) {
            Ok(sq) => sq,
            Err(_) => return Ok(false),
        };
        if board.color_on(target) != Some(board.side_to_move()) {
            return Ok(false);
        }
        Ok(MoveGen::new_legal(&board).any(|mv| mv.get_source() == target))
    }

    fn moves_from(&self, position: &str, square: &str) -> Result<Vec<String>, GameError> {
        let board = Self::board(position)?;
        let target = match Square::from_str(&square.trim().to_lowercase()) {
            Ok(sq) => sq,
            Err(_) => return Ok(Vec::new()),
        };
        let mut destinations = Vec::new();
        for mv in MoveGen::new_legal(&board) {
            if mv.get_source() == target {
                let dest = mv.get_dest().to_string();
                // Promotion generates one move per piece; one square is enough.
                if !destinations.contains(&dest) {
                    destinations.push(dest);
                }
            }
        }
        Ok(destinations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn applies_a_simple_move() {
        let oracle = ChessOracle;
        let applied = oracle.apply_move(START, "e2e4").unwrap();
        assert!(applied.position.starts_with("rnbqkbnr/pppppppp/8/8/4P3/"));
        assert_eq!(applied.capture, None);
        assert!(!applied.promotion);
        assert_eq!(applied.from, "e2");
        assert_eq!(applied.to, "e4");
    }

    #[test]
    fn rejects_an_illegal_move_with_a_reason() {
        let oracle = ChessOracle;
        let err = oracle.apply_move(START, "e2e5").unwrap_err();
        assert!(matches!(err, GameError::IllegalMove(_)));
        let err = oracle.apply_move(START, "banana").unwrap_err();
        assert!(matches!(err, GameError::IllegalMove(_)));
        // Multi-byte notation is rejected, not sliced mid-character.
        let err = oracle.apply_move(START, "aé45").unwrap_err();
        assert!(matches!(err, GameError::IllegalMove(_)));
        let err = oracle.apply_move(START, "é2é4").unwrap_err();
        assert!(matches!(err, GameError::IllegalMove(_)));
    }

    #[test]
    fn reports_captures() {
        let oracle = ChessOracle;
        // 1. e4 d5 2. exd5
        let pos = oracle.apply_move(START, "e2e4").unwrap().position;
        let pos = oracle.apply_move(&pos, "d7d5").unwrap().position;
        let applied = oracle.apply_move(&pos, "e4d5").unwrap();
        assert_eq!(applied.capture, Some(PieceKind::Pawn));
    }

    #[test]
    fn reports_en_passant_captures() {
        let oracle = ChessOracle;
        let pos = "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let applied = oracle.apply_move(pos, "d4e3").unwrap();
        assert_eq!(applied.capture, Some(PieceKind::Pawn));
    }

    #[test]
    fn reports_promotions() {
        let oracle = ChessOracle;
        let pos = "8/5P1k/8/8/8/8/8/4K3 w - - 0 1";
        let applied = oracle.apply_move(pos, "f7f8q").unwrap();
        assert!(applied.promotion);
        assert_eq!(applied.capture, None);
    }

    #[test]
    fn drop_lands_on_an_empty_square_and_flips_the_turn() {
        let oracle = ChessOracle;
        let next = oracle.apply_drop(START, PieceKind::Knight, "e4").unwrap();
        let board = Board::from_str(&next).unwrap();
        assert_eq!(board.side_to_move(), chess::Color::Black);
        assert_eq!(
            board.piece_on(Square::from_str("e4").unwrap()),
            Some(Piece::Knight)
        );
        assert_eq!(
            board.color_on(Square::from_str("e4").unwrap()),
            Some(chess::Color::White)
        );
    }

    #[test]
    fn drop_rejects_occupied_squares() {
        let oracle = ChessOracle;
        let err = oracle.apply_drop(START, PieceKind::Knight, "e2").unwrap_err();
        assert!(matches!(err, GameError::IllegalDrop(_)));
    }

    #[test]
    fn drop_rejects_back_rank_pawns() {
        let oracle = ChessOracle;
        let pos = "4k3/8/8/8/8/8/8/4K3 w - - 0 1";
        let err = oracle.apply_drop(pos, PieceKind::Pawn, "e8").unwrap_err();
        assert!(matches!(err, GameError::IllegalDrop(_)));
        // The same square takes a knight.
        assert!(oracle.apply_drop(pos, PieceKind::Knight, "a8").is_ok());
    }

    #[test]
    fn drop_must_resolve_an_existing_check() {
        let oracle = ChessOracle;
        // White to move, in check from the rook on e8.
        let pos = "4r2k/8/8/8/8/8/8/4K3 w - - 0 1";
        // A knight on a3 leaves the king in check after the turn flips.
        let err = oracle.apply_drop(pos, PieceKind::Knight, "a3").unwrap_err();
        assert!(matches!(err, GameError::IllegalDrop(_)));
        // Blocking on e4 is fine.
        assert!(oracle.apply_drop(pos, PieceKind::Knight, "e4").is_ok());
    }

    #[test]
    fn selectable_only_for_the_side_to_move() {
        let oracle = ChessOracle;
        assert!(oracle.is_selectable(START, "e2").unwrap());
        assert!(!oracle.is_selectable(START, "e7").unwrap());
        assert!(!oracle.is_selectable(START, "e4").unwrap());
        assert!(!oracle.is_selectable(START, "zz").unwrap());
    }

    #[test]
    fn lists_destinations_from_a_square() {
        let oracle = ChessOracle;
        let mut moves = oracle.moves_from(START, "g1").unwrap();
        moves.sort();
        assert_eq!(moves, vec!["f3".to_string(), "h3".to_string()]);
    }
}
