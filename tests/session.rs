use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix::prelude::*;
use uuid::Uuid;

use bughouse_session::{
    AppState, AppliedMove, BoardId, ChessOracle, DropPiece, GameError, GameOutcome,
    GameSessionActor, GameSnapshot, GetBfen, GetMoves, GetState, LegalityOracle, MakeMove,
    MoveKind, OfferDraw, PieceKind, Resign, ResultReason, Seat, SessionConfig,
    SessionNotification, Subscribe, Team, TeamChannels, TeamMessage, TeamSignal, CanSelectPiece,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn start_session(initial_ms: u64, increment_ms: u64) -> Addr<GameSessionActor> {
    init_logging();
    GameSessionActor::new(
        SessionConfig {
            initial_ms,
            increment_ms,
        },
        Box::new(ChessOracle),
    )
    .start()
}

async fn state(session: &Addr<GameSessionActor>) -> GameSnapshot {
    session.send(GetState).await.unwrap().unwrap()
}

/// Oracle whose every move captures the opposing king, for driving the
/// looser rule sets where a king can actually come off the board.
struct KingCaptureOracle;

impl LegalityOracle for KingCaptureOracle {
    fn apply_move(&self, position: &str, notation: &str) -> Result<AppliedMove, GameError> {
        Ok(AppliedMove {
            position: position.to_string(),
            from: notation[0..2].to_string(),
            to: notation[2..4].to_string(),
            capture: Some(PieceKind::King),
            promotion: false,
        })
    }

    fn apply_drop(&self, _: &str, _: PieceKind, square: &str) -> Result<String, GameError> {
        Err(GameError::IllegalDrop(format!("no drops on {square}")))
    }

    fn is_selectable(&self, _: &str, _: &str) -> Result<bool, GameError> {
        Ok(true)
    }

    fn moves_from(&self, _: &str, _: &str) -> Result<Vec<String>, GameError> {
        Ok(Vec::new())
    }
}

/// Collects everything broadcast to it, for asserting on notification order
/// and team-channel scoping.
#[derive(Default)]
struct Recorder {
    notifications: Arc<Mutex<Vec<SessionNotification>>>,
    team_messages: Arc<Mutex<Vec<TeamMessage>>>,
}

impl Actor for Recorder {
    type Context = Context<Self>;
}

impl Handler<SessionNotification> for Recorder {
    type Result = ();

    fn handle(&mut self, msg: SessionNotification, _: &mut Context<Self>) {
        self.notifications.lock().unwrap().push(msg);
    }
}

impl Handler<TeamMessage> for Recorder {
    type Result = ();

    fn handle(&mut self, msg: TeamMessage, _: &mut Context<Self>) {
        self.team_messages.lock().unwrap().push(msg);
    }
}

#[actix_rt::test]
async fn opening_move_flips_only_its_own_board() {
    let session = start_session(60_000, 0);

    let before = state(&session).await;
    assert!(before.is_ticking(Seat::AWhite));
    assert!(before.is_ticking(Seat::BWhite));

    let snapshot = session
        .send(MakeMove {
            seat: Seat::AWhite,
            notation: "e2e4".to_string(),
        })
        .await
        .unwrap()
        .unwrap();

    assert_ne!(snapshot.board(BoardId::A), before.board(BoardId::A));
    assert_eq!(snapshot.board(BoardId::B), before.board(BoardId::B));
    assert!(snapshot.is_ticking(Seat::ABlack));
    assert!(!snapshot.is_ticking(Seat::AWhite));
    // Board B is untouched by board A's move.
    assert!(snapshot.is_ticking(Seat::BWhite));
    assert!(!snapshot.is_ticking(Seat::BBlack));

    // The mover's clock holds steady once stopped.
    let frozen = snapshot.clock_ms(Seat::AWhite);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let later = state(&session).await;
    assert_eq!(later.clock_ms(Seat::AWhite), frozen);
    assert!(later.clock_ms(Seat::ABlack) < 60_000);

    let boards = session.send(GetBfen).await.unwrap().unwrap();
    assert_eq!(boards, later.boards);

    let record = later.last_move.expect("move recorded");
    assert_eq!(record.seat, Seat::AWhite);
    assert_eq!(record.notation, "e2e4");
    assert_eq!(record.kind, MoveKind::Move);
    assert_eq!(record.board, BoardId::A);
}

#[actix_rt::test]
async fn rejected_requests_mutate_nothing() {
    let session = start_session(60_000, 0);
    let before = state(&session).await;

    // Not that seat's turn.
    let err = session
        .send(MakeMove {
            seat: Seat::ABlack,
            notation: "e7e5".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, GameError::NotYourTurn);

    // Oracle-rejected move.
    let err = session
        .send(MakeMove {
            seat: Seat::AWhite,
            notation: "e2e5".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, GameError::IllegalMove(_)));

    // Empty reserve.
    let err = session
        .send(DropPiece {
            seat: Seat::AWhite,
            piece: PieceKind::Knight,
            square: "e4".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, GameError::NoPieceInReserve(PieceKind::Knight));

    let after = state(&session).await;
    assert_eq!(after.boards, before.boards);
    assert_eq!(after.reserves, before.reserves);
    assert_eq!(after.ticking, before.ticking);
    assert!(after.last_move.is_none());
}

#[actix_rt::test]
async fn capture_feeds_the_partner_board_and_is_droppable_there() {
    let session = start_session(60_000, 0);

    // Board A: 1. e4 d5 2. exd5, so team A captures a black pawn.
    for (seat, notation) in [
        (Seat::AWhite, "e2e4"),
        (Seat::ABlack, "d7d5"),
        (Seat::AWhite, "e4d5"),
    ] {
        session
            .send(MakeMove {
                seat,
                notation: notation.to_string(),
            })
            .await
            .unwrap()
            .unwrap();
    }

    let snapshot = state(&session).await;
    assert_eq!(
        snapshot.reserve(Team::A, BoardId::B).count(PieceKind::Pawn),
        1
    );
    assert_eq!(snapshot.reserve(Team::A, BoardId::A).count(PieceKind::Pawn), 0);
    assert_eq!(snapshot.reserve(Team::B, BoardId::A).total(), 0);

    // The capturing seat itself cannot spend it on its own board.
    let err = session
        .send(DropPiece {
            seat: Seat::ABlack,
            piece: PieceKind::Pawn,
            square: "e5".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, GameError::NoPieceInReserve(PieceKind::Pawn));

    // Team A's board-B seat spends it once it is black's turn there.
    session
        .send(MakeMove {
            seat: Seat::BWhite,
            notation: "g1f3".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    let snapshot = session
        .send(DropPiece {
            seat: Seat::BBlack,
            piece: PieceKind::Pawn,
            square: "e5".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        snapshot.reserve(Team::A, BoardId::B).count(PieceKind::Pawn),
        0
    );
    let record = snapshot.last_move.expect("drop recorded");
    assert_eq!(record.kind, MoveKind::Drop);
    assert_eq!(record.notation, "P@e5");
    assert_eq!(record.seat, Seat::BBlack);
}

#[actix_rt::test]
async fn resignation_ends_the_match_for_the_other_team() {
    let session = start_session(60_000, 0);

    // BBlack sits on team A; team B wins.
    let snapshot = session
        .send(Resign { seat: Seat::BBlack })
        .await
        .unwrap()
        .unwrap();
    let result = snapshot.result.expect("terminal result");
    assert_eq!(result.outcome, GameOutcome::Win(Team::B));
    assert_eq!(result.reason, ResultReason::Resignation);
    assert!(snapshot.ticking.is_empty());

    let err = session
        .send(MakeMove {
            seat: Seat::AWhite,
            notation: "e2e4".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, GameError::GameOver);

    let err = session
        .send(Resign { seat: Seat::AWhite })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, GameError::GameAlreadyOver);
}

#[actix_rt::test]
async fn king_capture_ends_the_match_for_the_capturing_team() {
    init_logging();
    let session =
        GameSessionActor::new(SessionConfig::default(), Box::new(KingCaptureOracle)).start();

    let snapshot = session
        .send(MakeMove {
            seat: Seat::AWhite,
            notation: "e2e8".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    let result = snapshot.result.expect("terminal result");
    assert_eq!(result.outcome, GameOutcome::Win(Team::A));
    assert_eq!(result.reason, ResultReason::KingCapture);
    assert!(snapshot.ticking.is_empty());
    // The king never enters a reserve.
    assert_eq!(snapshot.reserve(Team::A, BoardId::B).total(), 0);

    let err = session
        .send(MakeMove {
            seat: Seat::BWhite,
            notation: "e2e8".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, GameError::GameOver);
}

#[actix_rt::test]
async fn draw_needs_all_four_seats() {
    let session = start_session(60_000, 0);

    for seat in [Seat::AWhite, Seat::ABlack, Seat::BWhite] {
        let snapshot = session.send(OfferDraw { seat }).await.unwrap().unwrap();
        assert!(snapshot.result.is_none(), "3 offers must not end the match");
    }
    // Repeat offers do not count twice.
    let snapshot = session
        .send(OfferDraw { seat: Seat::AWhite })
        .await
        .unwrap()
        .unwrap();
    assert!(snapshot.result.is_none());

    let snapshot = session
        .send(OfferDraw { seat: Seat::BBlack })
        .await
        .unwrap()
        .unwrap();
    let result = snapshot.result.expect("agreed draw");
    assert_eq!(result.outcome, GameOutcome::Draw);
    assert_eq!(result.reason, ResultReason::Agreement);
}

#[actix_rt::test]
async fn idle_clock_times_out_for_the_opposing_team() {
    // Board B buys itself time through the increment; board A's white is
    // left to flag.
    let session = start_session(500, 5_000);
    session
        .send(MakeMove {
            seat: Seat::BWhite,
            notation: "e2e4".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    session
        .send(MakeMove {
            seat: Seat::BBlack,
            notation: "e7e5".to_string(),
        })
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(900)).await;
    let snapshot = state(&session).await;
    let result = snapshot.result.expect("timeout result");
    assert_eq!(result.reason, ResultReason::Timeout);
    assert_eq!(result.outcome, GameOutcome::Win(Team::B));
    assert_eq!(snapshot.clock_ms(Seat::AWhite), 0);

    let err = session
        .send(MakeMove {
            seat: Seat::ABlack,
            notation: "e7e5".to_string(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, GameError::GameOver);
}

#[actix_rt::test]
async fn superseded_deadline_has_no_effect() {
    // All original deadlines land at ~400ms. Board B and board A's white
    // escape through moves (large increment); only ABlack's fresh deadline
    // may fire.
    let session = start_session(400, 10_000);
    for (seat, notation) in [
        (Seat::BWhite, "e2e4"),
        (Seat::BBlack, "e7e5"),
        (Seat::AWhite, "e2e4"),
    ] {
        session
            .send(MakeMove {
                seat,
                notation: notation.to_string(),
            })
            .await
            .unwrap()
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(800)).await;
    let snapshot = state(&session).await;
    let result = snapshot.result.expect("timeout result");
    // ABlack (team B) flagged; AWhite's superseded deadline counted for
    // nothing even though its original expiry has long passed.
    assert_eq!(result.outcome, GameOutcome::Win(Team::A));
    assert_eq!(result.reason, ResultReason::Timeout);
}

#[actix_rt::test]
async fn increment_credits_the_mover() {
    let session = start_session(10_000, 2_000);
    let snapshot = session
        .send(MakeMove {
            seat: Seat::AWhite,
            notation: "e2e4".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    assert!(snapshot.clock_ms(Seat::AWhite) > 11_000);
    assert!(snapshot.clock_ms(Seat::ABlack) <= 10_000);
}

#[actix_rt::test]
async fn selection_probe_and_move_list_stay_side_effect_free() {
    let session = start_session(60_000, 0);
    let before = state(&session).await;

    assert!(session
        .send(CanSelectPiece {
            seat: Seat::AWhite,
            square: "e2".to_string(),
        })
        .await
        .unwrap()
        .unwrap());
    // Not black's turn yet, so nothing is selectable for that seat.
    assert!(!session
        .send(CanSelectPiece {
            seat: Seat::ABlack,
            square: "e7".to_string(),
        })
        .await
        .unwrap()
        .unwrap());

    let mut moves = session
        .send(GetMoves {
            seat: Seat::BWhite,
            square: "g1".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    moves.sort();
    assert_eq!(moves, vec!["f3".to_string(), "h3".to_string()]);

    let after = state(&session).await;
    assert_eq!(after.boards, before.boards);
    assert_eq!(after.ticking, before.ticking);
}

#[actix_rt::test]
async fn notifications_arrive_in_mutation_order() {
    let session = start_session(60_000, 0);
    let notifications = Arc::new(Mutex::new(Vec::new()));
    let recorder = Recorder {
        notifications: notifications.clone(),
        ..Default::default()
    }
    .start();
    session.do_send(Subscribe {
        recipient: recorder.recipient(),
    });

    for (seat, notation) in [(Seat::AWhite, "e2e4"), (Seat::ABlack, "e7e5")] {
        session
            .send(MakeMove {
                seat,
                notation: notation.to_string(),
            })
            .await
            .unwrap()
            .unwrap();
    }
    session.send(Resign { seat: Seat::AWhite }).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = notifications.lock().unwrap();
    assert_eq!(seen.len(), 3);
    match (&seen[0], &seen[1], &seen[2]) {
        (
            SessionNotification::StateUpdated(first),
            SessionNotification::StateUpdated(second),
            SessionNotification::GameOver(last),
        ) => {
            assert_eq!(first.last_move.as_ref().unwrap().notation, "e2e4");
            assert_eq!(second.last_move.as_ref().unwrap().notation, "e7e5");
            assert_eq!(
                last.result.unwrap().outcome,
                GameOutcome::Win(Team::B)
            );
        }
        other => panic!("unexpected notification sequence: {other:?}"),
    }
}

#[actix_rt::test]
async fn team_channel_reaches_only_the_origin_team() {
    init_logging();
    let channels = TeamChannels::new();
    let team_a_messages = Arc::new(Mutex::new(Vec::new()));
    let team_b_messages = Arc::new(Mutex::new(Vec::new()));
    let team_a = Recorder {
        team_messages: team_a_messages.clone(),
        ..Default::default()
    }
    .start();
    let team_b = Recorder {
        team_messages: team_b_messages.clone(),
        ..Default::default()
    }
    .start();
    channels.subscribe(Team::A, team_a.recipient());
    channels.subscribe(Team::B, team_b.recipient());

    let message = TeamMessage::new(
        TeamSignal::Need {
            piece: PieceKind::Rook,
            urgency: None,
        },
        Seat::BBlack,
        Uuid::new_v4(),
    );
    channels.publish(message.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(team_a_messages.lock().unwrap().as_slice(), &[message]);
    assert!(team_b_messages.lock().unwrap().is_empty());
}

#[actix_rt::test]
async fn registry_tracks_matches_and_bounds_bridges() {
    init_logging();
    let state = AppState::new(1);
    let (match_id, session) = state.create_match(SessionConfig::default(), Box::new(ChessOracle));
    assert_eq!(state.running_matches(), 1);
    assert!(state.lookup(match_id).is_ok());

    session.send(Resign { seat: Seat::AWhite }).await.unwrap().unwrap();
    state.remove_match(match_id);
    assert!(state.lookup(match_id).is_err());
    assert_eq!(state.running_matches(), 0);
}
