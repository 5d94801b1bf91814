use std::collections::HashSet;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use actix::prelude::*;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::GameError;
use crate::game::board::BoardLedger;
use crate::game::clock::ClockSet;
use crate::game::oracle::LegalityOracle;
use crate::models::messages::{
    CanSelectPiece, DropPiece, GameOutcome, GameSnapshot, GetBfen, GetMoves, GetState, MakeMove,
    MatchResult, MoveKind, MoveRecord, OfferDraw, Resign, ResultReason, SessionNotification,
    Subscribe,
};
use crate::models::seat::{BoardId, Seat};

/// Time control for a fresh match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Starting clock value per seat, milliseconds.
    pub initial_ms: u64,
    /// Credit added to a seat's clock after each of its moves.
    pub increment_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            initial_ms: 300_000,
            increment_ms: 0,
        }
    }
}

/// Deferred timeout notification, scheduled whenever a seat starts ticking.
/// The generation token identifies which scheduling it belongs to; a fired
/// deadline whose token no longer matches has been superseded by a move and
/// is discarded.
#[derive(Debug, Clone, Copy, Message)]
#[rtype(result = "()")]
struct ClockExpired {
    seat: Seat,
    generation: u64,
}

/// The authoritative per-match actor. Sole writer of all match state; its
/// mailbox serializes every request, so mutations apply atomically in
/// submission order and notifications go out in that same order.
pub struct GameSessionActor {
    match_id: Uuid,
    config: SessionConfig,
    oracle: Box<dyn LegalityOracle>,
    ledger: BoardLedger,
    clocks: ClockSet,
    deadlines: [Option<SpawnHandle>; 4],
    last_move: Option<MoveRecord>,
    draw_offers: HashSet<Seat>,
    result: Option<MatchResult>,
    subscribers: Vec<Recipient<SessionNotification>>,
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl GameSessionActor {
    pub fn new(config: SessionConfig, oracle: Box<dyn LegalityOracle>) -> GameSessionActor {
        GameSessionActor {
            match_id: Uuid::new_v4(),
            clocks: ClockSet::new(config.initial_ms),
            config,
            oracle,
            ledger: BoardLedger::new(),
            deadlines: [None, None, None, None],
            last_move: None,
            draw_offers: HashSet::new(),
            result: None,
            subscribers: Vec::new(),
        }
    }

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    fn snapshot(&self, now: Instant) -> GameSnapshot {
        GameSnapshot {
            match_id: self.match_id,
            boards: [
                self.ledger.position(BoardId::A).to_string(),
                self.ledger.position(BoardId::B).to_string(),
            ],
            reserves: self.ledger.reserves(),
            clocks_ms: self.clocks.snapshot_ms(now),
            ticking: self.clocks.ticking_seats(),
            last_move: self.last_move.clone(),
            draw_offers: self.draw_offers.iter().copied().collect(),
            result: self.result,
        }
    }

    fn broadcast(&self, notification: SessionNotification) {
        for subscriber in &self.subscribers {
            subscriber.do_send(notification.clone());
        }
    }

    /// Cancel-and-replace: invalidates any pending deadline for `seat` and
    /// schedules a fresh one for its current remaining time.
    fn schedule_deadline(&mut self, seat: Seat, ctx: &mut Context<Self>) {
        if let Some(handle) = self.deadlines[seat.index()].take() {
            ctx.cancel_future(handle);
        }
        let generation = self.clocks.bump_generation(seat);
        let remaining = self.clocks.remaining_ms(seat, Instant::now());
        let handle = ctx.notify_later(
            ClockExpired { seat, generation },
            Duration::from_millis(remaining),
        );
        self.deadlines[seat.index()] = Some(handle);
    }

    fn cancel_deadline(&mut self, seat: Seat, ctx: &mut Context<Self>) {
        if let Some(handle) = self.deadlines[seat.index()].take() {
            ctx.cancel_future(handle);
        }
        // An already-fired notification still in the mailbox must not count.
        self.clocks.bump_generation(seat);
    }

    /// Flip the ticking seat on the mover's board and reschedule deadlines.
    fn advance_turn(&mut self, seat: Seat, ctx: &mut Context<Self>) {
        let now = Instant::now();
        self.clocks.stop(seat, now);
        if self.config.increment_ms > 0 {
            self.clocks.add_ms(seat, self.config.increment_ms);
        }
        self.cancel_deadline(seat, ctx);
        let next = seat.opponent();
        self.clocks.start(next, now);
        self.schedule_deadline(next, ctx);
    }

    fn record_move(&mut self, seat: Seat, notation: String, kind: MoveKind) {
        self.last_move = Some(MoveRecord {
            board: seat.board(),
            seat,
            notation,
            kind,
            clocks_ms: self.clocks.snapshot_ms(Instant::now()),
            timestamp_ms: epoch_ms(),
        });
    }

    fn finish(&mut self, outcome: GameOutcome, reason: ResultReason, ctx: &mut Context<Self>) {
        let now = Instant::now();
        self.result = Some(MatchResult { outcome, reason });
        self.clocks.stop_all(now);
        for seat in Seat::ALL {
            self.cancel_deadline(seat, ctx);
        }
        info!(
            "match {}: over, {:?} by {:?}",
            self.match_id, outcome, reason
        );
        self.broadcast(SessionNotification::GameOver(self.snapshot(now)));
    }

    /// Turn guard: the ticking seat on a board is by invariant the side to
    /// move there.
    fn guard_turn(&self, seat: Seat) -> Result<(), GameError> {
        if self.clocks.is_ticking(seat) {
            Ok(())
        } else {
            Err(GameError::NotYourTurn)
        }
    }
}

impl Actor for GameSessionActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        // Both boards open on white's turn; both white clocks run at once.
        let now = Instant::now();
        self.clocks.start(Seat::AWhite, now);
        self.clocks.start(Seat::BWhite, now);
        self.schedule_deadline(Seat::AWhite, ctx);
        self.schedule_deadline(Seat::BWhite, ctx);
        info!("match {}: session running", self.match_id);
    }
}

impl Handler<MakeMove> for GameSessionActor {
    type Result = Result<GameSnapshot, GameError>;

    fn handle(&mut self, msg: MakeMove, ctx: &mut Context<Self>) -> Self::Result {
        if self.result.is_some() {
            return Err(GameError::GameOver);
        }
        self.guard_turn(msg.seat)?;
        let outcome = self
            .ledger
            .apply_move(self.oracle.as_ref(), msg.seat, &msg.notation)?;
        self.advance_turn(msg.seat, ctx);
        self.record_move(msg.seat, msg.notation.clone(), MoveKind::Move);
        debug!(
            "match {}: {} played {}",
            self.match_id, msg.seat, msg.notation
        );
        if outcome.king_captured {
            // The oracle reported the opposing king came off the board.
            self.finish(
                GameOutcome::Win(msg.seat.team()),
                ResultReason::KingCapture,
                ctx,
            );
        } else {
            self.broadcast(SessionNotification::StateUpdated(
                self.snapshot(Instant::now()),
            ));
        }
        Ok(self.snapshot(Instant::now()))
    }
}

impl Handler<DropPiece> for GameSessionActor {
    type Result = Result<GameSnapshot, GameError>;

    fn handle(&mut self, msg: DropPiece, ctx: &mut Context<Self>) -> Self::Result {
        if self.result.is_some() {
            return Err(GameError::GameOver);
        }
        self.guard_turn(msg.seat)?;
        self.ledger
            .apply_drop(self.oracle.as_ref(), msg.seat, msg.piece, &msg.square)?;
        self.advance_turn(msg.seat, ctx);
        let notation = format!(
            "{}@{}",
            msg.piece.letter().to_ascii_uppercase(),
            msg.square.to_lowercase()
        );
        debug!("match {}: {} dropped {}", self.match_id, msg.seat, notation);
        self.record_move(msg.seat, notation, MoveKind::Drop);
        self.broadcast(SessionNotification::StateUpdated(
            self.snapshot(Instant::now()),
        ));
        Ok(self.snapshot(Instant::now()))
    }
}

impl Handler<Resign> for GameSessionActor {
    type Result = Result<GameSnapshot, GameError>;

    fn handle(&mut self, msg: Resign, ctx: &mut Context<Self>) -> Self::Result {
        if self.result.is_some() {
            return Err(GameError::GameAlreadyOver);
        }
        info!("match {}: {} resigns", self.match_id, msg.seat);
        self.finish(
            GameOutcome::Win(msg.seat.team().other()),
            ResultReason::Resignation,
            ctx,
        );
        Ok(self.snapshot(Instant::now()))
    }
}

impl Handler<OfferDraw> for GameSessionActor {
    type Result = Result<GameSnapshot, GameError>;

    fn handle(&mut self, msg: OfferDraw, ctx: &mut Context<Self>) -> Self::Result {
        if self.result.is_some() {
            return Err(GameError::GameAlreadyOver);
        }
        self.draw_offers.insert(msg.seat);
        info!(
            "match {}: {} offers a draw ({}/4)",
            self.match_id,
            msg.seat,
            self.draw_offers.len()
        );
        if self.draw_offers.len() == Seat::ALL.len() {
            self.finish(GameOutcome::Draw, ResultReason::Agreement, ctx);
        } else {
            self.broadcast(SessionNotification::StateUpdated(
                self.snapshot(Instant::now()),
            ));
        }
        Ok(self.snapshot(Instant::now()))
    }
}

impl Handler<GetState> for GameSessionActor {
    type Result = Result<GameSnapshot, GameError>;

    fn handle(&mut self, _: GetState, _: &mut Context<Self>) -> Self::Result {
        Ok(self.snapshot(Instant::now()))
    }
}

impl Handler<GetBfen> for GameSessionActor {
    type Result = Result<[String; 2], GameError>;

    fn handle(&mut self, _: GetBfen, _: &mut Context<Self>) -> Self::Result {
        Ok(self.snapshot(Instant::now()).boards)
    }
}

impl Handler<CanSelectPiece> for GameSessionActor {
    type Result = Result<bool, GameError>;

    fn handle(&mut self, msg: CanSelectPiece, _: &mut Context<Self>) -> Self::Result {
        if self.result.is_some() || !self.clocks.is_ticking(msg.seat) {
            return Ok(false);
        }
        self.oracle
            .is_selectable(self.ledger.position(msg.seat.board()), &msg.square)
    }
}

impl Handler<GetMoves> for GameSessionActor {
    type Result = Result<Vec<String>, GameError>;

    fn handle(&mut self, msg: GetMoves, _: &mut Context<Self>) -> Self::Result {
        if self.result.is_some() || !self.clocks.is_ticking(msg.seat) {
            return Ok(Vec::new());
        }
        self.oracle
            .moves_from(self.ledger.position(msg.seat.board()), &msg.square)
    }
}

impl Handler<Subscribe> for GameSessionActor {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _: &mut Context<Self>) {
        self.subscribers.push(msg.recipient);
    }
}

impl Handler<ClockExpired> for GameSessionActor {
    type Result = ();

    fn handle(&mut self, msg: ClockExpired, ctx: &mut Context<Self>) {
        if self.result.is_some() {
            return;
        }
        if msg.generation != self.clocks.generation(msg.seat) {
            // Superseded by an intervening move; never a real timeout.
            debug!(
                "match {}: stale deadline for {} ignored",
                self.match_id, msg.seat
            );
            return;
        }
        if !self.clocks.is_ticking(msg.seat) {
            return;
        }
        let remaining = self.clocks.remaining_ms(msg.seat, Instant::now());
        if remaining > 0 {
            // Timer fired marginally early; push the deadline out.
            let handle = ctx.notify_later(msg, Duration::from_millis(remaining));
            self.deadlines[msg.seat.index()] = Some(handle);
            return;
        }
        warn!("match {}: {} ran out of time", self.match_id, msg.seat);
        self.finish(
            GameOutcome::Win(msg.seat.team().other()),
            ResultReason::Timeout,
            ctx,
        );
    }
}
