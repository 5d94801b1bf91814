use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use bytes::BytesMut;
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::codec::{BytesCodec, FramedRead};
use uuid::Uuid;

use crate::engine::ubi::{self, EngineMove, LineBuffer, UbiCommand, UbiEvent};
use crate::game::session::GameSessionActor;
use crate::models::app_state::EngineSlot;
use crate::models::messages::{DropPiece, GameSnapshot, GetState, MakeMove, SessionNotification, Subscribe};
use crate::models::seat::{BoardId, Seat};
use crate::team::{TeamChannels, TeamMessage};

/// Engine binary location and arguments for one bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub engine_path: PathBuf,
    pub engine_args: Vec<String>,
}

impl BridgeConfig {
    pub fn new(engine_path: impl Into<PathBuf>) -> BridgeConfig {
        BridgeConfig {
            engine_path: engine_path.into(),
            engine_args: Vec::new(),
        }
    }
}

/// UBI handshake state machine. Transitioned only by the defined protocol
/// events, never by ad hoc flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Handshaking,
    Ready,
    AwaitingMove(Seat),
    Terminated,
}

/// One actor per automated participant. Subscribes to session notifications,
/// drives a UBI engine subprocess, and feeds its verdicts back through the
/// same move/drop request path a human uses.
pub struct EngineBridge {
    participant_id: Uuid,
    /// 1 or 2 seats, all on one team (a dual bot fills both of a team's
    /// seats but is still a single bridge).
    seats: Vec<Seat>,
    session: Addr<GameSessionActor>,
    channels: Arc<TeamChannels>,
    config: BridgeConfig,
    phase: Phase,
    child: Option<Child>,
    writer: Option<UnboundedSender<String>>,
    lines: LineBuffer,
    _slot: Option<EngineSlot>,
}

impl EngineBridge {
    pub fn new(
        config: BridgeConfig,
        seats: Vec<Seat>,
        session: Addr<GameSessionActor>,
        channels: Arc<TeamChannels>,
    ) -> EngineBridge {
        debug_assert!(!seats.is_empty() && seats.len() <= 2);
        debug_assert!(seats.iter().all(|s| s.team() == seats[0].team()));
        EngineBridge {
            participant_id: Uuid::new_v4(),
            seats,
            session,
            channels,
            config,
            phase: Phase::Uninitialized,
            child: None,
            writer: None,
            lines: LineBuffer::new(),
            _slot: None,
        }
    }

    /// Attach the capacity slot this bridge occupies; released when the
    /// bridge is dropped.
    pub fn with_slot(mut self, slot: EngineSlot) -> EngineBridge {
        self._slot = Some(slot);
        self
    }

    pub fn participant_id(&self) -> Uuid {
        self.participant_id
    }

    fn send(&self, command: UbiCommand) {
        if let Some(writer) = &self.writer {
            if writer.send(command.to_string()).is_err() {
                warn!("bot {}: engine stdin closed", self.participant_id);
            }
        }
    }

    fn spawn_engine(&mut self, ctx: &mut Context<Self>) -> io::Result<()> {
        let mut command = Command::new(&self.config.engine_path);
        command
            .args(&self.config.engine_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = command.spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin missing"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdout missing"))?;

        // Writes go through a dedicated task owning stdin; the actor never
        // blocks on subprocess I/O.
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                {
                    break;
                }
                let _ = stdin.flush().await;
            }
        });

        ctx.add_stream(FramedRead::new(stdout, BytesCodec::new()));
        self.child = Some(child);
        self.writer = Some(tx);
        Ok(())
    }

    fn dispatch_line(&mut self, line: &str, ctx: &mut Context<Self>) {
        match ubi::parse_line(line) {
            Ok(UbiEvent::UbiOk) => {
                if self.phase == Phase::Handshaking {
                    self.send(UbiCommand::NewGame);
                    self.send(UbiCommand::IsReady);
                }
            }
            Ok(UbiEvent::ReadyOk) => {
                if self.phase == Phase::Handshaking {
                    info!("bot {}: engine ready", self.participant_id);
                    self.phase = Phase::Ready;
                    // It may already be one of our seats' turn.
                    self.evaluate_turn(ctx);
                }
            }
            Ok(UbiEvent::Id(text)) => debug!("bot {}: id {}", self.participant_id, text),
            Ok(UbiEvent::Info(text)) => debug!("bot {}: info {}", self.participant_id, text),
            Ok(UbiEvent::BestMove { board, mv }) => self.handle_bestmove(board, mv, ctx),
            Ok(UbiEvent::TeamMsg(signal)) => {
                let message = TeamMessage::new(signal, self.seats[0], self.participant_id);
                self.channels.publish(message);
            }
            Err(e) => {
                // One bad line must never wedge the match.
                warn!("bot {}: ignoring engine line: {}", self.participant_id, e);
            }
        }
    }

    /// Fetch a fresh snapshot and, if one of our seats is to move and no
    /// request is outstanding, hand the engine the full position and clocks.
    fn evaluate_turn(&mut self, ctx: &mut Context<Self>) {
        if self.phase != Phase::Ready {
            return;
        }
        let session = self.session.clone();
        ctx.spawn(
            actix::fut::wrap_future::<_, Self>(async move { session.send(GetState).await }).map(
                |res, act, _ctx| {
                    if act.phase != Phase::Ready {
                        return;
                    }
                    let snapshot = match res {
                        Ok(Ok(snapshot)) => snapshot,
                        Ok(Err(e)) => {
                            warn!("bot {}: snapshot refused: {}", act.participant_id, e);
                            return;
                        }
                        Err(e) => {
                            warn!("bot {}: session unreachable: {}", act.participant_id, e);
                            return;
                        }
                    };
                    act.request_move(&snapshot);
                },
            ),
        );
    }

    fn request_move(&mut self, snapshot: &GameSnapshot) {
        if snapshot.result.is_some() {
            return;
        }
        // First seat with a running clock, left to right over our seat list.
        let seat = match self.seats.iter().copied().find(|s| snapshot.is_ticking(*s)) {
            Some(seat) => seat,
            None => return,
        };
        self.phase = Phase::AwaitingMove(seat);
        for board in BoardId::ALL {
            self.send(UbiCommand::Position {
                board,
                bfen: snapshot.board(board).to_string(),
            });
        }
        for s in Seat::ALL {
            self.send(UbiCommand::Clock {
                seat: s,
                ms: snapshot.clock_ms(s),
            });
        }
        self.send(UbiCommand::Go { board: seat.board() });
    }

    fn handle_bestmove(&mut self, board: BoardId, mv: EngineMove, ctx: &mut Context<Self>) {
        let seat = match self.phase {
            Phase::AwaitingMove(seat) => seat,
            _ => {
                warn!("bot {}: unsolicited bestmove ignored", self.participant_id);
                return;
            }
        };
        // Cleared before the request goes out; the state update the request
        // triggers re-evaluates whether another move is owed.
        self.phase = Phase::Ready;
        if board != seat.board() {
            warn!(
                "bot {}: bestmove for board {} while playing board {}",
                self.participant_id,
                board.label(),
                seat.board().label()
            );
            return;
        }
        let participant_id = self.participant_id;
        let session = self.session.clone();
        match mv {
            EngineMove::Drop { piece, square } => {
                ctx.spawn(
                    actix::fut::wrap_future::<_, Self>(async move {
                        session.send(DropPiece { seat, piece, square }).await
                    })
                    .map(move |res, _act, _ctx| log_verdict(participant_id, res)),
                );
            }
            EngineMove::Move { notation } => {
                ctx.spawn(
                    actix::fut::wrap_future::<_, Self>(async move {
                        session.send(MakeMove { seat, notation }).await
                    })
                    .map(move |res, _act, _ctx| log_verdict(participant_id, res)),
                );
            }
        }
    }
}

/// Rejections are logged and skipped; the engine simply waits for the next
/// state update.
fn log_verdict(
    participant_id: Uuid,
    res: Result<Result<GameSnapshot, crate::errors::GameError>, MailboxError>,
) {
    match res {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("bot {}: engine move rejected: {}", participant_id, e),
        Err(e) => warn!("bot {}: session unreachable: {}", participant_id, e),
    }
}

impl Actor for EngineBridge {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        self.session.do_send(Subscribe {
            recipient: ctx.address().recipient(),
        });
        self.channels
            .subscribe(self.seats[0].team(), ctx.address().recipient());
        match self.spawn_engine(ctx) {
            Ok(()) => {
                self.phase = Phase::Handshaking;
                self.send(UbiCommand::Ubi);
                info!(
                    "bot {}: engine {} started for seats {:?}",
                    self.participant_id,
                    self.config.engine_path.display(),
                    self.seats
                );
            }
            Err(e) => {
                error!(
                    "bot {}: failed to start engine {}: {}",
                    self.participant_id,
                    self.config.engine_path.display(),
                    e
                );
                ctx.stop();
            }
        }
    }

    fn stopped(&mut self, _: &mut Context<Self>) {
        if self.phase != Phase::Terminated {
            self.send(UbiCommand::Quit);
            self.phase = Phase::Terminated;
        }
        // Closing the writer lets the stdin task drain the quit line and end.
        self.writer = None;
        if let Some(mut child) = self.child.take() {
            let participant_id = self.participant_id;
            tokio::spawn(async move {
                match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                    Ok(_) => debug!("bot {}: engine exited", participant_id),
                    Err(_) => {
                        warn!("bot {}: engine ignored quit, killing", participant_id);
                        let _ = child.kill().await;
                    }
                }
            });
        }
        info!("bot {}: bridge stopped", self.participant_id);
    }
}

/// Engine stdout, delivered as raw chunks; lines may arrive split.
impl StreamHandler<Result<BytesMut, io::Error>> for EngineBridge {
    fn handle(&mut self, item: Result<BytesMut, io::Error>, ctx: &mut Context<Self>) {
        match item {
            Ok(chunk) => {
                for line in self.lines.push(&chunk) {
                    self.dispatch_line(&line, ctx);
                }
            }
            Err(e) => {
                error!("bot {}: engine stdout error: {}", self.participant_id, e);
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, ctx: &mut Context<Self>) {
        // EOF: the subprocess exited. Fatal to this bridge only.
        info!("bot {}: engine closed its stdout", self.participant_id);
        ctx.stop();
    }
}

impl Handler<SessionNotification> for EngineBridge {
    type Result = ();

    fn handle(&mut self, msg: SessionNotification, ctx: &mut Context<Self>) {
        match msg {
            SessionNotification::StateUpdated(snapshot) => {
                // Cheap pre-check on the notification's snapshot; the real
                // decision uses a fresh one fetched from the session.
                if self.phase != Phase::Ready {
                    return;
                }
                if !self.seats.iter().any(|s| snapshot.is_ticking(*s)) {
                    return;
                }
                self.evaluate_turn(ctx);
            }
            SessionNotification::GameOver(_) => {
                self.send(UbiCommand::Quit);
                self.phase = Phase::Terminated;
                ctx.stop();
            }
        }
    }
}

/// Teammate signals arriving on the team channel are forwarded to the engine;
/// our own messages are not echoed back.
impl Handler<TeamMessage> for EngineBridge {
    type Result = ();

    fn handle(&mut self, msg: TeamMessage, _: &mut Context<Self>) {
        if msg.origin_participant == self.participant_id {
            return;
        }
        self.send(UbiCommand::PartnerMsg(msg.signal));
    }
}
