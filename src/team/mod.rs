//! Teammate signal protocol: a closed 5-type vocabulary exchanged between a
//! match's two teammates and forwarded to/from engine subprocesses. Outbound
//! lines read `partnermsg …`; inbound lines read `teammsg …` and parse as the
//! strict inverse.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use actix::prelude::*;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TeamMessageError;
use crate::models::seat::{PieceKind, Seat, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    fn token(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }

    fn from_token(token: &str) -> Option<Urgency> {
        match token {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayFastReason {
    Time,
    Pressure,
}

impl PlayFastReason {
    fn token(self) -> &'static str {
        match self {
            PlayFastReason::Time => "time",
            PlayFastReason::Pressure => "pressure",
        }
    }

    fn from_token(token: &str) -> Option<PlayFastReason> {
        match token {
            "time" => Some(PlayFastReason::Time),
            "pressure" => Some(PlayFastReason::Pressure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    fn token(self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }

    fn from_token(token: &str) -> Option<ThreatLevel> {
        match token {
            "low" => Some(ThreatLevel::Low),
            "medium" => Some(ThreatLevel::Medium),
            "high" => Some(ThreatLevel::High),
            "critical" => Some(ThreatLevel::Critical),
            _ => None,
        }
    }
}

/// The tactical-signal vocabulary itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TeamSignal {
    /// "Send me this piece": capture it for my board if you can.
    Need {
        piece: PieceKind,
        urgency: Option<Urgency>,
    },
    /// "Hold your position": avoid trades for a while.
    Stall { duration: Option<u32> },
    /// "Move quickly": the teammate is burning clock or under pressure.
    PlayFast { reason: Option<PlayFastReason> },
    /// Running material balance as this side sees it.
    Material { value: i32 },
    /// Danger level on the sender's board.
    Threat { level: ThreatLevel },
}

fn invalid(reason: impl Into<String>) -> TeamMessageError {
    TeamMessageError::InvalidTeamMessage(reason.into())
}

impl TeamSignal {
    fn body(&self) -> String {
        match self {
            TeamSignal::Need { piece, urgency } => {
                let mut line = format!("need {}", piece.letter());
                if let Some(u) = urgency {
                    line.push_str(&format!(" urgency {}", u.token()));
                }
                line
            }
            TeamSignal::Stall { duration } => match duration {
                Some(n) => format!("stall duration {n}"),
                None => "stall".to_string(),
            },
            TeamSignal::PlayFast { reason } => match reason {
                Some(r) => format!("play_fast reason {}", r.token()),
                None => "play_fast".to_string(),
            },
            TeamSignal::Material { value } => format!("material {value:+}"),
            TeamSignal::Threat { level } => format!("threat {}", level.token()),
        }
    }

    /// Wire form sent to an engine subprocess.
    pub fn to_partnermsg(&self) -> String {
        format!("partnermsg {}", self.body())
    }

    /// Parse a `teammsg …` line received from an engine subprocess.
    pub fn parse_teammsg(line: &str) -> Result<TeamSignal, TeamMessageError> {
        let body = line
            .strip_prefix("teammsg ")
            .ok_or(TeamMessageError::NotATeamMessage)?;
        Self::parse_body(body)
    }

    fn parse_body(body: &str) -> Result<TeamSignal, TeamMessageError> {
        let mut tokens = body.split_whitespace();
        let kind = tokens.next().ok_or_else(|| invalid("empty message"))?;
        let signal = match kind {
            "need" => {
                let piece_token = tokens.next().ok_or_else(|| invalid("need: missing piece"))?;
                let piece = match piece_token.as_bytes() {
                    [c] => PieceKind::from_letter(*c as char),
                    _ => None,
                }
                .ok_or_else(|| invalid(format!("need: bad piece {piece_token}")))?;
                let urgency = match tokens.next() {
                    None => None,
                    Some("urgency") => {
                        let value = tokens
                            .next()
                            .ok_or_else(|| invalid("need: missing urgency value"))?;
                        Some(
                            Urgency::from_token(value)
                                .ok_or_else(|| invalid(format!("need: bad urgency {value}")))?,
                        )
                    }
                    Some(other) => return Err(invalid(format!("need: unexpected token {other}"))),
                };
                TeamSignal::Need { piece, urgency }
            }
            "stall" => {
                let duration = match tokens.next() {
                    None => None,
                    Some("duration") => {
                        let value = tokens
                            .next()
                            .ok_or_else(|| invalid("stall: missing duration value"))?;
                        let n: u32 = value
                            .parse()
                            .map_err(|_| invalid(format!("stall: bad duration {value}")))?;
                        if n == 0 {
                            return Err(invalid("stall: duration must be positive"));
                        }
                        Some(n)
                    }
                    Some(other) => return Err(invalid(format!("stall: unexpected token {other}"))),
                };
                TeamSignal::Stall { duration }
            }
            "play_fast" => {
                let reason = match tokens.next() {
                    None => None,
                    Some("reason") => {
                        let value = tokens
                            .next()
                            .ok_or_else(|| invalid("play_fast: missing reason value"))?;
                        Some(
                            PlayFastReason::from_token(value)
                                .ok_or_else(|| invalid(format!("play_fast: bad reason {value}")))?,
                        )
                    }
                    Some(other) => {
                        return Err(invalid(format!("play_fast: unexpected token {other}")))
                    }
                };
                TeamSignal::PlayFast { reason }
            }
            "material" => {
                let value = tokens
                    .next()
                    .ok_or_else(|| invalid("material: missing value"))?;
                let value: i32 = value
                    .parse()
                    .map_err(|_| invalid(format!("material: bad value {value}")))?;
                TeamSignal::Material { value }
            }
            "threat" => {
                let value = tokens.next().ok_or_else(|| invalid("threat: missing level"))?;
                let level = ThreatLevel::from_token(value)
                    .ok_or_else(|| invalid(format!("threat: bad level {value}")))?;
                TeamSignal::Threat { level }
            }
            other => return Err(invalid(format!("unknown message type {other}"))),
        };
        if let Some(extra) = tokens.next() {
            return Err(invalid(format!("trailing token {extra}")));
        }
        Ok(signal)
    }
}

/// Strictly increasing wall-clock milliseconds, so two messages constructed
/// back to back never share a timestamp.
fn monotonic_ms() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(p) => prev = p,
        }
    }
}

/// A signal in transit on a team channel. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct TeamMessage {
    pub id: Uuid,
    pub signal: TeamSignal,
    pub origin_seat: Seat,
    pub origin_participant: Uuid,
    pub timestamp_ms: u64,
}

impl TeamMessage {
    pub fn new(signal: TeamSignal, origin_seat: Seat, origin_participant: Uuid) -> TeamMessage {
        TeamMessage {
            id: Uuid::new_v4(),
            signal,
            origin_seat,
            origin_participant,
            timestamp_ms: monotonic_ms(),
        }
    }

    /// The only team whose subscribers may see this message.
    pub fn team(&self) -> Team {
        self.origin_seat.team()
    }

    pub fn to_partnermsg(&self) -> String {
        self.signal.to_partnermsg()
    }
}

/// Per-match fan-out of team messages, scoped so a message only ever reaches
/// the origin team's subscribers.
#[derive(Default)]
pub struct TeamChannels {
    subscribers: Mutex<HashMap<Team, Vec<Recipient<TeamMessage>>>>,
}

impl TeamChannels {
    pub fn new() -> TeamChannels {
        TeamChannels::default()
    }

    pub fn subscribe(&self, team: Team, recipient: Recipient<TeamMessage>) {
        self.subscribers
            .lock()
            .unwrap()
            .entry(team)
            .or_default()
            .push(recipient);
    }

    pub fn publish(&self, message: TeamMessage) {
        let team = message.team();
        debug!("team channel {:?}: {}", team, message.to_partnermsg());
        let subscribers = self.subscribers.lock().unwrap();
        if let Some(recipients) = subscribers.get(&team) {
            for recipient in recipients {
                recipient.do_send(message.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn need_round_trips_through_both_wire_forms() {
        let signal = TeamSignal::parse_teammsg("teammsg need n urgency high").unwrap();
        assert_eq!(
            signal,
            TeamSignal::Need {
                piece: PieceKind::Knight,
                urgency: Some(Urgency::High),
            }
        );
        assert_eq!(signal.to_partnermsg(), "partnermsg need n urgency high");
    }

    #[test]
    fn optional_params_may_be_omitted() {
        assert_eq!(
            TeamSignal::parse_teammsg("teammsg stall").unwrap(),
            TeamSignal::Stall { duration: None }
        );
        assert_eq!(
            TeamSignal::parse_teammsg("teammsg play_fast").unwrap(),
            TeamSignal::PlayFast { reason: None }
        );
        assert_eq!(
            TeamSignal::Stall { duration: Some(30) }.to_partnermsg(),
            "partnermsg stall duration 30"
        );
    }

    #[test]
    fn material_carries_a_signed_value() {
        assert_eq!(
            TeamSignal::parse_teammsg("teammsg material -3").unwrap(),
            TeamSignal::Material { value: -3 }
        );
        assert_eq!(
            TeamSignal::parse_teammsg("teammsg material +5").unwrap(),
            TeamSignal::Material { value: 5 }
        );
        assert_eq!(
            TeamSignal::Material { value: 5 }.to_partnermsg(),
            "partnermsg material +5"
        );
    }

    #[test]
    fn tokens_outside_the_vocabulary_are_invalid() {
        for line in [
            "teammsg need k",
            "teammsg need n urgency extreme",
            "teammsg stall duration 0",
            "teammsg stall duration soon",
            "teammsg play_fast reason boredom",
            "teammsg threat apocalyptic",
            "teammsg material",
            "teammsg gossip hello",
            "teammsg threat low trailing",
        ] {
            assert!(
                matches!(
                    TeamSignal::parse_teammsg(line),
                    Err(TeamMessageError::InvalidTeamMessage(_))
                ),
                "expected invalid: {line}"
            );
        }
    }

    #[test]
    fn non_team_lines_are_a_distinct_error() {
        assert_eq!(
            TeamSignal::parse_teammsg("bestmove board A e2e4"),
            Err(TeamMessageError::NotATeamMessage)
        );
        assert_eq!(
            TeamSignal::parse_teammsg("teammsg"),
            Err(TeamMessageError::NotATeamMessage)
        );
    }

    #[test]
    fn messages_get_fresh_ids_and_increasing_timestamps() {
        let signal = TeamSignal::Threat {
            level: ThreatLevel::Critical,
        };
        let participant = Uuid::new_v4();
        let first = TeamMessage::new(signal, Seat::AWhite, participant);
        let second = TeamMessage::new(signal, Seat::AWhite, participant);
        assert_ne!(first.id, second.id);
        assert!(second.timestamp_ms > first.timestamp_ms);
        assert_eq!(first.team(), Team::A);
    }
}
