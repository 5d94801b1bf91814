use std::time::Instant;

use crate::models::seat::Seat;

/// Countdown state for one seat.
///
/// A ticking clock's current value is always computed from `remaining_ms`
/// minus the elapsed time since `ticking_since`; a stopped clock reads exactly
/// `remaining_ms`. The generation counter tags scheduled timeout deadlines so
/// a superseded deadline can be recognized and discarded when it fires.
#[derive(Debug, Clone)]
pub struct ClockState {
    remaining_ms: u64,
    ticking_since: Option<Instant>,
    generation: u64,
}

impl ClockState {
    fn new(remaining_ms: u64) -> ClockState {
        ClockState {
            remaining_ms,
            ticking_since: None,
            generation: 0,
        }
    }

    fn remaining_ms(&self, now: Instant) -> u64 {
        match self.ticking_since {
            Some(since) => {
                let elapsed = now.saturating_duration_since(since).as_millis() as u64;
                self.remaining_ms.saturating_sub(elapsed)
            }
            None => self.remaining_ms,
        }
    }
}

/// The 4 per-seat countdowns of a match.
///
/// Ticking is toggled only by the session actor as a side effect of a
/// move/drop; at most one seat per board ticks at any instant. Reaching zero
/// is reported, never enforced here; the session's deadline mechanism is the
/// only place a timeout becomes a terminal result.
#[derive(Debug, Clone)]
pub struct ClockSet {
    clocks: [ClockState; 4],
}

impl ClockSet {
    pub fn new(initial_ms: u64) -> ClockSet {
        ClockSet {
            clocks: [
                ClockState::new(initial_ms),
                ClockState::new(initial_ms),
                ClockState::new(initial_ms),
                ClockState::new(initial_ms),
            ],
        }
    }

    /// Start `seat`'s countdown. Stops the board opponent first so the
    /// one-ticking-seat-per-board invariant holds no matter the call order.
    pub fn start(&mut self, seat: Seat, now: Instant) {
        self.stop(seat.opponent(), now);
        let clock = &mut self.clocks[seat.index()];
        if clock.ticking_since.is_none() {
            clock.ticking_since = Some(now);
        }
    }

    /// Stop `seat`'s countdown, folding elapsed time into the stored value.
    pub fn stop(&mut self, seat: Seat, now: Instant) {
        let clock = &mut self.clocks[seat.index()];
        if clock.ticking_since.is_some() {
            clock.remaining_ms = clock.remaining_ms(now);
            clock.ticking_since = None;
        }
    }

    pub fn stop_all(&mut self, now: Instant) {
        for seat in Seat::ALL {
            self.stop(seat, now);
        }
    }

    pub fn is_ticking(&self, seat: Seat) -> bool {
        self.clocks[seat.index()].ticking_since.is_some()
    }

    pub fn ticking_seats(&self) -> Vec<Seat> {
        Seat::ALL
            .into_iter()
            .filter(|seat| self.is_ticking(*seat))
            .collect()
    }

    pub fn remaining_ms(&self, seat: Seat, now: Instant) -> u64 {
        self.clocks[seat.index()].remaining_ms(now)
    }

    /// All 4 clock values in [`Seat::index`] order.
    pub fn snapshot_ms(&self, now: Instant) -> [u64; 4] {
        let mut values = [0u64; 4];
        for seat in Seat::ALL {
            values[seat.index()] = self.remaining_ms(seat, now);
        }
        values
    }

    /// Credit time to a seat (per-move increment).
    pub fn add_ms(&mut self, seat: Seat, ms: u64) {
        self.clocks[seat.index()].remaining_ms += ms;
    }

    /// Invalidate any previously scheduled deadline for `seat` and return the
    /// token the replacement deadline must carry.
    pub fn bump_generation(&mut self, seat: Seat) -> u64 {
        let clock = &mut self.clocks[seat.index()];
        clock.generation += 1;
        clock.generation
    }

    pub fn generation(&self, seat: Seat) -> u64 {
        self.clocks[seat.index()].generation
    }
}
