//! Quadrature state machine and A/B/Z pin emitter.
//!
//! Four Gray-coded phases, indexed by `position mod 4`:
//!
//! | state | A | B |
//! |-------|---|---|
//! | 0     | 0 | 0 |
//! | 1     | 1 | 0 |
//! | 2     | 1 | 1 |
//! | 3     | 0 | 1 |
//!
//! Forward walks 0→1→2→3→0, backward walks 0→3→2→1→0. Every step moves
//! exactly one phase, so exactly one of A/B toggles per pulse.

use flowenc_traits::{EncoderOutputs, EncoderPin, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub const fn delta(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

const PHASES: [(Level, Level); 4] = [
    (Level::Low, Level::Low),
    (Level::High, Level::Low),
    (Level::High, Level::High),
    (Level::Low, Level::High),
];

/// Current phase of the quadrature cycle, always in 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct QuadState(u8);

impl QuadState {
    /// Phase for a logical position (Euclidean modulo, so negatives wrap correctly).
    #[inline]
    pub const fn from_position(position: i64) -> Self {
        QuadState(position.rem_euclid(4) as u8)
    }

    /// Phase whose (A, B) levels match, if any.
    pub fn from_levels(a: Level, b: Level) -> Self {
        let idx = match (a, b) {
            (Level::Low, Level::Low) => 0,
            (Level::High, Level::Low) => 1,
            (Level::High, Level::High) => 2,
            (Level::Low, Level::High) => 3,
        };
        QuadState(idx)
    }

    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn levels(self) -> (Level, Level) {
        PHASES[self.0 as usize]
    }

    #[inline]
    pub const fn step(self, dir: Direction) -> Self {
        match dir {
            Direction::Forward => QuadState((self.0 + 1) % 4),
            Direction::Backward => QuadState((self.0 + 3) % 4),
        }
    }
}

/// Levels of the three encoder outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinLevels {
    pub a: Level,
    pub b: Level,
    pub z: Level,
}

impl PinLevels {
    fn for_state(state: QuadState, z: bool) -> Self {
        let (a, b) = state.levels();
        Self {
            a,
            b,
            z: Level::from_bool(z),
        }
    }

    pub fn get(&self, pin: EncoderPin) -> Level {
        match pin {
            EncoderPin::A => self.a,
            EncoderPin::B => self.b,
            EncoderPin::Z => self.z,
        }
    }
}

/// Read-only view of the emitter, safe to hand to other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSnapshot {
    pub position: i64,
    pub state: QuadState,
    pub pins: PinLevels,
    /// Number of transitions on which Z was driven high.
    pub index_pulses: u64,
}

impl EncoderSnapshot {
    /// Virtual revolution the position falls in (floor division).
    pub fn revolution(&self, pulses_per_rev: u32) -> i64 {
        self.position.div_euclid(i64::from(pulses_per_rev.max(1)))
    }
}

/// Index-pulse rule: high only when the new position starts a revolution
/// and the quadrature phase is 0 at that same instant.
#[inline]
pub fn index_high(position: i64, state: QuadState, pulses_per_rev: u32) -> bool {
    position.rem_euclid(i64::from(pulses_per_rev.max(1))) == 0 && state.index() == 0
}

/// Owns the logical position and drives A/B/Z, one phase per step.
#[derive(Debug, Clone)]
pub struct QuadratureEmitter {
    position: i64,
    state: QuadState,
    pins: PinLevels,
    pulses_per_rev: u32,
    index_pulses: u64,
}

impl QuadratureEmitter {
    pub fn new(pulses_per_rev: u32) -> Self {
        Self::starting_at(0, pulses_per_rev)
    }

    /// Emitter resumed at an arbitrary position. Z starts low; it is only
    /// raised by a step.
    pub fn starting_at(position: i64, pulses_per_rev: u32) -> Self {
        let state = QuadState::from_position(position);
        Self {
            position,
            state,
            pins: PinLevels::for_state(state, false),
            pulses_per_rev: pulses_per_rev.max(1),
            index_pulses: 0,
        }
    }

    /// Drive all three outputs to the current levels.
    pub fn drive_all<O: EncoderOutputs + ?Sized>(&self, out: &mut O) {
        for pin in EncoderPin::ALL {
            out.set_level(pin, self.pins.get(pin));
        }
    }

    /// Move one position in `dir` and write the outputs that changed.
    pub fn step<O: EncoderOutputs + ?Sized>(&mut self, dir: Direction, out: &mut O) -> PinLevels {
        let position = self.position + dir.delta();
        let state = self.state.step(dir);
        debug_assert_eq!(state, QuadState::from_position(position));
        debug_assert_eq!(
            decode_transition(self.state.levels(), state.levels()),
            Some(dir.delta() as i8)
        );
        let z = index_high(position, state, self.pulses_per_rev);
        let next = PinLevels::for_state(state, z);

        for pin in EncoderPin::ALL {
            if self.pins.get(pin) != next.get(pin) {
                out.set_level(pin, next.get(pin));
            }
        }

        if z {
            self.index_pulses += 1;
            tracing::trace!(position, "index pulse");
        }
        self.position = position;
        self.state = state;
        self.pins = next;
        next
    }

    /// Force all outputs low without moving the logical position.
    pub fn release<O: EncoderOutputs + ?Sized>(&mut self, out: &mut O) {
        self.pins = PinLevels::default();
        self.drive_all(out);
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    #[inline]
    pub fn state(&self) -> QuadState {
        self.state
    }

    #[inline]
    pub fn pins(&self) -> PinLevels {
        self.pins
    }

    pub fn snapshot(&self) -> EncoderSnapshot {
        EncoderSnapshot {
            position: self.position,
            state: self.state,
            pins: self.pins,
            index_pulses: self.index_pulses,
        }
    }
}

/// Decode one (A, B) transition the way a standard 4x quadrature counter does.
///
/// Returns `Some(+1)` / `Some(-1)` for a forward / backward step, `Some(0)`
/// when nothing changed, and `None` for an illegal two-phase jump.
pub fn decode_transition(prev: (Level, Level), next: (Level, Level)) -> Option<i8> {
    let p = QuadState::from_levels(prev.0, prev.1).index();
    let n = QuadState::from_levels(next.0, next.1).index();
    match (n + 4 - p) % 4 {
        0 => Some(0),
        1 => Some(1),
        3 => Some(-1),
        _ => None,
    }
}

/// Counter fed with observed A/B levels; reference consumer for the signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadratureDecoder {
    last: (Level, Level),
    count: i64,
    errors: u64,
}

impl QuadratureDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, a: Level, b: Level) {
        match decode_transition(self.last, (a, b)) {
            Some(d) => self.count += i64::from(d),
            None => self.errors += 1,
        }
        self.last = (a, b);
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    /// Illegal transitions seen so far.
    pub fn errors(&self) -> u64 {
        self.errors
    }
}
