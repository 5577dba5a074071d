//! Pulse scheduling: turn an accumulated residual into whole unit steps.

use crate::quadrature::Direction;

/// Result of draining the residual for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drain {
    pub pulses: u64,
    /// `None` when no pulse is due.
    pub direction: Option<Direction>,
    /// Residual left after the drain; `|residual| < mm_per_pulse`.
    pub residual: f64,
}

impl Drain {
    /// Unit steps in emission order, all in the same direction.
    pub fn steps(&self) -> PulseBurst {
        PulseBurst {
            remaining: if self.direction.is_some() { self.pulses } else { 0 },
            direction: self.direction.unwrap_or(Direction::Forward),
        }
    }
}

/// Iterator over one cycle's unit steps.
#[derive(Debug, Clone)]
pub struct PulseBurst {
    remaining: u64,
    direction: Direction,
}

impl Iterator for PulseBurst {
    type Item = Direction;

    fn next(&mut self) -> Option<Direction> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.direction)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

/// Largest burst `drain` will emit from a single residual.
pub const MAX_DRAIN_PULSES: u64 = 1 << 32;

/// Drain every whole `mm_per_pulse` from `residual`, at most
/// `MAX_DRAIN_PULSES` at a time.
///
/// Positive residual yields forward pulses, negative yields backward. The
/// count comes from one division with fix-up passes, so large bursts cost
/// the same as small ones.
pub fn drain(residual: f64, mm_per_pulse: f64) -> Drain {
    drain_bounded(residual, mm_per_pulse, MAX_DRAIN_PULSES)
}

/// `drain` with an explicit burst limit.
///
/// A residual that is non-finite, or worth more than `max_pulses` pulses, is
/// discarded: zero pulses and a residual of 0.0. Emitting it would stall the
/// loop for longer than any real sensor reading can justify.
pub fn drain_bounded(residual: f64, mm_per_pulse: f64, max_pulses: u64) -> Drain {
    debug_assert!(mm_per_pulse.is_finite() && mm_per_pulse > 0.0);

    let discarded = Drain {
        pulses: 0,
        direction: None,
        residual: 0.0,
    };
    if !residual.is_finite() {
        tracing::warn!(residual, "non-finite residual discarded");
        return discarded;
    }

    let magnitude = residual.abs();
    #[allow(clippy::cast_precision_loss)]
    let limit = max_pulses as f64 + 1.0;
    if magnitude / mm_per_pulse > limit {
        tracing::warn!(residual, mm_per_pulse, max_pulses, "oversized residual discarded");
        return discarded;
    }
    if magnitude < mm_per_pulse {
        return Drain {
            pulses: 0,
            direction: None,
            residual,
        };
    }

    let mut pulses = (magnitude / mm_per_pulse).floor();
    let mut rest = magnitude - pulses * mm_per_pulse;
    // Division rounding can leave the remainder one unit off either way.
    while rest >= mm_per_pulse {
        rest -= mm_per_pulse;
        pulses += 1.0;
    }
    while rest < 0.0 && pulses > 0.0 {
        rest += mm_per_pulse;
        pulses -= 1.0;
    }

    let (direction, sign) = if residual > 0.0 {
        (Direction::Forward, 1.0)
    } else {
        (Direction::Backward, -1.0)
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pulses = pulses as u64;
    if pulses > max_pulses {
        tracing::warn!(residual, mm_per_pulse, max_pulses, "oversized residual discarded");
        return discarded;
    }
    Drain {
        pulses,
        direction: (pulses > 0).then_some(direction),
        residual: sign * rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_untouched() {
        let d = drain(0.49, 0.5);
        assert_eq!(d.pulses, 0);
        assert_eq!(d.direction, None);
        assert_eq!(d.residual, 0.49);
        assert_eq!(d.steps().count(), 0);
    }

    #[test]
    fn exact_multiple_leaves_zero() {
        let d = drain(-1.5, 0.5);
        assert_eq!(d.pulses, 3);
        assert_eq!(d.direction, Some(Direction::Backward));
        assert!(d.residual.abs() < 1e-12);
    }

    #[test]
    fn non_finite_residual_is_discarded() {
        for r in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let d = drain(r, 0.5);
            assert_eq!(d.pulses, 0);
            assert_eq!(d.residual, 0.0);
        }
    }

    #[test]
    fn oversized_residual_is_discarded_not_emitted() {
        let d = drain(1e300, 1e-3);
        assert_eq!(d.pulses, 0);
        assert_eq!(d.direction, None);
        assert_eq!(d.residual, 0.0);
        assert_eq!(d.steps().count(), 0);
    }

    #[test]
    fn burst_limit_is_inclusive() {
        let d = drain_bounded(-5.2, 0.5, 10);
        assert_eq!(d.pulses, 10);
        assert_eq!(d.direction, Some(Direction::Backward));
        assert!((d.residual + 0.2).abs() < 1e-9);

        let d = drain_bounded(5.6, 0.5, 10);
        assert_eq!(d.pulses, 0);
        assert_eq!(d.residual, 0.0);
    }

    #[test]
    fn steps_repeat_direction() {
        let d = drain(2.2, 0.5);
        let steps: Vec<_> = d.steps().collect();
        assert_eq!(steps, vec![Direction::Forward; 4]);
    }
}
