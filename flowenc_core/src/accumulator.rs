//! Pixel-to-distance integration along the configured axis.

use flowenc_traits::Motion;

use crate::scheduler::{self, Drain};

/// Component of a motion sample that counts as travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    X,
    #[default]
    Y,
    NegX,
    NegY,
    /// Euclidean length; direction-agnostic, never negative.
    Magnitude,
}

impl Axis {
    /// Project a pixel sample onto this axis, still in pixels.
    #[inline]
    pub fn project(self, m: Motion) -> f64 {
        let dx = f64::from(m.dx);
        let dy = f64::from(m.dy);
        match self {
            Axis::X => dx,
            Axis::Y => dy,
            Axis::NegX => -dx,
            Axis::NegY => -dy,
            Axis::Magnitude => dx.hypot(dy),
        }
    }
}

/// Signed sub-pulse distance carried between cycles (mm).
#[derive(Debug, Clone)]
pub struct DistanceAccumulator {
    pixel_to_mm: f64,
    axis: Axis,
    residual_mm: f64,
}

impl DistanceAccumulator {
    pub fn new(pixel_to_mm: f64, axis: Axis) -> Self {
        Self {
            pixel_to_mm,
            axis,
            residual_mm: 0.0,
        }
    }

    /// Add one sample to the residual and return the millimetres it contributed.
    pub fn integrate(&mut self, m: Motion) -> f64 {
        let mm = self.axis.project(m) * self.pixel_to_mm;
        self.residual_mm += mm;
        mm
    }

    /// Drain whole pulses, keeping the remainder for the next cycle.
    pub fn drain(&mut self, mm_per_pulse: f64) -> Drain {
        self.drain_bounded(mm_per_pulse, scheduler::MAX_DRAIN_PULSES)
    }

    /// Drain at most `max_pulses`; a larger residual is discarded.
    pub fn drain_bounded(&mut self, mm_per_pulse: f64, max_pulses: u64) -> Drain {
        let d = scheduler::drain_bounded(self.residual_mm, mm_per_pulse, max_pulses);
        self.residual_mm = d.residual;
        d
    }

    #[inline]
    pub fn residual(&self) -> f64 {
        self.residual_mm
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }
}
