//! Per-cycle status returned from the encoder loop.

use crate::error::EncoderError;
use crate::quadrature::Direction;

/// Outcome of a single `VirtualEncoder::cycle`.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    /// A sample was integrated; `pulses` unit steps were emitted.
    Sampled {
        pulses: u64,
        direction: Option<Direction>,
    },
    /// No sensor handle yet (initialising or waiting out a backoff).
    Acquiring,
    /// The read failed this cycle; nothing was integrated.
    Faulted(EncoderError),
}

impl CycleStatus {
    pub fn pulses(&self) -> u64 {
        match self {
            CycleStatus::Sampled { pulses, .. } => *pulses,
            _ => 0,
        }
    }
}
