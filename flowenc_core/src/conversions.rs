//! `From` implementations bridging `flowenc_config` types to `flowenc_core` types.

use std::time::Duration;

use crate::accumulator::Axis;
use crate::calibration::Calibration;
use crate::encoder::ShutdownPolicy;
use crate::error::EncoderError;
use crate::sampler::RetryPolicy;

// ── Axis ─────────────────────────────────────────────────────────────────────

impl From<flowenc_config::ProjectionAxis> for Axis {
    fn from(a: flowenc_config::ProjectionAxis) -> Self {
        use flowenc_config::ProjectionAxis as P;
        match a {
            P::X => Axis::X,
            P::Y => Axis::Y,
            P::NegX => Axis::NegX,
            P::NegY => Axis::NegY,
            P::Magnitude => Axis::Magnitude,
        }
    }
}

// ── ShutdownPolicy ───────────────────────────────────────────────────────────

impl From<flowenc_config::ShutdownPins> for ShutdownPolicy {
    fn from(p: flowenc_config::ShutdownPins) -> Self {
        match p {
            flowenc_config::ShutdownPins::Hold => ShutdownPolicy::Hold,
            flowenc_config::ShutdownPins::Low => ShutdownPolicy::Low,
        }
    }
}

// ── RetryPolicy ──────────────────────────────────────────────────────────────

impl From<&flowenc_config::RecoveryCfg> for RetryPolicy {
    fn from(c: &flowenc_config::RecoveryCfg) -> Self {
        Self {
            initial: Duration::from_millis(c.backoff_ms),
            max: Duration::from_millis(c.max_backoff_ms.max(c.backoff_ms)),
        }
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl TryFrom<&flowenc_config::Config> for Calibration {
    type Error = EncoderError;

    fn try_from(c: &flowenc_config::Config) -> Result<Self, Self::Error> {
        Calibration::from_geometry(c.sensor.height_mm, c.encoder.mm_per_rev, c.encoder.pulses_per_rev)
    }
}
