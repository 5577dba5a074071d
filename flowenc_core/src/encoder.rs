//! The virtual encoder: sampler → accumulator → scheduler → emitter → pins.

use flowenc_traits::{Clock, EncoderOutputs, SensorDriver};

use crate::accumulator::DistanceAccumulator;
use crate::calibration::Calibration;
use crate::quadrature::{Direction, EncoderSnapshot, QuadratureEmitter};
use crate::sampler::{MotionSampler, SampleOutcome, SamplerStats, SensorPhase};
use crate::snapshot::{Snapshot, SnapshotPublisher};
use crate::status::CycleStatus;

/// A single cycle never emits more than this many times the burst warning
/// threshold; anything larger is treated as corrupt and dropped.
const BURST_LIMIT_FACTOR: u64 = 1_000_000;

/// What happens to A/B/Z when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Leave the last driven levels in place.
    #[default]
    Hold,
    /// Drive every output low.
    Low,
}

/// Running totals since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseTotals {
    pub forward: u64,
    pub backward: u64,
    /// Cycles whose read failed.
    pub faults: u64,
    /// Largest burst drained in a single cycle.
    pub max_burst: u64,
}

pub struct VirtualEncoder<D: SensorDriver, P: EncoderOutputs, C: Clock> {
    pub(crate) sampler: MotionSampler<D, C>,
    pub(crate) accumulator: DistanceAccumulator,
    pub(crate) emitter: QuadratureEmitter,
    pub(crate) outputs: P,
    pub(crate) calibration: Calibration,
    pub(crate) burst_warn_pulses: u64,
    pub(crate) shutdown: ShutdownPolicy,
    pub(crate) publisher: Option<SnapshotPublisher>,
    pub(crate) cycles: u64,
    pub(crate) totals: PulseTotals,
}

impl<D: SensorDriver, P: EncoderOutputs, C: Clock> core::fmt::Debug for VirtualEncoder<D, P, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtualEncoder")
            .field("position", &self.emitter.position())
            .field("state", &self.emitter.state().index())
            .field("residual_mm", &self.accumulator.residual())
            .field("phase", &self.sampler.phase())
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl<D: SensorDriver, P: EncoderOutputs, C: Clock> VirtualEncoder<D, P, C> {
    /// One control-loop iteration.
    ///
    /// A failed or skipped sample leaves position, state and residual exactly
    /// as they were.
    pub fn cycle(&mut self) -> CycleStatus {
        let status = match self.sampler.sample() {
            SampleOutcome::Motion(m) => {
                self.accumulator.integrate(m);
                let drain = self.accumulator.drain_bounded(
                    self.calibration.mm_per_pulse(),
                    self.burst_warn_pulses.saturating_mul(BURST_LIMIT_FACTOR),
                );
                if drain.pulses > self.burst_warn_pulses {
                    tracing::warn!(
                        pulses = drain.pulses,
                        dx = m.dx,
                        dy = m.dy,
                        "large pulse burst in one cycle"
                    );
                }
                for dir in drain.steps() {
                    self.emitter.step(dir, &mut self.outputs);
                }
                match drain.direction {
                    Some(Direction::Forward) => self.totals.forward += drain.pulses,
                    Some(Direction::Backward) => self.totals.backward += drain.pulses,
                    None => {}
                }
                self.totals.max_burst = self.totals.max_burst.max(drain.pulses);
                if drain.pulses > 0 {
                    tracing::trace!(
                        pulses = drain.pulses,
                        position = self.emitter.position(),
                        state = self.emitter.state().index(),
                        "pulses emitted"
                    );
                }
                CycleStatus::Sampled {
                    pulses: drain.pulses,
                    direction: drain.direction,
                }
            }
            SampleOutcome::BackingOff | SampleOutcome::InitFailed(_) => CycleStatus::Acquiring,
            SampleOutcome::ReadFailed(e) => {
                self.totals.faults += 1;
                CycleStatus::Faulted(e)
            }
        };
        self.cycles += 1;
        if let Some(p) = &self.publisher {
            p.publish(self.snapshot());
        }
        status
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            encoder: self.emitter.snapshot(),
            residual_mm: self.accumulator.residual(),
            cycles: self.cycles,
            phase: self.sampler.phase(),
        }
    }

    /// Apply the configured shutdown policy to the outputs.
    pub fn apply_shutdown(&mut self) {
        match self.shutdown {
            ShutdownPolicy::Hold => {
                tracing::info!(position = self.emitter.position(), "holding encoder outputs");
            }
            ShutdownPolicy::Low => {
                self.emitter.release(&mut self.outputs);
                tracing::info!(position = self.emitter.position(), "encoder outputs driven low");
            }
        }
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.emitter.position()
    }

    #[inline]
    pub fn residual_mm(&self) -> f64 {
        self.accumulator.residual()
    }

    pub fn encoder_snapshot(&self) -> EncoderSnapshot {
        self.emitter.snapshot()
    }

    pub fn sensor_phase(&self) -> SensorPhase {
        self.sampler.phase()
    }

    pub fn sampler_stats(&self) -> SamplerStats {
        self.sampler.stats()
    }

    pub fn totals(&self) -> PulseTotals {
        self.totals
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.shutdown
    }

    pub fn outputs(&self) -> &P {
        &self.outputs
    }

    pub fn driver(&self) -> &D {
        self.sampler.driver()
    }

    pub fn clock(&self) -> &C {
        self.sampler.clock()
    }
}
