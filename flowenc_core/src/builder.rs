//! Builder for `VirtualEncoder`.
//!
//! Sensor driver, outputs and calibration are required; everything else has
//! a default. `try_build()` reports missing or invalid pieces as a typed
//! `BuildError` wrapped in an `eyre::Report`.

use std::time::Duration;

use flowenc_traits::{Clock, EncoderOutputs, MonotonicClock, SensorDriver};

use crate::accumulator::{Axis, DistanceAccumulator};
use crate::calibration::Calibration;
use crate::encoder::{PulseTotals, ShutdownPolicy, VirtualEncoder};
use crate::error::{BuildError, Result};
use crate::quadrature::QuadratureEmitter;
use crate::sampler::{MotionSampler, RetryPolicy};
use crate::snapshot::SnapshotPublisher;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);
const DEFAULT_BURST_WARN_PULSES: u32 = 64;

pub struct VirtualEncoderBuilder<D, P, C> {
    sensor: Option<D>,
    outputs: Option<P>,
    calibration: Option<Calibration>,
    axis: Axis,
    read_timeout: Duration,
    retry: RetryPolicy,
    shutdown: ShutdownPolicy,
    burst_warn_pulses: u32,
    publisher: Option<SnapshotPublisher>,
    clock: C,
}

impl<D, P> Default for VirtualEncoderBuilder<D, P, MonotonicClock> {
    fn default() -> Self {
        Self {
            sensor: None,
            outputs: None,
            calibration: None,
            axis: Axis::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry: RetryPolicy::default(),
            shutdown: ShutdownPolicy::default(),
            burst_warn_pulses: DEFAULT_BURST_WARN_PULSES,
            publisher: None,
            clock: MonotonicClock::new(),
        }
    }
}

impl<D: SensorDriver, P: EncoderOutputs> VirtualEncoder<D, P, MonotonicClock> {
    /// Start building an encoder on the real monotonic clock.
    pub fn builder() -> VirtualEncoderBuilder<D, P, MonotonicClock> {
        VirtualEncoderBuilder::default()
    }
}

impl<D: SensorDriver, P: EncoderOutputs, C: Clock> VirtualEncoderBuilder<D, P, C> {
    pub fn with_sensor(mut self, driver: D) -> Self {
        self.sensor = Some(driver);
        self
    }

    pub fn with_outputs(mut self, outputs: P) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown = policy;
        self
    }

    pub fn with_burst_warn_pulses(mut self, n: u32) -> Self {
        self.burst_warn_pulses = n;
        self
    }

    /// Publish a snapshot after every cycle.
    pub fn with_publisher(mut self, publisher: SnapshotPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Swap the clock used for read timing, backoff and loop pacing.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> VirtualEncoderBuilder<D, P, C2> {
        VirtualEncoderBuilder {
            sensor: self.sensor,
            outputs: self.outputs,
            calibration: self.calibration,
            axis: self.axis,
            read_timeout: self.read_timeout,
            retry: self.retry,
            shutdown: self.shutdown,
            burst_warn_pulses: self.burst_warn_pulses,
            publisher: self.publisher,
            clock,
        }
    }

    /// Apply every loop setting from a validated config file.
    pub fn with_config(self, cfg: &flowenc_config::Config) -> Result<Self> {
        let calibration = Calibration::try_from(cfg).map_err(eyre::Report::new)?;
        Ok(self
            .with_calibration(calibration)
            .with_axis(cfg.encoder.projection_axis.into())
            .with_read_timeout(Duration::from_millis(cfg.sensor.read_timeout_ms))
            .with_retry((&cfg.recovery).into())
            .with_shutdown(cfg.shutdown.pins.into())
            .with_burst_warn_pulses(cfg.encoder.burst_warn_pulses))
    }

    /// Fallible build; reports the first missing or invalid piece.
    pub fn try_build(self) -> Result<VirtualEncoder<D, P, C>> {
        let driver = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let mut outputs = self
            .outputs
            .ok_or_else(|| eyre::Report::new(BuildError::MissingOutputs))?;
        let calibration = self
            .calibration
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCalibration))?;

        if self.read_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "read timeout must be > 0",
            )));
        }
        if self.retry.initial.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "retry backoff must be > 0",
            )));
        }
        if self.retry.max < self.retry.initial {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "retry max backoff must be >= initial backoff",
            )));
        }
        if self.burst_warn_pulses == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "burst warning threshold must be >= 1",
            )));
        }

        let emitter = QuadratureEmitter::new(calibration.pulses_per_rev());
        emitter.drive_all(&mut outputs);

        tracing::debug!(
            pulses_per_rev = calibration.pulses_per_rev(),
            mm_per_pulse = calibration.mm_per_pulse(),
            pixel_to_mm = calibration.pixel_to_mm(),
            axis = ?self.axis,
            "virtual encoder built"
        );

        Ok(VirtualEncoder {
            sampler: MotionSampler::new(driver, self.clock, self.retry, self.read_timeout),
            accumulator: DistanceAccumulator::new(calibration.pixel_to_mm(), self.axis),
            emitter,
            outputs,
            calibration,
            burst_warn_pulses: u64::from(self.burst_warn_pulses),
            shutdown: self.shutdown,
            publisher: self.publisher,
            cycles: 0,
            totals: PulseTotals::default(),
        })
    }
}
