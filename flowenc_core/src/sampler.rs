//! Sensor acquisition with failure recovery.
//!
//! `MotionSampler` owns the sensor driver and at most one live sensor handle.
//! It walks `Init → Running → Faulted → Init`:
//!
//! - Init: call `initialize()`. On failure stay in Init and retry after a
//!   doubling backoff, forever.
//! - Running: one `read_motion(timeout)` per call. A failure (or a read that
//!   overran the timeout) drops the handle and moves to Faulted.
//! - Faulted: wait one initial backoff, then re-enter Init for a full
//!   re-acquisition.
//!
//! The sampler never sleeps. While a backoff is pending `sample()` returns
//! `SampleOutcome::BackingOff` immediately so the loop keeps its cadence.

use std::time::{Duration, Instant};

use flowenc_traits::{Clock, Motion, MotionSensor, SensorDriver};

use crate::error::EncoderError;
use crate::hw_error::map_hw_error;
use crate::util::saturating_ms;

/// Bounded exponential backoff between (re-)initialisation attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Fixed interval, no growth.
    pub fn fixed(d: Duration) -> Self {
        Self { initial: d, max: d }
    }

    /// Delay after the n-th consecutive failure (1-based).
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let shift = consecutive_failures.saturating_sub(1).min(31);
        let factor = 1u32 << shift;
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max.max(self.initial))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPhase {
    Init,
    Running,
    Faulted,
}

/// What one `sample()` call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// A complete reading; integrate it.
    Motion(Motion),
    /// Waiting out a backoff; nothing was attempted.
    BackingOff,
    /// `initialize()` failed; retry is scheduled.
    InitFailed(EncoderError),
    /// The read failed; the handle was dropped and re-init is scheduled.
    ReadFailed(EncoderError),
}

/// Counters reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub reads_ok: u64,
    pub read_failures: u64,
    pub init_attempts: u64,
    pub init_failures: u64,
    /// Successful initialisations after a read fault.
    pub recoveries: u64,
}

pub struct MotionSampler<D: SensorDriver, C: Clock> {
    driver: D,
    sensor: Option<D::Sensor>,
    phase: SensorPhase,
    clock: C,
    retry: RetryPolicy,
    read_timeout: Duration,
    next_attempt: Option<Instant>,
    consecutive_init_failures: u32,
    recovering: bool,
    stats: SamplerStats,
}

impl<D: SensorDriver, C: Clock> MotionSampler<D, C> {
    pub fn new(driver: D, clock: C, retry: RetryPolicy, read_timeout: Duration) -> Self {
        Self {
            driver,
            sensor: None,
            phase: SensorPhase::Init,
            clock,
            retry,
            read_timeout,
            next_attempt: None,
            consecutive_init_failures: 0,
            recovering: false,
            stats: SamplerStats::default(),
        }
    }

    /// Advance the state machine by one cycle.
    pub fn sample(&mut self) -> SampleOutcome {
        let now = self.clock.now();
        if let Some(at) = self.next_attempt {
            if now < at {
                return SampleOutcome::BackingOff;
            }
            self.next_attempt = None;
        }

        if self.phase == SensorPhase::Faulted {
            tracing::debug!("re-acquiring sensor");
            self.phase = SensorPhase::Init;
        }

        if self.phase == SensorPhase::Init {
            if let Err(e) = self.try_initialize(now) {
                return SampleOutcome::InitFailed(e);
            }
        }

        self.read()
    }

    fn try_initialize(&mut self, now: Instant) -> Result<(), EncoderError> {
        self.stats.init_attempts += 1;
        match self.driver.initialize() {
            Ok(sensor) => {
                self.sensor = Some(sensor);
                self.phase = SensorPhase::Running;
                self.consecutive_init_failures = 0;
                if self.recovering {
                    self.stats.recoveries += 1;
                    self.recovering = false;
                    tracing::info!(recoveries = self.stats.recoveries, "sensor recovered");
                } else {
                    tracing::info!("sensor initialised");
                }
                Ok(())
            }
            Err(e) => {
                self.stats.init_failures += 1;
                self.consecutive_init_failures = self.consecutive_init_failures.saturating_add(1);
                let delay = self.retry.delay_for(self.consecutive_init_failures);
                self.next_attempt = Some(now + delay);
                let err = EncoderError::SensorInit(e.to_string());
                tracing::warn!(
                    error = %err,
                    attempt = self.consecutive_init_failures,
                    backoff_ms = saturating_ms(delay),
                    "sensor initialisation failed"
                );
                Err(err)
            }
        }
    }

    fn read(&mut self) -> SampleOutcome {
        let Some(sensor) = self.sensor.as_mut() else {
            // Running without a handle cannot happen; recover through Init.
            self.phase = SensorPhase::Init;
            return SampleOutcome::BackingOff;
        };

        let started = self.clock.now();
        let result = sensor.read_motion(self.read_timeout);
        let elapsed = self.clock.now().saturating_duration_since(started);

        let err = match result {
            Ok(m) if elapsed <= self.read_timeout => {
                self.stats.reads_ok += 1;
                return SampleOutcome::Motion(m);
            }
            Ok(_) => EncoderError::Timeout,
            Err(e) => map_hw_error(&*e),
        };
        self.fault(err)
    }

    fn fault(&mut self, err: EncoderError) -> SampleOutcome {
        self.stats.read_failures += 1;
        self.sensor = None;
        self.phase = SensorPhase::Faulted;
        self.recovering = true;
        self.next_attempt = Some(self.clock.now() + self.retry.initial);
        tracing::error!(error = %err, "sensor read failed; re-initialising");
        SampleOutcome::ReadFailed(err)
    }

    #[inline]
    pub fn phase(&self) -> SensorPhase {
        self.phase
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let p = RetryPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(350));
        assert_eq!(p.delay_for(40), Duration::from_millis(350));
    }

    #[test]
    fn fixed_policy_never_grows() {
        let p = RetryPolicy::fixed(Duration::from_millis(500));
        assert_eq!(p.delay_for(1), p.delay_for(9));
    }
}
