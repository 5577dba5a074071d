//! Fixed-period control loop around `VirtualEncoder::cycle`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use flowenc_traits::{Clock, EncoderOutputs, SensorDriver};

use crate::encoder::{PulseTotals, VirtualEncoder};
use crate::quadrature::EncoderSnapshot;
use crate::sampler::SamplerStats;
use crate::stats::LoopStats;
use crate::status::CycleStatus;
use crate::util::saturating_us;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Target cycle period.
    pub period: Duration,
    /// Stop after this many cycles (None = until shutdown).
    pub max_cycles: Option<u64>,
    /// Collect per-cycle timing statistics.
    pub collect_stats: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_micros(1000),
            max_cycles: None,
            collect_stats: false,
        }
    }
}

/// Final state reported when the loop exits.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub cycles: u64,
    pub elapsed: Duration,
    pub encoder: EncoderSnapshot,
    pub residual_mm: f64,
    pub totals: PulseTotals,
    pub sampler: SamplerStats,
    pub loop_stats: Option<LoopStats>,
}

impl<D: SensorDriver, P: EncoderOutputs, C: Clock> VirtualEncoder<D, P, C> {
    /// Run cycles on a fixed period until `shutdown` is set or `max_cycles` is
    /// reached, then apply the shutdown policy.
    ///
    /// The flag is checked once per cycle boundary. Deadlines advance by one
    /// period per cycle; after an overrun the schedule restarts from now
    /// instead of bursting to catch up.
    pub fn run(&mut self, shutdown: &AtomicBool, opts: &RunOptions) -> RunSummary {
        let period = opts.period.max(Duration::from_micros(1));
        let started = self.clock().now();
        let first_cycle = self.cycles;
        let mut stats = opts.collect_stats.then(LoopStats::new);
        let mut deadline = started + period;

        tracing::info!(
            period_us = saturating_us(period),
            max_cycles = ?opts.max_cycles,
            "encoder loop started"
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown requested");
                break;
            }
            if opts
                .max_cycles
                .is_some_and(|n| self.cycles - first_cycle >= n)
            {
                break;
            }

            let cycle_start = self.clock().now();
            if let CycleStatus::Faulted(e) = self.cycle() {
                tracing::debug!(error = %e, cycle = self.cycles, "cycle discarded");
            }
            let now = self.clock().now();
            let overran = now > deadline;
            if let Some(s) = stats.as_mut() {
                s.record(saturating_us(now.saturating_duration_since(cycle_start)), overran);
            }
            deadline = self.next_deadline(deadline, now, period);
        }

        self.apply_shutdown();
        let summary = RunSummary {
            cycles: self.cycles - first_cycle,
            elapsed: self.clock().now().saturating_duration_since(started),
            encoder: self.encoder_snapshot(),
            residual_mm: self.residual_mm(),
            totals: self.totals(),
            sampler: self.sampler_stats(),
            loop_stats: stats,
        };
        tracing::info!(
            cycles = summary.cycles,
            position = summary.encoder.position,
            residual_mm = summary.residual_mm,
            faults = summary.totals.faults,
            "encoder loop stopped"
        );
        summary
    }

    fn next_deadline(&self, deadline: Instant, now: Instant, period: Duration) -> Instant {
        if now < deadline {
            self.clock().sleep(deadline - now);
            deadline + period
        } else {
            now + period
        }
    }
}
