//! Streaming loop timing statistics.

/// Per-cycle execution time, accumulated without storing samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    count: u64,
    mean: f64,
    m2: f64,
    min_us: u64,
    max_us: u64,
    overruns: u64,
}

impl LoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one cycle's busy time and whether it missed its deadline.
    pub fn record(&mut self, busy_us: u64, overran: bool) {
        self.count += 1;
        if self.count == 1 {
            self.min_us = busy_us;
            self.max_us = busy_us;
        } else {
            self.min_us = self.min_us.min(busy_us);
            self.max_us = self.max_us.max(busy_us);
        }
        let x = busy_us as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        if overran {
            self.overruns += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean_us(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation; 0 with fewer than two cycles.
    pub fn stdev_us(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn min_us(&self) -> u64 {
        self.min_us
    }

    pub fn max_us(&self) -> u64 {
        self.max_us
    }

    /// Cycles that finished after their deadline.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}
