pub mod error;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod pmw3901;

use flowenc_traits::{EncoderOutputs, EncoderPin, Level, Motion, MotionSensor, SensorDriver};
use std::cell::Cell;
use std::rc::Rc;

use crate::error::HwError;

/// Behaviour of the simulated optical-flow sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationProfile {
    /// Pixels reported on X for every successful read.
    pub dx_per_read: i32,
    /// Pixels reported on Y for every successful read.
    pub dy_per_read: i32,
    /// Flip the direction of travel every N reads (0 = never).
    pub reverse_every: u32,
    /// Number of initial `initialize` calls that fail.
    pub fail_init_attempts: u32,
    /// Every N-th read fails (0 = never).
    pub fail_every: u32,
}

/// Simulated sensor driver; the read counter survives re-initialisation so
/// fault and reversal patterns continue across recoveries.
pub struct SimulatedSensorDriver {
    profile: SimulationProfile,
    init_attempts: u32,
    reads: Rc<Cell<u64>>,
}

impl SimulatedSensorDriver {
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            profile,
            init_attempts: 0,
            reads: Rc::new(Cell::new(0)),
        }
    }

    /// Reads attempted so far, including failed ones.
    pub fn reads(&self) -> u64 {
        self.reads.get()
    }
}

impl SensorDriver for SimulatedSensorDriver {
    type Sensor = SimulatedSensor;

    fn initialize(&mut self) -> Result<SimulatedSensor, Box<dyn std::error::Error + Send + Sync>> {
        if self.init_attempts < self.profile.fail_init_attempts {
            self.init_attempts += 1;
            tracing::debug!(attempt = self.init_attempts, "simulated sensor init failure");
            return Err(Box::new(HwError::Simulated("sensor not responding")));
        }
        self.init_attempts = self.init_attempts.saturating_add(1);
        Ok(SimulatedSensor {
            profile: self.profile,
            reads: self.reads.clone(),
        })
    }
}

pub struct SimulatedSensor {
    profile: SimulationProfile,
    reads: Rc<Cell<u64>>,
}

impl MotionSensor for SimulatedSensor {
    fn read_motion(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<Motion, Box<dyn std::error::Error + Send + Sync>> {
        let n = self.reads.get() + 1;
        self.reads.set(n);
        let p = &self.profile;
        if p.fail_every > 0 && n % u64::from(p.fail_every) == 0 {
            return Err(Box::new(HwError::Simulated("read fault")));
        }
        let reversed = p.reverse_every > 0 && ((n - 1) / u64::from(p.reverse_every)) % 2 == 1;
        let sign = if reversed { -1 } else { 1 };
        let m = Motion::new(p.dx_per_read * sign, p.dy_per_read * sign);
        tracing::trace!(dx = m.dx, dy = m.dy, read = n, "simulated motion");
        Ok(m)
    }
}

/// Simulated encoder outputs: keeps the current levels and a write counter.
#[derive(Debug, Default)]
pub struct SimulatedPins {
    levels: [Level; 3],
    writes: u64,
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, pin: EncoderPin) -> Level {
        self.levels[slot(pin)]
    }

    /// Total number of `set_level` calls received.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

fn slot(pin: EncoderPin) -> usize {
    match pin {
        EncoderPin::A => 0,
        EncoderPin::B => 1,
        EncoderPin::Z => 2,
    }
}

impl EncoderOutputs for SimulatedPins {
    fn set_level(&mut self, pin: EncoderPin, level: Level) {
        self.writes += 1;
        let s = &mut self.levels[slot(pin)];
        if *s != level {
            tracing::trace!(?pin, ?level, "simulated pin");
        }
        *s = level;
    }
}
