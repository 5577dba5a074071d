pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Pixel-domain displacement reported by an optical-flow sensor since its previous read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Motion {
    pub dx: i32,
    pub dy: i32,
}

impl Motion {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }
}

/// The three output channels of an incremental encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderPin {
    A,
    B,
    Z,
}

impl EncoderPin {
    pub const ALL: [EncoderPin; 3] = [EncoderPin::A, EncoderPin::B, EncoderPin::Z];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    #[inline]
    pub const fn from_bool(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }

    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Factory for a motion sensor handle.
///
/// `initialize` performs full acquisition (bus open, reset, identification,
/// register setup). Dropping the returned handle releases the device, so a
/// fresh `initialize` is a complete re-acquisition.
pub trait SensorDriver {
    type Sensor: MotionSensor;

    fn initialize(&mut self) -> Result<Self::Sensor, Box<dyn std::error::Error + Send + Sync>>;
}

pub trait MotionSensor {
    /// Read accumulated motion since the last call. Must give up after `timeout`.
    fn read_motion(
        &mut self,
        timeout: Duration,
    ) -> Result<Motion, Box<dyn std::error::Error + Send + Sync>>;
}

/// Digital outputs driven by the encoder emitter. Writes are fire-and-forget.
pub trait EncoderOutputs {
    fn set_level(&mut self, pin: EncoderPin, level: Level);
}

impl<T: EncoderOutputs + ?Sized> EncoderOutputs for Box<T> {
    fn set_level(&mut self, pin: EncoderPin, level: Level) {
        (**self).set_level(pin, level);
    }
}

impl<T: MotionSensor + ?Sized> MotionSensor for Box<T> {
    fn read_motion(
        &mut self,
        timeout: Duration,
    ) -> Result<Motion, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_motion(timeout)
    }
}
