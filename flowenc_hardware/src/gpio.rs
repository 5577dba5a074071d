use flowenc_traits::{EncoderOutputs, EncoderPin, Level};
use rppal::gpio::{Gpio, OutputPin};

use crate::error::{HwError, Result};

/// A/B/Z encoder outputs on Raspberry Pi GPIO (BCM numbering).
pub struct GpioEncoderPins {
    a: OutputPin,
    b: OutputPin,
    z: OutputPin,
}

impl GpioEncoderPins {
    /// Claim the three pins as outputs, driven low.
    ///
    /// With `release_on_drop == false` the pins keep their last level after
    /// the process drops them instead of reverting to their previous mode.
    pub fn try_new(a: u8, b: u8, z: u8, release_on_drop: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let claim = |n: u8| -> Result<OutputPin> {
            let mut pin = gpio
                .get(n)
                .map_err(|e| HwError::Gpio(format!("open encoder pin {n}: {e}")))?
                .into_output_low();
            pin.set_reset_on_drop(release_on_drop);
            Ok(pin)
        };
        Ok(Self {
            a: claim(a)?,
            b: claim(b)?,
            z: claim(z)?,
        })
    }
}

impl EncoderOutputs for GpioEncoderPins {
    fn set_level(&mut self, pin: EncoderPin, level: Level) {
        let out = match pin {
            EncoderPin::A => &mut self.a,
            EncoderPin::B => &mut self.b,
            EncoderPin::Z => &mut self.z,
        };
        if level.is_high() {
            out.set_high();
        } else {
            out.set_low();
        }
    }
}
