//! Calibration constants fixed for the lifetime of the encoder loop.

use crate::error::EncoderError;

/// Optical-flow scale per millimetre of mounting height (mm travelled per
/// pixel, per mm of height) for the PMW3901 lens.
pub const PIXEL_TO_MM_PER_MM_HEIGHT: f64 = 0.0017;

/// Immutable scale factors: pixels → mm, and mm → encoder pulses.
///
/// Construction validates everything; there is no clamping. A bad value is a
/// `EncoderError::Config` that must stop the loop from starting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pixel_to_mm: f64,
    mm_per_pulse: f64,
    pulses_per_rev: u32,
}

impl Calibration {
    pub fn new(pixel_to_mm: f64, mm_per_pulse: f64, pulses_per_rev: u32) -> Result<Self, EncoderError> {
        if !(pixel_to_mm.is_finite() && pixel_to_mm > 0.0) {
            return Err(EncoderError::Config(format!(
                "pixel_to_mm must be finite and > 0, got {pixel_to_mm}"
            )));
        }
        if !(mm_per_pulse.is_finite() && mm_per_pulse > 0.0) {
            return Err(EncoderError::Config(format!(
                "mm_per_pulse must be finite and > 0, got {mm_per_pulse}"
            )));
        }
        if pulses_per_rev == 0 {
            return Err(EncoderError::Config("pulses_per_rev must be >= 1".into()));
        }
        Ok(Self {
            pixel_to_mm,
            mm_per_pulse,
            pulses_per_rev,
        })
    }

    /// Derive the scales from mounting height and virtual wheel geometry.
    pub fn from_geometry(
        sensor_height_mm: f64,
        mm_per_rev: f64,
        pulses_per_rev: u32,
    ) -> Result<Self, EncoderError> {
        if !(sensor_height_mm.is_finite() && sensor_height_mm > 0.0) {
            return Err(EncoderError::Config(format!(
                "sensor height must be finite and > 0, got {sensor_height_mm}"
            )));
        }
        if pulses_per_rev == 0 {
            return Err(EncoderError::Config("pulses_per_rev must be >= 1".into()));
        }
        Self::new(
            PIXEL_TO_MM_PER_MM_HEIGHT * sensor_height_mm,
            mm_per_rev / f64::from(pulses_per_rev),
            pulses_per_rev,
        )
    }

    /// Replace the height-derived pixel scale with an empirically fitted one.
    pub fn with_pixel_to_mm(self, pixel_to_mm: f64) -> Result<Self, EncoderError> {
        Self::new(pixel_to_mm, self.mm_per_pulse, self.pulses_per_rev)
    }

    #[inline]
    pub fn pixel_to_mm(&self) -> f64 {
        self.pixel_to_mm
    }

    #[inline]
    pub fn mm_per_pulse(&self) -> f64 {
        self.mm_per_pulse
    }

    #[inline]
    pub fn pulses_per_rev(&self) -> u32 {
        self.pulses_per_rev
    }

    /// Linear travel of one virtual revolution.
    pub fn mm_per_rev(&self) -> f64 {
        self.mm_per_pulse * f64::from(self.pulses_per_rev)
    }
}
