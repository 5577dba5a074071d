//! Maps `Box<dyn Error>` from trait boundaries to typed `EncoderError`.
//!
//! The traits in `flowenc_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver can plug in; this module converts read failures to our typed enum,
//! with an optional feature-gated path for `flowenc_hardware::HwError`.

use crate::error::EncoderError;

/// Map a sensor read error to a typed `EncoderError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> EncoderError {
    #[cfg(feature = "hardware-errors")]
    {
        use flowenc_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => EncoderError::Timeout,
                HwError::Simulated(msg) => EncoderError::SensorRead((*msg).to_string()),
                other => EncoderError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        EncoderError::Timeout
    } else {
        EncoderError::SensorRead(s)
    }
}
