use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Call `attempt` until it yields a value, an error, or the timeout expires.
///
/// `Ok(None)` from `attempt` means "not ready yet"; the helper sleeps for
/// `poll_interval` between attempts instead of spinning. The first attempt is
/// always made, even with a zero timeout.
pub fn poll_until<T>(
    mut attempt: impl FnMut() -> Result<Option<T>>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(v) = attempt()? {
            return Ok(v);
        }
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
}
