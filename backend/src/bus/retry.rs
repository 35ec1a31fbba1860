//! Fixed-backoff retry for transient bus failures
//!
//! Registrations and sends the federation depends on are never dropped
//! because of a transient condition: the call is repeated after a fixed
//! sleep until it succeeds or fails structurally.

use crate::bus::error::BusError;
use std::time::Duration;
use tracing::warn;

/// Retry policy for bus calls
///
/// # Example
/// ```
/// use federation_manager_core_rs::bus::{BusError, RetryPolicy};
/// use std::time::Duration;
///
/// let retry = RetryPolicy::new(Duration::from_millis(1));
/// let mut failures = 2;
/// let result = retry.run("send", || {
///     if failures > 0 {
///         failures -= 1;
///         Err(BusError::ConcurrentAccess)
///     } else {
///         Ok(42)
///     }
/// });
/// assert_eq!(result, Ok(42));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Sleep between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Run `op` until it succeeds or fails with a structural error
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, BusError>
    where
        F: FnMut() -> Result<T, BusError>,
    {
        let mut attempt: u64 = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    warn!(operation, attempt, error = %err, "Transient bus failure, retrying");
                    std::thread::sleep(self.delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
