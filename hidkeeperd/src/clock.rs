//! Monotonic clock facility.

use hidkeeper_common::DaemonError;
use nix::time::{clock_gettime, ClockId};

/// Probe the monotonic clock backing the condition-variable waits used
/// throughout the daemon. Failure here is fatal at startup: timed waits
/// against wall-clock time would misbehave across clock adjustments.
pub fn init_monotonic() -> Result<(), DaemonError> {
    clock_gettime(ClockId::CLOCK_MONOTONIC)
        .map(|_| ())
        .map_err(|e| DaemonError::MonotonicClock(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_is_available() {
        assert!(init_monotonic().is_ok());
    }
}
