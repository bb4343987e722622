//! Bounded polling.

use crate::error::{Error, Result};
use std::time::Duration;

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Delay between attempts.
    pub interval: Duration,
    /// Maximum number of attempts.
    pub attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            attempts: 60,
        }
    }
}

impl WaitPolicy {
    /// Create a wait policy.
    pub fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }

    /// Upper bound on the time a wait can take.
    pub fn total(&self) -> Duration {
        self.interval * self.attempts
    }

    /// Poll `check` until it returns true.
    ///
    /// Errors from `check` abort the wait immediately. Running out of
    /// attempts yields [`Error::Timeout`] naming `what`.
    pub fn wait_for<F>(&self, what: &str, mut check: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        for attempt in 0..self.attempts {
            if check()? {
                return Ok(());
            }
            tracing::trace!(attempt, what, "condition not met yet");
            if attempt + 1 < self.attempts {
                std::thread::sleep(self.interval);
            }
        }

        Err(Error::timeout(what, self.total()))
    }
}
