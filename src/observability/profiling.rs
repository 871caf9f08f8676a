//! Scoped timing.

use std::time::{Duration, Instant};

/// Measures the time between [`ProfileScope::start`] and [`ProfileScope::stop`].
///
/// A scope dropped without `stop` still logs its elapsed time.
#[derive(Debug)]
#[must_use = "a profile scope measures until it is stopped or dropped"]
pub struct ProfileScope {
    label: &'static str,
    started: Instant,
    stopped: bool,
}

impl ProfileScope {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
            stopped: false,
        }
    }

    /// Time since the scope started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Finish the measurement and return the elapsed time.
    pub fn stop(mut self) -> Duration {
        self.stopped = true;
        let elapsed = self.elapsed();
        tracing::debug!(scope = self.label, elapsed_ms = elapsed.as_millis() as u64, "Profile scope finished");
        elapsed
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.stopped {
            tracing::debug!(
                scope = self.label,
                elapsed_ms = self.elapsed().as_millis() as u64,
                "Profile scope dropped"
            );
        }
    }
}
