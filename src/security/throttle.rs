//! Failed login throttling.
//!
//! # Responsibilities
//! - Count failed logins per username
//! - Delay the failing request in proportion to the count
//! - Tell the caller when a captcha must be shown
//!
//! # Design Decisions
//! - The delay is an async sleep on the request's own task, so other
//!   clients are not slowed down
//! - A count restarts once `reset_after` has passed since the last failure
//! - Records older than `reset_after` are swept out, at most once a minute

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::observability::metrics;

const CAPTCHA_THRESHOLD: u32 = 15;
const LOCKOUT_THRESHOLD: u32 = 30;
const DELAY_THRESHOLD: u32 = 3;
const MIN_LOCKOUT_DELAY: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// What to do about the failure that brought the count to `count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub delay: Duration,
    pub captcha_required: bool,
    /// The account just reached the lockout threshold.
    pub notify: bool,
}

pub fn throttle_decision(count: u32) -> ThrottleDecision {
    if count >= LOCKOUT_THRESHOLD {
        ThrottleDecision {
            delay: (Duration::from_secs(1) * count).max(MIN_LOCKOUT_DELAY),
            captcha_required: true,
            notify: count == LOCKOUT_THRESHOLD,
        }
    } else if count >= CAPTCHA_THRESHOLD {
        ThrottleDecision {
            delay: Duration::from_millis(600) * count,
            captcha_required: true,
            notify: false,
        }
    } else if count >= DELAY_THRESHOLD {
        ThrottleDecision {
            delay: Duration::from_millis(500) * count,
            captcha_required: false,
            notify: false,
        }
    } else {
        ThrottleDecision {
            delay: Duration::ZERO,
            captcha_required: false,
            notify: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failure: Instant,
}

#[derive(Debug)]
pub struct LoginThrottle {
    failures: DashMap<String, FailureRecord>,
    reset_after: Duration,
    last_sweep: Mutex<Instant>,
}

impl LoginThrottle {
    pub fn new(reset_after: Duration) -> Self {
        Self {
            failures: DashMap::new(),
            reset_after,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Count a failure and return the new total.
    pub fn record_failure(&self, username: &str) -> u32 {
        self.record_failure_at(username, Instant::now())
    }

    fn record_failure_at(&self, username: &str, now: Instant) -> u32 {
        self.sweep_stale_at(now);
        let mut entry = self
            .failures
            .entry(username.to_string())
            .or_insert(FailureRecord {
                count: 0,
                last_failure: now,
            });
        if now.saturating_duration_since(entry.last_failure) > self.reset_after {
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        entry.last_failure = now;
        entry.count
    }

    /// Record a failed login, wait out the delay and report whether a
    /// captcha is now required.
    pub async fn record_and_throttle(&self, username: &str) -> bool {
        let count = self.record_failure(username);
        let decision = throttle_decision(count);
        metrics::record_failed_login();

        if decision.notify {
            warn!(username, count, "Account reached the failed login lockout threshold");
        }
        if !decision.delay.is_zero() {
            debug!(username, count, delay_ms = decision.delay.as_millis() as u64, "Throttling failed login");
            tokio::time::sleep(decision.delay).await;
        }
        decision.captcha_required
    }

    /// Drop records whose last failure is older than `reset_after`, at most
    /// once per sweep interval. Returns the number removed.
    pub fn sweep_stale_at(&self, now: Instant) -> usize {
        {
            let mut last = self.last_sweep.lock().expect("login throttle mutex poisoned");
            if now.saturating_duration_since(*last) < SWEEP_INTERVAL {
                return 0;
            }
            *last = now;
        }

        let before = self.failures.len();
        self.failures
            .retain(|_, record| now.saturating_duration_since(record.last_failure) <= self.reset_after);
        let removed = before.saturating_sub(self.failures.len());
        if removed > 0 {
            debug!(removed, remaining = self.failures.len(), "Dropped stale failed login records");
        }
        removed
    }

    pub fn tracked_usernames(&self) -> usize {
        self.failures.len()
    }

    /// Forget failures after a successful login.
    pub fn reset(&self, username: &str) {
        self.failures.remove(username);
    }

    pub fn failure_count(&self, username: &str) -> u32 {
        self.failures.get(username).map(|r| r.count).unwrap_or(0)
    }
}
