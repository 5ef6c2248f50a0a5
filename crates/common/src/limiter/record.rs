use std::time::Duration;

/// Shortest sweep interval honoured; smaller values are raised to this.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Thresholds shared by the origin and account tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Failures that trigger a lockout
    pub max_attempts: u32,
    pub lockout: Duration,
    /// How often stale records are swept
    pub sweep_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl LimiterConfig {
    pub(crate) fn lockout_ms(&self) -> u64 {
        self.lockout.as_millis() as u64
    }
}

/// What one recorded failure did to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    /// Below the threshold; failures so far
    Counting(u32),
    /// This failure crossed the threshold and started the lockout
    LockedOut,
    /// Already locked; the deadline is unchanged
    StillLocked,
}

/// Failure history for one origin or account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    pub failures: u32,
    pub last_attempt_ms: u64,
    pub locked_until_ms: Option<u64>,
}

impl AttemptRecord {
    pub(crate) fn new(now_ms: u64) -> Self {
        Self {
            failures: 0,
            last_attempt_ms: now_ms,
            locked_until_ms: None,
        }
    }

    pub fn is_locked(&self, now_ms: u64) -> bool {
        matches!(self.locked_until_ms, Some(until) if now_ms < until)
    }

    pub fn lock_expired(&self, now_ms: u64) -> bool {
        matches!(self.locked_until_ms, Some(until) if now_ms >= until)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.locked_until_ms
            .map(|until| until.saturating_sub(now_ms))
            .unwrap_or(0)
    }

    /// Expired lockouts and unlocked records idle for a whole lockout
    /// window carry no information.
    pub fn is_stale(&self, now_ms: u64, lockout_ms: u64) -> bool {
        if self.lock_expired(now_ms) {
            return true;
        }
        !self.is_locked(now_ms) && now_ms.saturating_sub(self.last_attempt_ms) > lockout_ms
    }

    pub(crate) fn register_failure(&mut self, now_ms: u64, config: &LimiterConfig) -> Tally {
        self.failures = self.failures.saturating_add(1);
        self.last_attempt_ms = now_ms;

        if self.is_locked(now_ms) {
            return Tally::StillLocked;
        }
        if self.failures >= config.max_attempts {
            self.locked_until_ms = Some(now_ms.saturating_add(config.lockout_ms()));
            return Tally::LockedOut;
        }
        Tally::Counting(self.failures)
    }
}
