//! Dual-key brute-force protection for the login entry point
//!
//! Failed attempts are tracked independently per origin (client address)
//! and per account. Crossing the threshold on either key locks that key
//! for the lockout window, and a request is blocked when either of its
//! keys is locked. One busy origin can therefore lock out honest users
//! behind the same address, and a targeted account stays locked no matter
//! where requests come from.
//!
//! Expired lockouts are dropped lazily by the check that observes them; a
//! background sweeper owned by the limiter clears idle records so memory
//! stays bounded under address-spraying traffic.

mod record;
mod sweeper;
mod table;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;

pub use record::{AttemptRecord, LimiterConfig, Tally, MIN_SWEEP_INTERVAL};
use sweeper::Sweeper;
use table::AttemptTable;

/// Longest account identifier that is tracked; longer input is truncated.
pub const MAX_ACCOUNT_LEN: usize = 255;

/// Result of [`BruteForceLimiter::record_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Blank origin or account; nothing was recorded
    Ignored,
    Recorded { origin: Tally, account: Tally },
}

impl FailureOutcome {
    /// True if this failure started a lockout on either key.
    pub fn triggered_lockout(&self) -> bool {
        matches!(
            self,
            FailureOutcome::Recorded { origin, account }
                if *origin == Tally::LockedOut || *account == Tally::LockedOut
        )
    }
}

/// Result of [`BruteForceLimiter::guard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// Refused before the check ran
    Blocked { remaining: Duration },
    /// The check passed; both keys were cleared
    Accepted(T),
    /// The check failed and was recorded
    Rejected(FailureOutcome),
}

impl<T> GuardOutcome<T> {
    /// Remaining lockout in whole minutes, rounded up, for user-facing
    /// messages.
    pub fn blocked_minutes(&self) -> Option<u64> {
        match self {
            GuardOutcome::Blocked { remaining } => Some(remaining.as_secs().div_ceil(60).max(1)),
            _ => None,
        }
    }
}

/// Number of records currently held per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracked {
    pub origins: usize,
    pub accounts: usize,
}

struct Inner {
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    origins: AttemptTable,
    accounts: AttemptTable,
}

impl Inner {
    fn sweep(&self) -> usize {
        let now = self.clock.now_unix_ms();
        let lockout = self.config.lockout_ms();
        let removed = self.origins.sweep(now, lockout) + self.accounts.sweep(now, lockout);
        if removed > 0 {
            info!(
                removed,
                origins = self.origins.len(),
                accounts = self.accounts.len(),
                "swept stale login attempt records"
            );
        }
        removed
    }
}

/// Tracks failed logins by origin and by account.
///
/// Owns its sweeper thread; call [`BruteForceLimiter::shutdown`] (or drop
/// the limiter) to stop it.
pub struct BruteForceLimiter {
    inner: Arc<Inner>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl std::fmt::Debug for BruteForceLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BruteForceLimiter")
            .field("config", &self.inner.config)
            .field("tracked", &self.tracked())
            .finish()
    }
}

impl BruteForceLimiter {
    /// Create a limiter and start its sweeper.
    ///
    /// A sweep interval below [`MIN_SWEEP_INTERVAL`] is raised to it.
    pub fn new(config: LimiterConfig, clock: Arc<dyn Clock>) -> std::io::Result<Self> {
        let config = LimiterConfig {
            sweep_interval: config.sweep_interval.max(MIN_SWEEP_INTERVAL),
            ..config
        };
        let inner = Arc::new(Inner {
            config,
            clock,
            origins: AttemptTable::new(),
            accounts: AttemptTable::new(),
        });

        let sweep_inner = inner.clone();
        let sweeper = Sweeper::spawn("login-limiter-sweeper", config.sweep_interval, move || {
            sweep_inner.sweep();
        })?;

        Ok(Self {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }

    fn now(&self) -> u64 {
        self.inner.clock.now_unix_ms()
    }

    /// True if either the origin or the account is locked out.
    ///
    /// Blank input is never blocked.
    pub fn is_blocked(&self, origin: &str, account: &str) -> bool {
        let (Some(origin), Some(account)) = (origin_key(origin), account_key(account)) else {
            return false;
        };
        let now = self.now();
        self.inner.origins.is_locked(origin, now) || self.inner.accounts.is_locked(account, now)
    }

    /// Record a failed attempt against both keys.
    pub fn record_failure(&self, origin: &str, account: &str) -> FailureOutcome {
        let (Some(origin), Some(account)) = (origin_key(origin), account_key(account)) else {
            return FailureOutcome::Ignored;
        };
        let now = self.now();
        let config = &self.inner.config;

        let origin_tally = self.inner.origins.record_failure(origin, now, config);
        let account_tally = self.inner.accounts.record_failure(account, now, config);

        if origin_tally == Tally::LockedOut {
            warn!(
                origin = %origin,
                lockout_secs = config.lockout.as_secs(),
                "origin locked out after repeated login failures"
            );
        }
        if account_tally == Tally::LockedOut {
            warn!(
                account = %account,
                lockout_secs = config.lockout.as_secs(),
                "account locked out after repeated login failures"
            );
        }
        debug!(origin = %origin, ?origin_tally, ?account_tally, "login failure recorded");

        FailureOutcome::Recorded {
            origin: origin_tally,
            account: account_tally,
        }
    }

    /// Clear both keys after a successful login.
    pub fn record_success(&self, origin: &str, account: &str) {
        let (Some(origin), Some(account)) = (origin_key(origin), account_key(account)) else {
            return;
        };
        self.inner.origins.clear(origin);
        self.inner.accounts.clear(account);
    }

    /// Time until neither key is locked. Blank keys are skipped.
    pub fn remaining_lockout(&self, origin: &str, account: &str) -> Duration {
        let now = self.now();
        let by_origin = origin_key(origin)
            .map(|k| self.inner.origins.remaining_ms(k, now))
            .unwrap_or(0);
        let by_account = account_key(account)
            .map(|k| self.inner.accounts.remaining_ms(k, now))
            .unwrap_or(0);
        Duration::from_millis(by_origin.max(by_account))
    }

    /// Run `check` unless blocked, and record its outcome.
    ///
    /// `check` returns `Some` on successful authentication.
    pub fn guard<T, F>(&self, origin: &str, account: &str, check: F) -> GuardOutcome<T>
    where
        F: FnOnce() -> Option<T>,
    {
        if self.is_blocked(origin, account) {
            return GuardOutcome::Blocked {
                remaining: self.remaining_lockout(origin, account),
            };
        }
        match check() {
            Some(value) => {
                self.record_success(origin, account);
                GuardOutcome::Accepted(value)
            }
            None => GuardOutcome::Rejected(self.record_failure(origin, account)),
        }
    }

    /// Sweep stale records now, returning how many were removed.
    pub fn sweep_now(&self) -> usize {
        self.inner.sweep()
    }

    pub fn tracked(&self) -> Tracked {
        Tracked {
            origins: self.inner.origins.len(),
            accounts: self.inner.accounts.len(),
        }
    }

    pub fn is_sweeper_running(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(Sweeper::is_running)
    }

    /// Stop the sweeper thread. Idempotent.
    pub fn shutdown(&self) {
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
            debug!("login limiter sweeper stopped");
        }
    }
}

impl Drop for BruteForceLimiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn origin_key(origin: &str) -> Option<&str> {
    let origin = origin.trim();
    (!origin.is_empty()).then_some(origin)
}

fn account_key(account: &str) -> Option<&str> {
    let account = account.trim();
    if account.is_empty() {
        return None;
    }
    match account.char_indices().nth(MAX_ACCOUNT_LEN) {
        Some((cut, _)) => Some(&account[..cut]),
        None => Some(account),
    }
}
