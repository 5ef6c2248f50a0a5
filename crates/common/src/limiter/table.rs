use dashmap::DashMap;

use super::record::{AttemptRecord, LimiterConfig, Tally};

/// Concurrent map of attempt records for one kind of key.
///
/// Every mutation of a single key happens under that key's shard lock,
/// so concurrent failures against one key are counted exactly and only
/// one of them observes the lockout transition.
#[derive(Debug, Default)]
pub(crate) struct AttemptTable {
    records: DashMap<String, AttemptRecord>,
}

impl AttemptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is locked at `now_ms`. An expired lockout is removed.
    pub fn is_locked(&self, key: &str, now_ms: u64) -> bool {
        // copy out so the shard guard is released before any removal
        let Some(record) = self.records.get(key).map(|r| *r) else {
            return false;
        };
        if record.is_locked(now_ms) {
            return true;
        }
        if record.lock_expired(now_ms) {
            self.records
                .remove_if(key, |_, current| current.lock_expired(now_ms));
        }
        false
    }

    pub fn remaining_ms(&self, key: &str, now_ms: u64) -> u64 {
        self.records
            .get(key)
            .map(|r| r.remaining_ms(now_ms))
            .unwrap_or(0)
    }

    pub fn record_failure(&self, key: &str, now_ms: u64, config: &LimiterConfig) -> Tally {
        let mut record = self
            .records
            .entry(key.to_owned())
            .or_insert_with(|| AttemptRecord::new(now_ms));

        if record.is_stale(now_ms, config.lockout_ms()) {
            *record = AttemptRecord::new(now_ms);
        }
        record.register_failure(now_ms, config)
    }

    pub fn clear(&self, key: &str) {
        self.records.remove(key);
    }

    /// Drop stale records, returning how many were removed.
    pub fn sweep(&self, now_ms: u64, lockout_ms: u64) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_stale(now_ms, lockout_ms);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<AttemptRecord> {
        self.records.get(key).map(|r| *r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_expiry_removes_record() {
        let config = LimiterConfig::default();
        let table = AttemptTable::new();
        for _ in 0..5 {
            table.record_failure("10.0.0.1", 0, &config);
        }
        assert!(table.is_locked("10.0.0.1", 1));

        let after = config.lockout_ms();
        assert!(!table.is_locked("10.0.0.1", after));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_failure_after_expiry_restarts_count() {
        let config = LimiterConfig::default();
        let table = AttemptTable::new();
        for _ in 0..5 {
            table.record_failure("a", 0, &config);
        }

        let later = config.lockout_ms() + 1;
        assert_eq!(table.record_failure("a", later, &config), Tally::Counting(1));
        assert_eq!(table.get("a").unwrap().locked_until_ms, None);
    }

    #[test]
    fn test_sweep_counts_removed() {
        let config = LimiterConfig::default();
        let lockout = config.lockout_ms();
        let table = AttemptTable::new();

        table.record_failure("old", 0, &config);
        for _ in 0..5 {
            table.record_failure("locked", lockout, &config);
        }
        table.record_failure("fresh", lockout, &config);

        assert_eq!(table.sweep(lockout + 1, lockout), 1);
        assert!(table.get("old").is_none());
        assert!(table.get("locked").is_some());
        assert!(table.get("fresh").is_some());

        assert_eq!(table.sweep(3 * lockout, lockout), 2);
        assert_eq!(table.len(), 0);
    }
}
