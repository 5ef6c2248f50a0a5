use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

const PREFIX: &str = "file_";
const SUFFIX: &str = ".bin";

/// Storage identity of one upload: `file_<n>.bin`.
///
/// Only canonical forms parse, so an identity can always be used as a
/// file name inside the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId {
    sequence: u64,
    name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("not a storage identity: {0:?}")]
pub struct InvalidStorageId(pub String);

impl StorageId {
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            name: format!("{}{}{}", PREFIX, sequence, SUFFIX),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let sequence: u64 = digits.parse().ok()?;
        let id = Self::from_sequence(sequence);
        // rejects leading zeros
        (id.name == s).then_some(id)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for StorageId {
    type Err = InvalidStorageId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidStorageId(s.to_string()))
    }
}

impl AsRef<str> for StorageId {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Process-wide source of storage identities.
///
/// The only source of uniqueness: every draw returns a value no other
/// draw in this process has returned.
#[derive(Debug)]
pub struct IdentitySequence {
    next: AtomicU64,
}

impl IdentitySequence {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Seed from the current time, but never at or below `floor`.
    pub fn seeded(now_ms: u64, floor: Option<u64>) -> Self {
        let first = match floor {
            Some(highest) => now_ms.max(highest.saturating_add(1)),
            None => now_ms,
        };
        Self::starting_at(first)
    }

    pub fn next(&self) -> StorageId {
        StorageId::from_sequence(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Value the next draw will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_format_and_parse() {
        let id = StorageId::from_sequence(1_700_000_000_123);
        assert_eq!(id.as_str(), "file_1700000000123.bin");
        assert_eq!(StorageId::parse(id.as_str()), Some(id.clone()));
        assert_eq!("file_1700000000123.bin".parse::<StorageId>().unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_non_canonical() {
        for bad in [
            "",
            "file_.bin",
            "file_01.bin",
            "file_-1.bin",
            "file_+1.bin",
            "file_1.txt",
            "file_1.bin/..",
            "../file_1.bin",
            "file_99999999999999999999999.bin",
        ] {
            assert!(StorageId::parse(bad).is_none(), "{:?} parsed", bad);
        }
        assert!(StorageId::parse("file_0.bin").is_some());
    }

    #[test]
    fn test_seeded_respects_floor() {
        assert_eq!(IdentitySequence::seeded(100, None).peek(), 100);
        assert_eq!(IdentitySequence::seeded(100, Some(40)).peek(), 100);
        assert_eq!(IdentitySequence::seeded(100, Some(500)).peek(), 501);
    }

    #[test]
    fn test_concurrent_draws_are_unique() {
        let sequence = Arc::new(IdentitySequence::starting_at(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sequence = sequence.clone();
                std::thread::spawn(move || (0..500).map(|_| sequence.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 4_000);
    }
}
