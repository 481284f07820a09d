//! Session-level deduplication (spec §4.3.2, P6): sessions whose change
//! fingerprint repeats within `dedup_window_ms` are discarded rather than
//! persisted twice, for sessions large enough that repeats aren't coincidence.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::core::ChangeRecord;

pub struct Deduplicator {
    cache: Mutex<LruCache<String, (String, i64)>>,
}

impl Deduplicator {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the `sessionId` of the earlier session if `fingerprint` was
    /// already seen within `window_ms` of `now_ms` (spec §4.3.2: "the
    /// caller learns the existing sessionId"). Always records the
    /// fingerprint (keyed to `session_id`) for future checks.
    pub fn check(&self, fingerprint: &str, session_id: &str, now_ms: i64, window_ms: u64) -> Option<String> {
        let mut cache = self.cache.lock().unwrap();
        let existing = match cache.peek(fingerprint) {
            Some((seen_id, seen_at)) if now_ms.saturating_sub(*seen_at) <= window_ms as i64 => {
                Some(seen_id.clone())
            }
            _ => None,
        };
        if existing.is_none() {
            cache.put(fingerprint.to_string(), (session_id.to_string(), now_ms));
        }
        existing
    }
}

/// Session-level fingerprint per §4.3.2: each change's `fingerprint_line()`,
/// sorted for order-independence, hashed down to a fixed-size key.
pub fn session_fingerprint(changes: &[ChangeRecord]) -> String {
    let mut lines: Vec<String> = changes.iter().map(ChangeRecord::fingerprint_line).collect();
    lines.sort();
    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChangeOp;

    #[test]
    fn fingerprint_is_order_independent() {
        let a = vec![
            ChangeRecord::new("a.txt", ChangeOp::Modified),
            ChangeRecord::new("b.txt", ChangeOp::Modified),
        ];
        let b = vec![
            ChangeRecord::new("b.txt", ChangeOp::Modified),
            ChangeRecord::new("a.txt", ChangeOp::Modified),
        ];
        assert_eq!(session_fingerprint(&a), session_fingerprint(&b));
    }

    #[test]
    fn repeat_within_window_is_duplicate_p6() {
        let dedup = Deduplicator::new(10);
        assert!(dedup.check("fp1", "session-a", 1_000, 300_000).is_none());
        assert_eq!(
            dedup.check("fp1", "session-b", 1_500, 300_000),
            Some("session-a".to_string())
        );
    }

    #[test]
    fn repeat_outside_window_is_not_duplicate() {
        let dedup = Deduplicator::new(10);
        assert!(dedup.check("fp1", "session-a", 0, 1_000).is_none());
        assert!(dedup.check("fp1", "session-b", 2_000, 1_000).is_none());
    }
}
