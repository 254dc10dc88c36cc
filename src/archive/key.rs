use super::record::ArchiveKey;
use chrono::Utc;
use parking_lot::Mutex;

/// Timestamp keys that never repeat or go backwards within one handle.
///
/// Two inserts in the same millisecond get consecutive keys. Stores still
/// check for collisions with keys written by other handles.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    last: Mutex<u64>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next key based on the current wall clock
    pub fn next(&self) -> ArchiveKey {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.next_at(now)
    }

    /// Next key for a given clock reading
    pub fn next_at(&self, now_ms: u64) -> ArchiveKey {
        let mut last = self.last.lock();
        let key = if now_ms > *last { now_ms } else { *last + 1 };
        *last = key;
        ArchiveKey(key)
    }

    /// Skip past a key found to be taken
    pub fn observe(&self, taken: ArchiveKey) {
        let mut last = self.last.lock();
        if taken.0 > *last {
            *last = taken.0;
        }
    }
}
