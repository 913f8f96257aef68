//! Lock record stored in the sidecar lock file.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who holds a task directory and since when.
///
/// Records are replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Tool (operation) that took the lock.
    pub tool: String,
    /// Process id of the holder.
    pub pid: u32,
    /// Acquisition time.
    pub timestamp: DateTime<Utc>,
    /// Opaque ownership token.
    pub lock_id: String,
}

impl LockRecord {
    /// Create a record with a fresh token.
    #[must_use]
    pub fn new(tool: impl Into<String>, pid: u32) -> Self {
        Self {
            tool: tool.into(),
            pid,
            timestamp: Utc::now(),
            lock_id: Uuid::new_v4().to_string(),
        }
    }

    /// Age of the record at `now`. Negative when the clock went backwards.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp)
    }

    /// Stale once strictly older than `timeout`.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.age_at(now) > timeout
    }

    /// Whether `(pid, lock_id)` identifies this holder.
    #[must_use]
    pub fn is_owned_by(&self, pid: u32, lock_id: &str) -> bool {
        self.pid == pid && self.lock_id == lock_id
    }

    /// Short description of the holder for rejection messages.
    #[must_use]
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        format!(
            "held by '{}' (pid {}) for {}s",
            self.tool,
            self.pid,
            self.age_at(now).num_seconds().max(0)
        )
    }

    /// Parse a record; `None` for anything unparsable.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        serde_json::from_str(content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_unique_tokens() {
        let a = LockRecord::new("write-task", 1);
        let b = LockRecord::new("write-task", 1);
        assert_ne!(a.lock_id, b.lock_id);
    }

    #[test]
    fn test_staleness_is_strict() {
        let record = LockRecord::new("t", 1);
        let timeout = Duration::seconds(30);
        assert!(!record.is_stale_at(record.timestamp + timeout, timeout));
        assert!(record.is_stale_at(record.timestamp + timeout + Duration::milliseconds(1), timeout));
    }

    #[test]
    fn test_future_timestamp_is_not_stale() {
        let record = LockRecord::new("t", 1);
        let earlier = record.timestamp - Duration::seconds(60);
        assert!(!record.is_stale_at(earlier, Duration::seconds(30)));
        assert!(record.describe(earlier).contains("for 0s"));
    }

    #[test]
    fn test_serialized_field_names() {
        let record = LockRecord::new("sync-todos", 42);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"lockId\""));
        assert!(json.contains("\"pid\":42"));
        assert_eq!(LockRecord::parse(&json), Some(record));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(LockRecord::parse("").is_none());
        assert!(LockRecord::parse("{\"tool\":\"x\"}").is_none());
    }

    #[test]
    fn test_ownership() {
        let record = LockRecord::new("t", 7);
        assert!(record.is_owned_by(7, &record.lock_id));
        assert!(!record.is_owned_by(8, &record.lock_id));
        assert!(!record.is_owned_by(7, "other"));
    }
}
