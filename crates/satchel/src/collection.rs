//! In-memory indexed collection of session records.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::record::SessionRecord;

/// Authoritative in-memory set of session records.
///
/// Records are keyed by session id for O(1) lookup, with a secondary
/// ordering by `updated_at` so the TTL sweep can find stale records
/// without scanning the whole map. Both structures are built eagerly at
/// construction and kept in lockstep by every mutation.
///
/// Expiry is checked lazily on every read (`get`, `len`, `touch` treat
/// expired-but-unswept records as absent) *and* enforced physically by
/// the periodic [`sweep`](Self::sweep). Both paths agree on
/// `now - updated_at > ttl`.
#[derive(Debug)]
pub struct SessionCollection {
    records: HashMap<String, SessionRecord>,

    /// `(updated_at, id)` pairs mirroring `records`, oldest first.
    by_age: BTreeSet<(DateTime<Utc>, String)>,

    /// TTL duration (`None` means records never expire).
    ttl: Option<Duration>,
}

impl SessionCollection {
    /// Create an empty collection.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            records: HashMap::new(),
            by_age: BTreeSet::new(),
            ttl,
        }
    }

    /// Build a collection from previously persisted records, preserving
    /// their `updated_at` values. Later duplicates of an id win.
    pub fn from_records(records: Vec<SessionRecord>, ttl: Option<Duration>) -> Self {
        let mut collection = Self::new(ttl);
        for rec in records {
            let key = (rec.updated_at, rec.id.clone());
            if let Some(prev) = collection.records.insert(rec.id.clone(), rec) {
                collection.by_age.remove(&(prev.updated_at, prev.id));
            }
            collection.by_age.insert(key);
        }
        collection
    }

    /// The configured TTL.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Oldest `updated_at` still considered live. `None` when expiry is
    /// off (or the TTL is too large to compute a cutoff), meaning nothing
    /// ever expires.
    fn cutoff(&self) -> Option<DateTime<Utc>> {
        let ttl = self.ttl?;
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        Utc::now().checked_sub_signed(ttl)
    }

    /// Fetch the record for `id`, if present and unexpired.
    pub fn get(&self, id: &str) -> Option<&SessionRecord> {
        let cutoff = self.cutoff();
        let rec = self.records.get(id)?;
        match cutoff {
            Some(cutoff) if rec.updated_at < cutoff => None,
            _ => Some(rec),
        }
    }

    /// Insert or replace the record for `id`, advancing `updated_at`.
    ///
    /// `updated_at` is clamped against the stored value so a backwards
    /// clock step cannot regress it.
    pub fn upsert(&mut self, id: &str, content: serde_json::Value) {
        match self.records.get_mut(id) {
            Some(rec) => {
                self.by_age.remove(&(rec.updated_at, rec.id.clone()));
                rec.content = content;
                rec.updated_at = Utc::now().max(rec.updated_at);
                self.by_age.insert((rec.updated_at, rec.id.clone()));
            }
            None => {
                let rec = SessionRecord::new(id, content);
                self.by_age.insert((rec.updated_at, rec.id.clone()));
                self.records.insert(rec.id.clone(), rec);
            }
        }
    }

    /// Advance `updated_at` for `id` without altering content.
    ///
    /// Absent or expired ids are left alone. Returns whether a record was
    /// refreshed.
    pub fn touch(&mut self, id: &str) -> bool {
        let cutoff = self.cutoff();
        let Some(rec) = self.records.get_mut(id) else {
            return false;
        };
        if let Some(cutoff) = cutoff
            && rec.updated_at < cutoff
        {
            return false;
        }

        self.by_age.remove(&(rec.updated_at, rec.id.clone()));
        rec.updated_at = Utc::now().max(rec.updated_at);
        self.by_age.insert((rec.updated_at, rec.id.clone()));
        true
    }

    /// Remove the record for `id`, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<SessionRecord> {
        let rec = self.records.remove(id)?;
        self.by_age.remove(&(rec.updated_at, rec.id.clone()));
        Some(rec)
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.by_age.clear();
    }

    /// Number of unexpired records.
    pub fn len(&self) -> usize {
        match self.cutoff() {
            None => self.records.len(),
            Some(cutoff) => self.by_age.range((cutoff, String::new())..).count(),
        }
    }

    /// Whether no unexpired records remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physically remove every expired record. Returns how many were
    /// removed.
    pub fn sweep(&mut self) -> usize {
        let Some(cutoff) = self.cutoff() else {
            return 0;
        };

        let live = self.by_age.split_off(&(cutoff, String::new()));
        let stale = std::mem::replace(&mut self.by_age, live);
        for (_, id) in &stale {
            self.records.remove(id);
            debug!(session_id = %id, "expired session swept");
        }
        stale.len()
    }

    /// Clone all records (including expired-but-unswept ones) for a
    /// durable flush. Expired records re-expire on reload, so persisting
    /// them is harmless.
    pub fn snapshot_records(&self) -> Vec<SessionRecord> {
        self.records.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn collection(ttl: Option<Duration>) -> SessionCollection {
        SessionCollection::new(ttl)
    }

    #[test]
    fn test_upsert_is_idempotent_per_id() {
        let mut c = collection(None);
        c.upsert("x", json!({ "v": "a" }));
        c.upsert("x", json!({ "v": "b" }));

        assert_eq!(c.len(), 1);
        assert_eq!(c.get("x").unwrap().content, json!({ "v": "b" }));
        assert_eq!(c.by_age.len(), 1);
    }

    #[test]
    fn test_get_missing_is_none() {
        let c = collection(None);
        assert!(c.get("missing").is_none());
    }

    #[test]
    fn test_touch_preserves_content() {
        let mut c = collection(None);
        c.upsert("x", json!({ "a": 1 }));
        let before = c.get("x").unwrap().updated_at;

        thread::sleep(Duration::from_millis(5));
        assert!(c.touch("x"));

        let rec = c.get("x").unwrap();
        assert_eq!(rec.content, json!({ "a": 1 }));
        assert!(rec.updated_at >= before);
    }

    #[test]
    fn test_touch_absent_is_noop() {
        let mut c = collection(None);
        assert!(!c.touch("missing"));
    }

    #[test]
    fn test_remove_keeps_index_consistent() {
        let mut c = collection(None);
        c.upsert("a", json!(1));
        c.upsert("b", json!(2));

        assert!(c.remove("a").is_some());
        assert!(c.remove("a").is_none());
        assert_eq!(c.len(), 1);
        assert_eq!(c.by_age.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut c = collection(None);
        for i in 0..5 {
            c.upsert(&format!("id-{i}"), json!(i));
        }
        c.clear();
        assert_eq!(c.len(), 0);
        assert!(c.by_age.is_empty());
    }

    #[test]
    fn test_expired_records_read_as_absent() {
        let mut c = collection(Some(Duration::from_millis(20)));
        c.upsert("x", json!(1));

        thread::sleep(Duration::from_millis(50));

        // Not yet swept, but logically absent.
        assert!(c.get("x").is_none());
        assert_eq!(c.len(), 0);
        assert!(!c.touch("x"));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let mut c = collection(None);
        c.upsert("x", json!(1));

        thread::sleep(Duration::from_millis(30));

        assert!(c.get("x").is_some());
        assert_eq!(c.sweep(), 0);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_stale() {
        let mut c = collection(Some(Duration::from_millis(40)));
        c.upsert("old", json!(1));
        thread::sleep(Duration::from_millis(60));
        c.upsert("fresh", json!(2));

        assert_eq!(c.sweep(), 1);
        assert!(c.get("old").is_none());
        assert!(c.get("fresh").is_some());
        assert_eq!(c.records.len(), 1);
        assert_eq!(c.by_age.len(), 1);
    }

    #[test]
    fn test_updated_at_never_regresses() {
        let mut c = collection(None);
        let future = Utc::now() + chrono::Duration::seconds(60);
        let rec = SessionRecord {
            id: "x".into(),
            content: json!(1),
            updated_at: future,
        };
        let mut c2 = SessionCollection::from_records(vec![rec], None);
        c2.upsert("x", json!(2));
        assert_eq!(c2.get("x").unwrap().updated_at, future);

        c.upsert("y", json!(1));
        let first = c.get("y").unwrap().updated_at;
        c.upsert("y", json!(2));
        assert!(c.get("y").unwrap().updated_at >= first);
    }

    #[test]
    fn test_from_records_last_duplicate_wins() {
        let a = SessionRecord::new("x", json!("first"));
        thread::sleep(Duration::from_millis(5));
        let b = SessionRecord::new("x", json!("second"));

        let c = SessionCollection::from_records(vec![a, b], None);
        assert_eq!(c.len(), 1);
        assert_eq!(c.by_age.len(), 1);
        assert_eq!(c.get("x").unwrap().content, json!("second"));
    }

    #[test]
    fn test_snapshot_records_round_trip() {
        let mut c = collection(None);
        c.upsert("a", json!({ "n": 1 }));
        c.upsert("b", json!({ "n": 2 }));

        let records = c.snapshot_records();
        let restored = SessionCollection::from_records(records, None);

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get("a").unwrap().content, json!({ "n": 1 }));
        assert_eq!(
            restored.get("a").unwrap().updated_at,
            c.get("a").unwrap().updated_at
        );
    }
}
