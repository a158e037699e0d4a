//! Time-bounded local retention of scan results
//!
//! A [`RetentionStore`] is a newest-first log of timestamped records kept
//! under one key of a [`KeyValueStore`], with an in-memory mirror that
//! observers can watch.
//!
//! ## Invariants
//!
//! - No read returns an entry with `now - timestamp >= ttl`
//! - Expired entries leave persisted storage at the next sweep or append
//! - Entries are ordered newest first; pruning never reorders survivors
//! - With a `max_items` cap, the oldest entries are evicted first, both in
//!   storage and in memory, on append and on load
//! - Appends read-modify-write the persisted collection in one
//!   [`KeyValueStore::update`], so stores sharing a key (for instance two
//!   processes on one SQLite file) never drop each other's entries
//!
//! ## Failure policy
//!
//! Local history is a convenience cache, so storage trouble never reaches
//! the caller: unreadable or malformed collections read as empty, and failed
//! writes are logged and dropped.

mod feeds;
mod sweeper;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::store::KeyValueStore;

pub use feeds::{HistoryFeed, ReportFeed, HISTORY_KEY, REPORTS_KEY};
pub use sweeper::Sweeper;

/// A record that can live in a [`RetentionStore`]
pub trait Retained:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Creation instant the TTL is measured from
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Anything the background [`Sweeper`] can prune
pub trait Sweep: Send + Sync {
    /// Storage key, for logging
    fn key(&self) -> &str;

    /// Prune expired entries and republish; returns how many were removed
    fn sweep(&self) -> usize;
}

/// Maximum age and optional maximum count of a store's entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub ttl: Duration,
    pub max_items: Option<usize>,
}

impl RetentionPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_items: None,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Whether an entry created at `timestamp` is still live at `now`
    pub fn is_live(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age_ms = now.signed_duration_since(timestamp).num_milliseconds();
        i128::from(age_ms) < self.ttl.as_millis() as i128
    }
}

/// TTL- and capacity-bounded newest-first log persisted under one key
pub struct RetentionStore<T: Retained> {
    key: String,
    policy: RetentionPolicy,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// In-memory mirror; the lock also serializes whole operations
    entries: Mutex<Vec<T>>,
    updates: watch::Sender<Vec<T>>,
}

impl<T: Retained> RetentionStore<T> {
    /// Create a store with an empty mirror. Call [`Self::load_and_prune`] to
    /// hydrate it from storage.
    pub fn new(
        key: impl Into<String>,
        policy: RetentionPolicy,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            key: key.into(),
            policy,
            storage,
            clock,
            entries: Mutex::new(Vec::new()),
            updates,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Add an entry at the head of the log.
    ///
    /// The caller assigns `id` and `timestamp`. The new entry goes in front
    /// of the persisted collection as it is at write time, so entries added
    /// through other handles on the same storage survive. Expired entries are
    /// dropped and the cap applied before the result is persisted and
    /// mirrored.
    pub fn append(&self, entry: T) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();

        let mut merged = None;
        let result = self.storage.update(&self.key, &mut |raw| {
            let stored = raw.map(|raw| self.decode(&raw)).unwrap_or_default();
            let updated = self.merge(entry.clone(), stored, now);
            let json = serde_json::to_string(&updated)?;
            merged = Some(updated);
            Ok(Some(json))
        });
        if let Err(e) = result {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist collection");
        }

        // Storage unreadable: fall back to what this handle already holds
        let updated = merged.unwrap_or_else(|| self.merge(entry, entries.clone(), now));
        *entries = updated;
        self.updates.send_replace(entries.clone());
    }

    /// Entries still live right now, newest first
    pub fn entries(&self) -> Vec<T> {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| self.policy.is_live(e.timestamp(), now))
            .cloned()
            .collect()
    }

    /// Reload from storage, dropping expired entries.
    ///
    /// Writes back only when something was dropped, so an immediate second
    /// call performs no write. The result replaces the in-memory mirror.
    pub fn load_and_prune(&self) -> Vec<T> {
        self.prune().0
    }

    /// Delete the persisted collection and empty the mirror
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        if let Err(e) = self.storage.remove(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "Failed to remove persisted collection");
        }
        entries.clear();
        self.updates.send_replace(Vec::new());
        tracing::info!(key = %self.key, "Collection cleared");
    }

    /// Watch the current entries; updated on every append, prune and clear
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.updates.subscribe()
    }

    fn prune(&self) -> (Vec<T>, usize) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();

        let mut pruned = (Vec::new(), 0);
        let result = self.storage.update(&self.key, &mut |raw| {
            let Some(raw) = raw else {
                return Ok(None);
            };
            let stored = self.decode(&raw);
            let total = stored.len();
            let mut valid: Vec<T> = stored
                .into_iter()
                .filter(|e| self.policy.is_live(e.timestamp(), now))
                .collect();
            self.apply_cap(&mut valid);
            let removed = total - valid.len();

            let write = if removed > 0 {
                Some(serde_json::to_string(&valid)?)
            } else {
                None
            };
            pruned = (valid, removed);
            Ok(write)
        });
        if let Err(e) = result {
            tracing::warn!(key = %self.key, error = %e, "Failed to prune persisted collection");
        }

        let (valid, removed) = pruned;
        *entries = valid.clone();
        self.updates.send_if_modified(|current| {
            if *current == valid {
                false
            } else {
                *current = valid.clone();
                true
            }
        });

        (valid, removed)
    }

    /// `entry` followed by the live part of `rest`, capped
    fn merge(&self, entry: T, rest: Vec<T>, now: DateTime<Utc>) -> Vec<T> {
        let mut updated = Vec::with_capacity(rest.len() + 1);
        updated.push(entry);
        updated.extend(
            rest.into_iter()
                .filter(|e| self.policy.is_live(e.timestamp(), now)),
        );
        self.apply_cap(&mut updated);
        updated
    }

    /// Drop the oldest entries beyond `max_items`
    fn apply_cap(&self, entries: &mut Vec<T>) {
        if let Some(max_items) = self.policy.max_items {
            if entries.len() > max_items {
                tracing::debug!(
                    key = %self.key,
                    evicted = entries.len() - max_items,
                    "Evicting oldest entries over capacity"
                );
                entries.truncate(max_items);
            }
        }
    }

    /// Persisted collection, or empty if malformed
    fn decode(&self, raw: &str) -> Vec<T> {
        match serde_json::from_str(raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    "Discarding malformed persisted collection"
                );
                Vec::new()
            }
        }
    }
}

impl<T: Retained> Sweep for RetentionStore<T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn sweep(&self) -> usize {
        let (valid, removed) = self.prune();
        if removed > 0 {
            tracing::info!(
                key = %self.key,
                removed,
                remaining = valid.len(),
                "Swept expired entries"
            );
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde::Deserialize;

    const KEY: &str = "test_log";
    const TTL: Duration = Duration::from_millis(120_000);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    }

    impl Retained for Record {
        fn timestamp(&self) -> DateTime<Utc> {
            self.timestamp
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn record(id: &str, ms: i64) -> Record {
        Record {
            id: id.to_string(),
            timestamp: at(ms),
        }
    }

    struct Fixture {
        storage: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        store: RetentionStore<Record>,
    }

    fn fixture(policy: RetentionPolicy) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let store = RetentionStore::new(KEY, policy, storage.clone(), clock.clone());
        Fixture {
            storage,
            clock,
            store,
        }
    }

    fn persisted(storage: &MemoryStore) -> Vec<Record> {
        storage
            .get(KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
            .unwrap_or_default()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_is_live_boundary() {
        let policy = RetentionPolicy::new(TTL);
        assert!(policy.is_live(at(0), at(119_999)));
        assert!(!policy.is_live(at(0), at(120_000)));
        assert!(!policy.is_live(at(0), at(120_001)));
        // Clock skew: entries from the future stay live
        assert!(policy.is_live(at(5_000), at(0)));
    }

    #[test]
    fn test_append_is_newest_first() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.store.append(record("e1", 0));
        f.clock.set(at(10));
        f.store.append(record("e2", 10));

        assert_eq!(ids(&f.store.entries()), vec!["e2", "e1"]);
        assert_eq!(ids(&persisted(&f.storage)), vec!["e2", "e1"]);
    }

    #[test]
    fn test_expiry_scenario() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.store.append(record("e1", 0));
        assert_eq!(persisted(&f.storage).len(), 1);

        f.clock.set(at(119_999));
        assert_eq!(ids(&f.store.entries()), vec!["e1"]);
        assert_eq!(ids(&f.store.load_and_prune()), vec!["e1"]);

        f.clock.set(at(120_001));
        assert!(f.store.entries().is_empty());
        assert!(f.store.load_and_prune().is_empty());
        assert!(persisted(&f.storage).is_empty());
    }

    #[test]
    fn test_append_prunes_expired_entries_from_storage() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.store.append(record("old", 0));

        f.clock.set(at(130_000));
        f.store.append(record("new", 130_000));

        assert_eq!(ids(&persisted(&f.storage)), vec!["new"]);
        assert_eq!(ids(&f.store.entries()), vec!["new"]);
    }

    #[test]
    fn test_prune_preserves_order() {
        let f = fixture(RetentionPolicy::new(TTL));
        let stored = vec![
            record("d", 90_000),
            record("c", 60_000),
            record("b", 10_000),
            record("a", 0),
        ];
        f.storage
            .set(KEY, &serde_json::to_string(&stored).unwrap())
            .unwrap();

        f.clock.set(at(135_000));
        assert_eq!(ids(&f.store.load_and_prune()), vec!["d", "c"]);
        assert_eq!(ids(&persisted(&f.storage)), vec!["d", "c"]);
    }

    #[test]
    fn test_load_and_prune_is_idempotent() {
        let f = fixture(RetentionPolicy::new(TTL));
        let stored = vec![record("live", 100_000), record("dead", 0)];
        f.storage
            .set(KEY, &serde_json::to_string(&stored).unwrap())
            .unwrap();
        let writes_before = f.storage.write_count();

        f.clock.set(at(150_000));
        let first = f.store.load_and_prune();
        assert_eq!(f.storage.write_count(), writes_before + 1);

        let second = f.store.load_and_prune();
        assert_eq!(first, second);
        assert_eq!(f.storage.write_count(), writes_before + 1);
    }

    #[test]
    fn test_load_and_prune_without_expiry_does_not_write() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.store.append(record("e1", 0));
        let writes = f.storage.write_count();

        f.store.load_and_prune();
        assert_eq!(f.storage.write_count(), writes);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let f = fixture(RetentionPolicy::new(TTL).with_max_items(2));
        f.store.append(record("e1", 0));
        f.store.append(record("e2", 1));
        f.store.append(record("e3", 2));

        assert_eq!(ids(&f.store.entries()), vec!["e3", "e2"]);
        assert_eq!(ids(&persisted(&f.storage)), vec!["e3", "e2"]);
    }

    #[test]
    fn test_clear() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.store.append(record("e1", 0));
        f.store.append(record("e2", 0));

        f.store.clear();
        assert!(f.store.entries().is_empty());
        assert!(f.storage.get(KEY).unwrap().is_none());
        assert!(f.store.load_and_prune().is_empty());
    }

    #[test]
    fn test_corrupt_collection_reads_empty_then_is_replaced() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.storage.set(KEY, "{not json").unwrap();
        let writes = f.storage.write_count();

        assert!(f.store.load_and_prune().is_empty());
        // Discarded, not repaired in place
        assert_eq!(f.storage.write_count(), writes);
        assert_eq!(f.storage.get(KEY).unwrap().as_deref(), Some("{not json"));

        f.store.append(record("e1", 0));
        assert_eq!(ids(&persisted(&f.storage)), vec!["e1"]);
    }

    #[test]
    fn test_shape_mismatch_reads_empty() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.storage
            .set(KEY, r#"[{"id":"ok","timestamp":0},{"id":7}]"#)
            .unwrap();
        assert!(f.store.load_and_prune().is_empty());
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let storage = Arc::new(MemoryStore::with_quota(16));
        let clock = Arc::new(ManualClock::at_epoch());
        let store: RetentionStore<Record> =
            RetentionStore::new(KEY, RetentionPolicy::new(TTL), storage.clone(), clock);

        store.append(record("too-large-to-fit", 0));

        // Memory reflects the append until the next reload from storage
        assert_eq!(ids(&store.entries()), vec!["too-large-to-fit"]);
        assert!(storage.get(KEY).unwrap().is_none());

        assert_eq!(store.sweep(), 0);
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_stores_sharing_a_key_keep_each_others_entries() {
        let storage = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let open = || {
            let store: RetentionStore<Record> = RetentionStore::new(
                KEY,
                RetentionPolicy::new(TTL),
                storage.clone(),
                clock.clone(),
            );
            store.load_and_prune();
            store
        };

        // Both hydrated before either writes
        let first = open();
        let second = open();
        first.append(record("1", 0));
        clock.set(at(10));
        second.append(record("2", 10));

        assert_eq!(ids(&persisted(&storage)), vec!["2", "1"]);
        assert_eq!(ids(&second.entries()), vec!["2", "1"]);
        assert_eq!(ids(&open().entries()), vec!["2", "1"]);
    }

    #[test]
    fn test_load_applies_capacity() {
        let f = fixture(RetentionPolicy::new(TTL).with_max_items(2));
        let stored = vec![
            record("d", 30),
            record("c", 20),
            record("b", 10),
            record("a", 0),
        ];
        f.storage
            .set(KEY, &serde_json::to_string(&stored).unwrap())
            .unwrap();
        let writes = f.storage.write_count();

        f.clock.set(at(100));
        assert_eq!(ids(&f.store.load_and_prune()), vec!["d", "c"]);
        assert_eq!(ids(&f.store.entries()), vec!["d", "c"]);
        assert_eq!(ids(&persisted(&f.storage)), vec!["d", "c"]);
        assert_eq!(f.storage.write_count(), writes + 1);

        assert_eq!(f.store.sweep(), 0);
        assert_eq!(f.storage.write_count(), writes + 1);
    }

    #[test]
    fn test_sweep_counts_capacity_evictions() {
        let f = fixture(RetentionPolicy::new(TTL).with_max_items(1));
        let stored = vec![
            record("live", 100_000),
            record("extra", 90_000),
            record("dead", 0),
        ];
        f.storage
            .set(KEY, &serde_json::to_string(&stored).unwrap())
            .unwrap();

        f.clock.set(at(150_000));
        assert_eq!(f.store.sweep(), 2);
        assert_eq!(ids(&persisted(&f.storage)), vec!["live"]);
    }

    #[test]
    fn test_sweep_reports_removed_and_notifies() {
        let f = fixture(RetentionPolicy::new(TTL));
        f.store.append(record("e1", 0));
        f.store.append(record("e2", 60_000));
        let rx = f.store.subscribe();
        assert_eq!(rx.borrow().len(), 2);

        f.clock.set(at(150_000));
        assert_eq!(f.store.sweep(), 1);
        assert_eq!(ids(&rx.borrow()), vec!["e2"]);
        assert_eq!(f.store.sweep(), 0);
    }
}
