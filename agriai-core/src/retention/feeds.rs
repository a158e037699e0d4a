//! The scan history and report feeds
//!
//! Both are [`RetentionStore`]s with a fixed key. History entries embed the
//! scanned image, so that feed is capped; reports are governed by the TTL
//! alone and cannot be cleared by hand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::error::{Error, Result};
use crate::store::KeyValueStore;
use crate::types::{HistoryEntry, ReportEntry};

use super::{Retained, RetentionPolicy, RetentionStore, Sweep};

/// Storage key of the scan history
pub const HISTORY_KEY: &str = "agriai_history";

/// Storage key of the report feed
pub const REPORTS_KEY: &str = "agriai_reports";

impl Retained for HistoryEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Retained for ReportEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Scan log: one entry per classification, with its image
pub struct HistoryFeed {
    store: RetentionStore<HistoryEntry>,
}

impl HistoryFeed {
    /// Create the feed without touching storage
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &RetentionConfig,
    ) -> Self {
        let policy = RetentionPolicy::new(config.ttl()).with_max_items(config.history_max_items);
        Self {
            store: RetentionStore::new(HISTORY_KEY, policy, storage, clock),
        }
    }

    /// Create the feed and hydrate it from storage
    pub fn open(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &RetentionConfig,
    ) -> Self {
        let feed = Self::new(storage, clock, config);
        feed.load_and_prune();
        feed
    }

    pub fn append(&self, entry: HistoryEntry) {
        self.store.append(entry);
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.store.entries()
    }

    pub fn load_and_prune(&self) -> Vec<HistoryEntry> {
        self.store.load_and_prune()
    }

    /// User-confirmed purge of the whole scan log
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<HistoryEntry>> {
        self.store.subscribe()
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.store.policy()
    }
}

impl Sweep for HistoryFeed {
    fn key(&self) -> &str {
        HISTORY_KEY
    }

    fn sweep(&self) -> usize {
        self.store.sweep()
    }
}

/// Detailed analysis reports, expired strictly by age
pub struct ReportFeed {
    store: RetentionStore<ReportEntry>,
}

impl ReportFeed {
    /// Create the feed without touching storage
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &RetentionConfig,
    ) -> Self {
        Self {
            store: RetentionStore::new(
                REPORTS_KEY,
                RetentionPolicy::new(config.ttl()),
                storage,
                clock,
            ),
        }
    }

    /// Create the feed and hydrate it from storage
    pub fn open(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &RetentionConfig,
    ) -> Self {
        let feed = Self::new(storage, clock, config);
        feed.load_and_prune();
        feed
    }

    pub fn append(&self, entry: ReportEntry) {
        self.store.append(entry);
    }

    pub fn entries(&self) -> Vec<ReportEntry> {
        self.store.entries()
    }

    /// Live report by full id, or by a unique trailing part of it
    pub fn find(&self, id: &str) -> Result<ReportEntry> {
        let id = id.trim_start_matches('#');
        let not_found = || Error::ReportNotFound(id.to_string());
        if id.is_empty() {
            return Err(not_found());
        }

        let mut entries = self.entries();
        if let Some(pos) = entries.iter().position(|r| r.id == id) {
            return Ok(entries.swap_remove(pos));
        }

        let mut matches: Vec<ReportEntry> =
            entries.into_iter().filter(|r| r.id.ends_with(id)).collect();
        match matches.len() {
            0 => Err(not_found()),
            1 => Ok(matches.remove(0)),
            n => Err(Error::AmbiguousReportId {
                id: id.to_string(),
                matches: n,
            }),
        }
    }

    pub fn load_and_prune(&self) -> Vec<ReportEntry> {
        self.store.load_and_prune()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ReportEntry>> {
        self.store.subscribe()
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.store.policy()
    }
}

impl Sweep for ReportFeed {
    fn key(&self) -> &str {
        REPORTS_KEY
    }

    fn sweep(&self) -> usize {
        self.store.sweep()
    }
}
