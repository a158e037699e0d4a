//! # agriai-core
//!
//! Core library for agriai - crop and weed classification with a
//! short-lived local scan log.
//!
//! This library provides:
//! - Domain types for verdicts, history entries, and reports
//! - A classification client for a remote vision model
//! - A persistent key-value store with a byte quota (SQLite)
//! - TTL- and capacity-bounded retention of history and reports
//! - Configuration management and logging infrastructure
//!
//! ## Data flow
//!
//! An image goes to the [`Classifier`], the verdict is appended to the
//! [`HistoryFeed`] and then to the [`ReportFeed`]. Entries live for a fixed
//! TTL; reads never return expired entries and the [`Sweeper`] purges them
//! from storage in the background.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agriai_core::{Config, HistoryFeed, SqliteStore, SystemClock};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = SqliteStore::open(&Config::store_path(), config.retention.storage_quota_bytes)
//!     .expect("failed to open store");
//!
//! let history = HistoryFeed::open(Arc::new(store), Arc::new(SystemClock), &config.retention);
//! for entry in history.entries() {
//!     println!("{} {}", entry.id, entry.verdict.classification);
//! }
//! ```

// Re-export commonly used items at the crate root
pub use classifier::{Classifier, GeminiService, VisionService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use image::ImagePayload;
pub use pipeline::{ScanOutcome, ScanPipeline};
pub use retention::{HistoryFeed, ReportFeed, Sweeper};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::*;

// Public modules
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod image;
pub mod logging;
pub mod pipeline;
pub mod retention;
pub mod store;
pub mod types;
