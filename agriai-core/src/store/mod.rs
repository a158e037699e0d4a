//! Local key-value persistence
//!
//! The retention layer only needs string slots addressed by key, with a
//! total size budget like a browser's local storage:
//! - [`SqliteStore`] persists slots in a single SQLite table
//! - [`MemoryStore`] keeps them in process, for tests and throwaway runs
//!
//! Both enforce a byte quota over `key + value` of every slot. A write that
//! would exceed it fails with [`Error::QuotaExceeded`] and leaves the
//! previous value in place.

pub mod schema;
mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};

pub use sqlite::SqliteStore;

/// String-keyed persistent slots.
pub trait KeyValueStore: Send + Sync {
    /// Read a slot, `None` if it was never written or has been removed
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite a slot
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a slot; removing a missing slot is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// Read-modify-write a slot as one step.
    ///
    /// `f` receives the current value and returns the replacement, or `None`
    /// to leave the slot untouched. Implementations hold off other writers,
    /// including other processes sharing the store, until `f` returns.
    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<()> {
        let current = self.get(key)?;
        if let Some(next) = f(current)? {
            self.set(key, &next)?;
        }
        Ok(())
    }
}

/// Transformation applied by [`KeyValueStore::update`]
pub type UpdateFn<'a> = dyn FnMut(Option<String>) -> Result<Option<String>> + 'a;

/// Bytes a slot counts against the quota
pub(crate) fn slot_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

pub(crate) fn check_quota(key: &str, others: usize, value: &str, quota: usize) -> Result<()> {
    let needed = others + slot_size(key, value);
    if needed > quota {
        return Err(Error::QuotaExceeded {
            key: key.to_string(),
            needed,
            quota,
        });
    }
    Ok(())
}

/// In-process store with the same quota semantics as [`SqliteStore`]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, String>>,
    quota: usize,
    writes: Mutex<usize>,
}

impl MemoryStore {
    /// Effectively unbounded store
    pub fn new() -> Self {
        Self::with_quota(usize::MAX)
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            quota,
            writes: Mutex::new(0),
        }
    }

    /// Number of successful `set` calls so far
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    /// Total bytes currently stored
    pub fn used_bytes(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots.iter().map(|(k, v)| slot_size(k, v)).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        self.write_slot(&mut slots, key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots.lock().unwrap().remove(key);
        Ok(())
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(next) = f(slots.get(key).cloned())? {
            self.write_slot(&mut slots, key, &next)?;
        }
        Ok(())
    }
}

impl MemoryStore {
    fn write_slot(
        &self,
        slots: &mut HashMap<String, String>,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let others: usize = slots
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| slot_size(k, v))
            .sum();
        check_quota(key, others, value, self.quota)?;

        slots.insert(key.to_string(), value.to_string());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}
