//! SQLite-backed key-value store

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::Result;

use super::{check_quota, KeyValueStore, UpdateFn};

/// How long a write waits for another process holding the store
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Key-value slots in a single SQLite table (single connection)
pub struct SqliteStore {
    conn: Mutex<Connection>,
    quota: usize,
}

impl SqliteStore {
    /// Open or create a store at the given path and run migrations
    pub fn open(path: &Path, quota: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            quota,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(quota: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            quota,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations on this store
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Total bytes currently stored
    pub fn used_bytes(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        used_bytes_except(&conn, None)
    }

    /// Configured byte quota
    pub fn quota(&self) -> usize {
        self.quota
    }
}

fn used_bytes_except(conn: &Connection, key: Option<&str>) -> Result<usize> {
    let used: i64 = conn.query_row(
        "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
         FROM kv WHERE ?1 IS NULL OR key != ?1",
        [key],
        |r| r.get(0),
    )?;
    Ok(used as usize)
}

fn read_slot(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", [key], |r| r.get(0))
        .optional()?;
    Ok(value)
}

fn write_slot(conn: &Connection, key: &str, value: &str, quota: usize) -> Result<()> {
    check_quota(key, used_bytes_except(conn, Some(key))?, value, quota)?;

    conn.execute(
        r#"
        INSERT INTO kv (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![key, value, Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        read_slot(&conn, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        write_slot(&conn, key, value, self.quota)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Runs inside `BEGIN IMMEDIATE`, so concurrent writers (in this or
    /// another process) wait for the commit instead of overwriting it.
    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = read_slot(&tx, key)?;
        if let Some(next) = f(current)? {
            write_slot(&tx, key, &next, self.quota)?;
        }

        tx.commit()?;
        Ok(())
    }
}
