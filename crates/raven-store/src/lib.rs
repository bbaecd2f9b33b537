//! Persisted client state on SQLite.

pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Small persisted key-value store for client state that must survive a
/// restart: last visited channel, quick reactions and other preferences.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Could not open local store at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::prepare(conn)?;
        info!("Local store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self::prepare(Connection::open_in_memory()?)?;
        debug!("In-memory local store opened");
        Ok(store)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with exclusive access to the connection. A poisoned lock is
    /// taken over.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }
}
