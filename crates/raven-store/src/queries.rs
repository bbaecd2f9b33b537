use crate::LocalStore;
use crate::models::{DEFAULT_QUICK_REACTIONS, EntryRow, keys};
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;

impl LocalStore {
    // -- Raw entries --

    pub fn get_entry(&self, key: &str) -> Result<Option<EntryRow>> {
        self.with_conn(|conn| query_entry(conn, key))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    // -- Typed values --

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_entry(key)? {
            Some(row) => {
                let value = serde_json::from_str(&row.value)
                    .with_context(|| format!("Corrupt value for key '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                (key, &json),
            )?;
            Ok(())
        })
    }

    // -- Client preferences --

    pub fn last_channel(&self) -> Result<Option<String>> {
        self.get(keys::LAST_CHANNEL)
    }

    pub fn set_last_channel(&self, channel_id: &str) -> Result<()> {
        self.set(keys::LAST_CHANNEL, &channel_id)
    }

    pub fn quick_reactions(&self) -> Result<Vec<String>> {
        Ok(self
            .get::<Vec<String>>(keys::QUICK_REACTIONS)?
            .unwrap_or_else(|| DEFAULT_QUICK_REACTIONS.iter().map(|e| e.to_string()).collect()))
    }

    pub fn set_quick_reactions(&self, emojis: &[String]) -> Result<()> {
        self.set(keys::QUICK_REACTIONS, &emojis)
    }
}

fn query_entry(conn: &Connection, key: &str) -> Result<Option<EntryRow>> {
    conn.query_row(
        "SELECT key, value, updated_at FROM kv WHERE key = ?1",
        [key],
        |row| {
            Ok(EntryRow {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("Could not read key '{}'", key))
}
