//! SQLite database for persistent settings

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::settings::KeyValueStore;

/// Settings table inside an SQLite database file
pub struct SqliteSettings {
    conn: Mutex<Connection>,
}

impl SqliteSettings {
    /// Open or create database at path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open settings database {:?}", path))?;
        debug!("Opened settings database at {:?}", path);

        let settings = Self {
            conn: Mutex::new(conn),
        };
        settings.init_schema()?;
        Ok(settings)
    }

    /// Open a database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let settings = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        settings.init_schema()?;
        Ok(settings)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "CREATE TABLE IF NOT EXISTS settings (
                    key   TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL
                )",
                [],
            )
            .context("Failed to create settings table")?;
        Ok(())
    }
}

impl KeyValueStore for SqliteSettings {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read setting {}", key))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("Failed to write setting {}", key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to remove setting {}", key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let settings = SqliteSettings::open_in_memory().unwrap();

        assert_eq!(settings.get_string("history").unwrap(), None);

        settings.set_string("history", "[]").unwrap();
        settings.set_string("history", "[1]").unwrap();
        assert_eq!(settings.get_string("history").unwrap().as_deref(), Some("[1]"));

        settings.remove("history").unwrap();
        assert_eq!(settings.get_string("history").unwrap(), None);
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.db");

        {
            let settings = SqliteSettings::open(&path).unwrap();
            settings.set_string("k", "v").unwrap();
        }

        let reopened = SqliteSettings::open(&path).unwrap();
        assert_eq!(reopened.get_string("k").unwrap().as_deref(), Some("v"));
    }
}
