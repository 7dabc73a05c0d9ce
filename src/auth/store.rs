// Token persistence
// Key-value stores holding the serialized token under a fixed key

use anyhow::{anyhow, Context, Result};
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::types::Token;

/// Key under which the token record is stored
pub const TOKEN_KEY: &str = "core-api:token";

/// Durable key-value store shared by every client that should see the same token
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store, the default when no store is supplied
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory token store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory token store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// SQLite-backed store; several processes may open the same file
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database and its `auth_kv` table
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening token store: {}", path.display());

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

        // Another process may be mid-write
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set SQLite busy timeout")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create auth_kv table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("SQLite token store lock poisoned"))?;
        conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("Failed to read {} from SQLite", key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("SQLite token store lock poisoned"))?;
        // Single statement, so concurrent writers never leave a half-written pair
        conn.execute(
            "INSERT INTO auth_kv (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )
        .with_context(|| format!("Failed to write {} to SQLite", key))?;
        Ok(())
    }
}

/// Read the token record. An unreadable record counts as absent.
pub fn load_token(store: &dyn TokenStore) -> Result<Option<Token>> {
    let Some(raw) = store.get(TOKEN_KEY)? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(token) => Ok(Some(token)),
        Err(e) => {
            tracing::warn!("Ignoring unparsable token record in store: {}", e);
            Ok(None)
        }
    }
}

/// Overwrite the token record with `token`
pub fn save_token(store: &dyn TokenStore, token: &Token) -> Result<()> {
    let raw = serde_json::to_string(token).context("Failed to serialize token")?;
    store.set(TOKEN_KEY, &raw)
}
