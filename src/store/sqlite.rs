//! SQLite-backed session store.
//!
//! One row per (actor, method, group) holding the JSON blob in `result_text`. Sessions
//! may only be opened for registered methods.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tokio::sync::Semaphore;

use super::{now_epoch, SessionKey, SessionStateStore, StoreError, StoredSession};
use crate::state::SessionState;

#[derive(Debug, Clone, Serialize)]
pub struct MethodRow {
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub created_at: i64,
    pub updated_at: i64,
    pub state: SessionState,
}

#[derive(Clone)]
pub struct SqliteSessionStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    /// One blocking task at a time, so writes for the same key never overlap.
    sem: Arc<Semaphore>,
}

impl SqliteSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::create_tables(&conn)?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
            sem: Arc::new(Semaphore::new(1)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("PRIORITIZER_STORE_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".prioritizer_sessions.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exclusive advisory lock on `<store>.lock` for cross-process writers.
    pub fn lock_exclusive(&self) -> Result<StoreLock, StoreError> {
        StoreLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let guard = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    async fn blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        let _permit = self
            .sem
            .acquire()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    fn create_tables(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS methods (\
               name TEXT PRIMARY KEY,\
               description TEXT,\
               created_at INTEGER NOT NULL\
             );\
             CREATE TABLE IF NOT EXISTS method_sessions (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               actor_id TEXT NOT NULL,\
               method_name TEXT NOT NULL REFERENCES methods(name),\
               group_id TEXT NOT NULL DEFAULT '',\
               result_text TEXT NOT NULL,\
               created_at INTEGER NOT NULL,\
               updated_at INTEGER NOT NULL,\
               UNIQUE(actor_id, method_name, group_id)\
             );\
             CREATE INDEX IF NOT EXISTS idx_method_sessions_actor ON method_sessions(actor_id, updated_at);",
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Methods
    // -------------------------------------------------------------------------

    /// Register a method name. Re-registering updates the description.
    pub async fn register_method(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        let name = name.to_string();
        let description = description.map(str::to_string);
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO methods (name, description, created_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(name) DO UPDATE SET description = excluded.description",
                params![name, description, now_epoch()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_methods(&self) -> Result<Vec<MethodRow>, StoreError> {
        self.blocking(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, description, created_at FROM methods ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MethodRow {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Stored blob for `key`, if any. Never creates a row.
    pub async fn get(&self, key: &SessionKey) -> Result<Option<StoredSession>, StoreError> {
        let key = key.clone();
        self.blocking(move |conn| select_session(conn, &key)).await
    }

    /// All sessions for one actor, most recently updated first.
    pub async fn list_sessions(&self, actor_id: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let actor_id = actor_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT method_name, group_id, result_text, created_at, updated_at \
                 FROM method_sessions WHERE actor_id = ?1 ORDER BY updated_at DESC, id DESC",
            )?;
            let mut rows = stmt.query(params![actor_id])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let group: String = row.get(1)?;
                let raw: String = row.get(2)?;
                out.push(SessionSummary {
                    key: SessionKey {
                        actor_id: actor_id.clone(),
                        method_name: row.get(0)?,
                        group_id: (!group.is_empty()).then_some(group),
                    },
                    state: SessionState::from_json(&raw)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                });
            }
            Ok(out)
        })
        .await
    }
}

fn group_column(key: &SessionKey) -> &str {
    key.group_id.as_deref().unwrap_or("")
}

fn method_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM methods WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn select_session(conn: &Connection, key: &SessionKey) -> Result<Option<StoredSession>, StoreError> {
    let row: Option<(String, i64, i64)> = conn
        .query_row(
            "SELECT result_text, created_at, updated_at FROM method_sessions \
             WHERE actor_id = ?1 AND method_name = ?2 AND group_id = ?3",
            params![key.actor_id, key.method_name, group_column(key)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    match row {
        Some((raw, created_at, updated_at)) => Ok(Some(StoredSession {
            state: SessionState::from_json(&raw)?,
            created_at,
            updated_at,
        })),
        None => Ok(None),
    }
}

#[async_trait]
impl SessionStateStore for SqliteSessionStore {
    async fn fetch_or_create(&self, key: &SessionKey) -> Result<StoredSession, StoreError> {
        let key = key.clone();
        self.blocking(move |conn| {
            if !method_exists(conn, &key.method_name)? {
                return Err(StoreError::UnknownMethod(key.method_name.clone()));
            }
            if let Some(existing) = select_session(conn, &key)? {
                return Ok(existing);
            }
            let state = SessionState::empty();
            let now = now_epoch();
            conn.execute(
                "INSERT INTO method_sessions (actor_id, method_name, group_id, result_text, \
                 created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.actor_id,
                    key.method_name,
                    group_column(&key),
                    state.to_json()?,
                    now,
                    now,
                ],
            )?;
            tracing::debug!(session = %key, "created empty session");
            Ok(StoredSession {
                state,
                created_at: now,
                updated_at: now,
            })
        })
        .await
    }

    async fn save(
        &self,
        key: &SessionKey,
        state: &SessionState,
    ) -> Result<StoredSession, StoreError> {
        let key = key.clone();
        let state = state.clone();
        self.blocking(move |conn| {
            if !method_exists(conn, &key.method_name)? {
                return Err(StoreError::UnknownMethod(key.method_name.clone()));
            }
            let now = now_epoch();
            conn.execute(
                "INSERT INTO method_sessions (actor_id, method_name, group_id, result_text, \
                 created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(actor_id, method_name, group_id) DO UPDATE SET \
                    result_text = excluded.result_text, \
                    updated_at = excluded.updated_at",
                params![
                    key.actor_id,
                    key.method_name,
                    group_column(&key),
                    state.to_json()?,
                    now,
                    now,
                ],
            )?;
            select_session(conn, &key)?
                .ok_or_else(|| StoreError::Unavailable(format!("session {key} vanished after save")))
        })
        .await
    }
}

#[derive(Debug)]
pub struct StoreLock {
    _file: std::fs::File,
}

impl StoreLock {
    fn new(db_path: &Path) -> Result<Self, StoreError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}
