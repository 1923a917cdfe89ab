//! Session persistence.
//!
//! The engine never does IO itself; callers inject a `SessionStateStore`. Saves are
//! full overwrites of the JSON blob, so repeating a save is always safe.

pub mod memory;
pub mod sqlite;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::state::{SessionState, StateError};

pub use memory::InMemorySessionStore;
pub use sqlite::{SqliteSessionStore, StoreLock};

/// Identifies one session: who is working, on which method, optionally for which group.
/// An empty group is the same session as no group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub actor_id: String,
    pub method_name: String,
    #[serde(default, deserialize_with = "deserialize_group")]
    pub group_id: Option<String>,
}

fn deserialize_group<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|g| !g.is_empty()))
}

impl SessionKey {
    pub fn new(actor_id: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            method_name: method_name.into(),
            group_id: None,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        let group_id = group_id.into();
        self.group_id = (!group_id.is_empty()).then_some(group_id);
        self
    }

    /// Same key with `Some("")` folded into `None`, for keys built field by field.
    pub fn normalized(&self) -> Self {
        let mut key = self.clone();
        if key.group_id.as_deref() == Some("") {
            key.group_id = None;
        }
        key
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.group_id {
            Some(group) => write!(f, "{}/{}@{}", self.actor_id, self.method_name, group),
            None => write!(f, "{}/{}", self.actor_id, self.method_name),
        }
    }
}

/// A blob as held by the store, with its timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub state: SessionState,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("task join error: {0}")]
    Join(String),
    #[error("method '{0}' not found; register it first")]
    UnknownMethod(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Return the stored blob for `key`, creating the zeroed blob if none exists.
    async fn fetch_or_create(&self, key: &SessionKey) -> Result<StoredSession, StoreError>;

    /// Overwrite the blob for `key`.
    async fn save(&self, key: &SessionKey, state: &SessionState)
        -> Result<StoredSession, StoreError>;
}

pub(crate) fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
