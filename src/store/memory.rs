//! In-memory session store for tests and embedding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{now_epoch, SessionKey, SessionStateStore, StoreError, StoredSession};
use crate::state::SessionState;

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionKey, StoredSession>>,
    saves: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored blob for `key` without creating one.
    pub fn get(&self, key: &SessionKey) -> Option<StoredSession> {
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.get(&key.normalized()).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStore {
    async fn fetch_or_create(&self, key: &SessionKey) -> Result<StoredSession, StoreError> {
        self.check_available()?;
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = sessions.entry(key.normalized()).or_insert_with(|| {
            let now = now_epoch();
            StoredSession {
                state: SessionState::empty(),
                created_at: now,
                updated_at: now,
            }
        });
        Ok(entry.clone())
    }

    async fn save(
        &self,
        key: &SessionKey,
        state: &SessionState,
    ) -> Result<StoredSession, StoreError> {
        self.check_available()?;
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = now_epoch();
        let key = key.normalized();
        let created_at = sessions.get(&key).map(|s| s.created_at).unwrap_or(now);
        let stored = StoredSession {
            state: state.clone(),
            created_at,
            updated_at: now,
        };
        sessions.insert(key, stored.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}
