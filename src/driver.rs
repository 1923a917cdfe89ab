//! Async session driver: one session key, one store, writes serialized.
//!
//! Each operation runs against a copy of the workflow. When the resulting event
//! completes a stage, the copy is saved first and only committed once the store reports
//! success, so a failed save leaves the driver exactly where it was and the caller may
//! simply retry.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::{Caps, EngineError, Session, Stage, StageEvent, Workflow};
use crate::state::{SessionState, StateError};
use crate::store::{SessionKey, SessionStateStore, StoreError};
use crate::trace::{ActionTrace, TraceSink};
use crate::universe::CandidateUniverse;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("stored session is corrupt: {0}")]
    State(#[from] StateError),
}

impl DriverError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Engine(e) => e.is_recoverable(),
            Self::Store(_) => true,
            Self::State(_) => false,
        }
    }
}

pub struct SessionDriver {
    key: SessionKey,
    store: Arc<dyn SessionStateStore>,
    trace: Option<Arc<dyn TraceSink>>,
    workflow: Mutex<Workflow>,
}

impl SessionDriver {
    /// Fetch or create the session for `key` and resume it at the stage its data implies.
    pub async fn open(
        store: Arc<dyn SessionStateStore>,
        key: SessionKey,
        universe: Arc<CandidateUniverse>,
        caps: Caps,
    ) -> Result<Self, DriverError> {
        let stored = store.fetch_or_create(&key).await?;
        let mut session = stored.state.to_session()?;
        session.last_updated = Some(stored.updated_at);
        let workflow = Workflow::resume(universe, caps, session);
        tracing::info!(
            session = %key,
            stage = %workflow.stage(),
            selected = workflow.session().selection.len(),
            finalized = workflow.session().final_set.len(),
            "session opened"
        );
        Ok(Self {
            key,
            store,
            trace: None,
            workflow: Mutex::new(workflow),
        })
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub async fn stage(&self) -> Stage {
        self.workflow.lock().await.stage()
    }

    pub async fn session(&self) -> Session {
        self.workflow.lock().await.session().clone()
    }

    pub async fn workflow(&self) -> Workflow {
        self.workflow.lock().await.clone()
    }

    pub async fn toggle_selection(&self, item: &str) -> Result<StageEvent, DriverError> {
        self.apply("toggle_selection", |wf| wf.toggle_selection(item))
            .await
    }

    pub async fn toggle_final(&self, item: &str) -> Result<StageEvent, DriverError> {
        self.apply("toggle_final", |wf| wf.toggle_final(item)).await
    }

    pub async fn record_choice(
        &self,
        item_a: &str,
        item_b: &str,
        winner: &str,
    ) -> Result<StageEvent, DriverError> {
        self.apply("record_choice", |wf| wf.record_choice(item_a, item_b, winner))
            .await
    }

    /// Advance the stage; out of `Comparing` this scores and returns `Completed`.
    pub async fn advance(&self) -> Result<StageEvent, DriverError> {
        self.apply("advance", |wf| wf.advance()).await
    }

    pub async fn go_back(&self) -> Result<StageEvent, DriverError> {
        self.apply("go_back", |wf| wf.go_back()).await
    }

    /// Persist the current state unconditionally. Safe to repeat.
    pub async fn save(&self) -> Result<(), DriverError> {
        let mut workflow = self.workflow.lock().await;
        let updated_at = self.persist(workflow.session()).await?;
        let mut session = workflow.session().clone();
        session.last_updated = Some(updated_at);
        let stage = workflow.stage();
        workflow.set_state(stage, session);
        Ok(())
    }

    async fn apply<F>(&self, action: &str, op: F) -> Result<StageEvent, DriverError>
    where
        F: FnOnce(&mut Workflow) -> Result<StageEvent, EngineError>,
    {
        // Held across the save so two writes for this key can never overlap.
        let mut workflow = self.workflow.lock().await;
        let stage_before = workflow.stage();
        let mut candidate = workflow.clone();

        let event = match op(&mut candidate) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(session = %self.key, action, error = %e, "action rejected");
                self.record_trace(
                    action,
                    stage_before,
                    stage_before,
                    None,
                    false,
                    Some(e.to_string()),
                );
                return Err(e.into());
            }
        };

        let saved = event.requires_save();
        if saved {
            match self.persist(candidate.session()).await {
                Ok(updated_at) => {
                    let mut session = candidate.session().clone();
                    session.last_updated = Some(updated_at);
                    let stage = candidate.stage();
                    candidate.set_state(stage, session);
                }
                Err(e) => {
                    tracing::warn!(
                        session = %self.key,
                        action,
                        error = %e,
                        "save failed; transition not committed"
                    );
                    self.record_trace(
                        action,
                        stage_before,
                        stage_before,
                        Some(event),
                        false,
                        Some(e.to_string()),
                    );
                    return Err(e.into());
                }
            }
        }

        let stage_after = candidate.stage();
        if stage_after != stage_before {
            tracing::info!(
                session = %self.key,
                from = %stage_before,
                to = %stage_after,
                "stage changed"
            );
        }
        *workflow = candidate;
        self.record_trace(action, stage_before, stage_after, Some(event.clone()), saved, None);
        Ok(event)
    }

    async fn persist(&self, session: &Session) -> Result<i64, StoreError> {
        let state = SessionState::from_session(session);
        let stored = self.store.save(&self.key, &state).await?;
        tracing::debug!(session = %self.key, updated_at = stored.updated_at, "session saved");
        Ok(stored.updated_at)
    }

    fn record_trace(
        &self,
        action: &str,
        stage_before: Stage,
        stage_after: Stage,
        event: Option<StageEvent>,
        saved: bool,
        error: Option<String>,
    ) {
        let Some(trace) = &self.trace else {
            return;
        };
        let mut record = ActionTrace::now(self.key.to_string(), action, stage_before, stage_after);
        record.event = event;
        record.saved = saved;
        record.error = error;
        if let Err(e) = trace.record(record) {
            tracing::warn!(session = %self.key, error = %e, "failed to record action trace");
        }
    }
}
