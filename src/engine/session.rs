//! Session aggregate and the stage-transition guard.
//!
//! `Session` is a plain value: every operation borrows it and returns a new session, or
//! an error with the input untouched. `Workflow` pairs a session with its universe, caps,
//! and current stage, and only lets the stage move forward when the stage invariant holds.

use std::sync::Arc;

use serde::Serialize;

use crate::universe::CandidateUniverse;

use super::error::EngineError;
use super::matrix::{self, ComparisonRecord};
use super::scoring;
use super::selection;
use super::types::{required_pair_count, Caps, Item, Ranking, SetKind, Stage};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub selection: Vec<Item>,
    pub final_set: Vec<Item>,
    pub comparisons: ComparisonRecord,
    pub ranking: Ranking,
    /// Epoch seconds of the last successful save, if any.
    pub last_updated: Option<i64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle an item in the shortlist. Final-set members that drop out of the shortlist
    /// are pruned, which also invalidates the ranking.
    pub fn toggle_selection(
        &self,
        universe: &CandidateUniverse,
        caps: Caps,
        item: &str,
    ) -> Result<Session, EngineError> {
        let selection = selection::toggle(
            &self.selection,
            item,
            caps.selection,
            SetKind::Selection,
            |v| universe.contains(v),
        )?;
        let final_set = selection::prune_to_selection(&self.final_set, &selection);
        Ok(self.with_sets(selection, final_set))
    }

    /// Toggle an item in the final set. Only shortlist members are candidates.
    pub fn toggle_final(&self, caps: Caps, item: &str) -> Result<Session, EngineError> {
        let final_set = selection::toggle(
            &self.final_set,
            item,
            caps.reduction,
            SetKind::Final,
            |v| self.selection.iter().any(|s| s == v),
        )?;
        Ok(self.with_sets(self.selection.clone(), final_set))
    }

    fn with_sets(&self, selection: Vec<Item>, final_set: Vec<Item>) -> Session {
        let ranking = if final_set == self.final_set {
            self.ranking.clone()
        } else {
            Vec::new()
        };
        Session {
            selection,
            final_set,
            comparisons: self.comparisons.clone(),
            ranking,
            last_updated: self.last_updated,
        }
    }

    /// Record the winner of one final-set pair, mirrored in both directions. A changed
    /// answer invalidates the ranking.
    pub fn record_choice(
        &self,
        item_a: &str,
        item_b: &str,
        winner: &str,
    ) -> Result<Session, EngineError> {
        for item in [item_a, item_b] {
            if !self.final_set.iter().any(|v| v == item) {
                return Err(EngineError::UnknownItem {
                    kind: SetKind::Final,
                    item: item.to_string(),
                });
            }
        }
        let mut next = self.clone();
        next.comparisons.record(item_a, item_b, winner)?;
        if self.comparisons.winner(item_a, item_b) != Some(winner) {
            next.ranking.clear();
        }
        Ok(next)
    }

    pub fn pairs(&self) -> Vec<(Item, Item)> {
        matrix::pairs(&self.final_set)
    }

    pub fn pending_pairs(&self) -> Vec<(Item, Item)> {
        self.comparisons.pending_pairs(&self.final_set)
    }

    pub fn is_complete(&self) -> bool {
        self.comparisons.is_complete(&self.final_set)
    }

    /// Scores for the current final set regardless of completeness.
    pub fn score(&self) -> Ranking {
        scoring::score(&self.final_set, &self.comparisons)
    }

    /// Recompute and store the ranking. Requires every pair to be decided.
    pub fn finish(&self) -> Result<Session, EngineError> {
        self.comparisons.require_complete(&self.final_set)?;
        let mut next = self.clone();
        next.ranking = self.score();
        Ok(next)
    }

    /// Stage implied by the data: used when a persisted session is reopened.
    pub fn infer_stage(&self, caps: Caps) -> Stage {
        if self.selection.len() < caps.selection {
            Stage::Selecting
        } else if self.final_set.len() < caps.reduction {
            Stage::Reducing
        } else if !self.is_complete() || self.ranking.is_empty() {
            Stage::Comparing
        } else {
            Stage::Complete
        }
    }

    pub fn progress(&self, caps: Caps) -> Progress {
        Progress {
            stage: self.infer_stage(caps),
            selected: self.selection.len(),
            selection_cap: caps.selection,
            finalized: self.final_set.len(),
            reduction_cap: caps.reduction,
            comparisons_recorded: self.comparisons.recorded_count(&self.final_set),
            comparisons_required: required_pair_count(self.final_set.len()),
        }
    }
}

/// Counters for progress displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub stage: Stage,
    pub selected: usize,
    pub selection_cap: usize,
    pub finalized: usize,
    pub reduction_cap: usize,
    pub comparisons_recorded: usize,
    pub comparisons_required: usize,
}

/// Outcome of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StageEvent {
    Toggled {
        kind: SetKind,
        item: Item,
        selected: bool,
        count: usize,
    },
    Advanced {
        from: Stage,
        to: Stage,
    },
    WentBack {
        from: Stage,
        to: Stage,
    },
    ChoiceRecorded {
        item_a: Item,
        item_b: Item,
        winner: Item,
        matrix_complete: bool,
    },
    /// Terminal event carrying the final ranking.
    Completed {
        ranking: Ranking,
    },
}

impl StageEvent {
    /// Events that complete a stage and must be persisted.
    pub fn requires_save(&self) -> bool {
        match self {
            Self::Advanced { .. } | Self::Completed { .. } => true,
            Self::ChoiceRecorded {
                matrix_complete, ..
            } => *matrix_complete,
            Self::Toggled { .. } | Self::WentBack { .. } => false,
        }
    }
}

/// A session bound to its universe and caps, with an explicit stage.
#[derive(Debug, Clone)]
pub struct Workflow {
    universe: Arc<CandidateUniverse>,
    caps: Caps,
    stage: Stage,
    session: Session,
}

impl Workflow {
    pub fn new(universe: Arc<CandidateUniverse>, caps: Caps) -> Self {
        Self::resume(universe, caps, Session::new())
    }

    /// Reopen a persisted session at the stage its data implies.
    ///
    /// Shortlist members no longer in the universe are dropped and a shortlist longer than
    /// the cap is cut back to its first `caps.selection` entries. Both cascade into the
    /// final set.
    pub fn resume(universe: Arc<CandidateUniverse>, caps: Caps, session: Session) -> Self {
        let mut session = session;
        let before = session.selection.len();
        session.selection.retain(|v| universe.contains(v));
        session.selection.truncate(caps.selection);
        if session.selection.len() != before {
            tracing::warn!(
                dropped = before - session.selection.len(),
                "shortlist no longer fits the universe or cap; pruning"
            );
        }
        let mut pruned = selection::prune_to_selection(&session.final_set, &session.selection);
        pruned.truncate(caps.reduction);
        if pruned != session.final_set {
            session.final_set = pruned;
            session.ranking.clear();
        }
        let stage = session.infer_stage(caps);
        Self {
            universe,
            caps,
            stage,
            session,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn caps(&self) -> Caps {
        self.caps
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn universe(&self) -> &CandidateUniverse {
        &self.universe
    }

    /// Candidates for the current toggle stage: the universe while selecting, the
    /// shortlist while reducing.
    pub fn candidates(&self) -> &[Item] {
        match self.stage {
            Stage::Selecting => self.universe.items(),
            _ => &self.session.selection,
        }
    }

    pub fn toggle_selection(&mut self, item: &str) -> Result<StageEvent, EngineError> {
        self.expect_stage(Stage::Selecting, "change the shortlist")?;
        let next = self
            .session
            .toggle_selection(&self.universe, self.caps, item)?;
        self.session = next;
        Ok(self.toggled(SetKind::Selection, item))
    }

    pub fn toggle_final(&mut self, item: &str) -> Result<StageEvent, EngineError> {
        self.expect_stage(Stage::Reducing, "change the final set")?;
        let next = self.session.toggle_final(self.caps, item)?;
        self.session = next;
        Ok(self.toggled(SetKind::Final, item))
    }

    fn toggled(&self, kind: SetKind, item: &str) -> StageEvent {
        let set = self.set_for(kind);
        StageEvent::Toggled {
            kind,
            item: item.to_string(),
            selected: set.iter().any(|v| v == item),
            count: set.len(),
        }
    }

    fn set_for(&self, kind: SetKind) -> &[Item] {
        match kind {
            SetKind::Selection => &self.session.selection,
            SetKind::Final => &self.session.final_set,
        }
    }

    pub fn record_choice(
        &mut self,
        item_a: &str,
        item_b: &str,
        winner: &str,
    ) -> Result<StageEvent, EngineError> {
        self.expect_stage(Stage::Comparing, "record a comparison")?;
        let next = self.session.record_choice(item_a, item_b, winner)?;
        self.session = next;
        Ok(StageEvent::ChoiceRecorded {
            item_a: item_a.to_string(),
            item_b: item_b.to_string(),
            winner: winner.to_string(),
            matrix_complete: self.session.is_complete(),
        })
    }

    /// Move to the next stage if the current stage's invariant holds. Advancing out of
    /// `Comparing` scores the matrix and yields `Completed`.
    pub fn advance(&mut self) -> Result<StageEvent, EngineError> {
        let (next_session, event) = self.preview_advance()?;
        if let Some(to) = self.stage.next() {
            self.stage = to;
        }
        self.session = next_session;
        Ok(event)
    }

    /// Compute the outcome of `advance` without applying it.
    pub fn preview_advance(&self) -> Result<(Session, StageEvent), EngineError> {
        let gated = match self.stage {
            Stage::Selecting => Some(SetKind::Selection),
            Stage::Reducing => Some(SetKind::Final),
            Stage::Comparing | Stage::Complete => None,
        };
        let to = self.stage.next().ok_or(EngineError::InvalidTransition {
            stage: self.stage,
            action: "advance",
        })?;
        if let Some(kind) = gated {
            selection::require_exact(self.set_for(kind), self.caps.for_kind(kind), kind)?;
            let event = StageEvent::Advanced {
                from: self.stage,
                to,
            };
            return Ok((self.session.clone(), event));
        }
        let finished = self.session.finish()?;
        let ranking = finished.ranking.clone();
        Ok((finished, StageEvent::Completed { ranking }))
    }

    /// Step back one stage. Downstream data is kept so re-entering resumes.
    pub fn go_back(&mut self) -> Result<StageEvent, EngineError> {
        let to = self.stage.previous().ok_or(EngineError::InvalidTransition {
            stage: self.stage,
            action: "go back",
        })?;
        let from = self.stage;
        self.stage = to;
        Ok(StageEvent::WentBack { from, to })
    }

    /// Replace the session wholesale, e.g. after a committed save.
    pub(crate) fn set_state(&mut self, stage: Stage, session: Session) {
        self.stage = stage;
        self.session = session;
    }

    fn expect_stage(&self, stage: Stage, action: &'static str) -> Result<(), EngineError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                stage: self.stage,
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe(n: usize) -> Arc<CandidateUniverse> {
        Arc::new(CandidateUniverse::new((0..n).map(|i| format!("v{i}"))).unwrap())
    }

    fn fill_selection(wf: &mut Workflow, n: usize) {
        for i in 0..n {
            wf.toggle_selection(&format!("v{i}")).unwrap();
        }
    }

    #[test]
    fn session_operations_leave_input_untouched() {
        let u = universe(5);
        let caps = Caps::new(3, 2);
        let s0 = Session::new();
        let s1 = s0.toggle_selection(&u, caps, "v1").unwrap();
        assert!(s0.selection.is_empty());
        assert_eq!(s1.selection, vec!["v1".to_string()]);
    }

    #[test]
    fn deselecting_shortlist_item_prunes_final_and_ranking() {
        let u = universe(5);
        let caps = Caps::new(3, 2);
        let mut s = Session::new();
        for v in ["v0", "v1", "v2"] {
            s = s.toggle_selection(&u, caps, v).unwrap();
        }
        s = s.toggle_final(caps, "v0").unwrap();
        s = s.toggle_final(caps, "v1").unwrap();
        s = s.record_choice("v0", "v1", "v1").unwrap();
        s = s.finish().unwrap();
        assert_eq!(s.ranking.len(), 2);

        let s = s.toggle_selection(&u, caps, "v0").unwrap();
        assert_eq!(s.final_set, vec!["v1".to_string()]);
        assert!(s.ranking.is_empty());
        // Comparison history is kept.
        assert_eq!(s.comparisons.winner("v0", "v1"), Some("v1"));
    }

    #[test]
    fn changing_an_answer_after_finishing_drops_the_ranking() {
        let caps = Caps::new(3, 2);
        let finished = Session {
            selection: vec!["v0".into(), "v1".into(), "v2".into()],
            final_set: vec!["v0".into(), "v1".into()],
            ..Session::default()
        }
        .record_choice("v0", "v1", "v1")
        .unwrap()
        .finish()
        .unwrap();
        assert_eq!(finished.infer_stage(caps), Stage::Complete);

        let same = finished.record_choice("v1", "v0", "v1").unwrap();
        assert_eq!(same.ranking, finished.ranking);

        let flipped = finished.record_choice("v0", "v1", "v0").unwrap();
        assert!(flipped.ranking.is_empty());
        assert_eq!(flipped.infer_stage(caps), Stage::Comparing);
        assert_eq!(flipped.finish().unwrap().ranking[0].value, "v0");
    }

    #[test]
    fn final_set_only_accepts_shortlist_members() {
        let caps = Caps::new(3, 2);
        let s = Session::new();
        assert!(matches!(
            s.toggle_final(caps, "v0"),
            Err(EngineError::UnknownItem {
                kind: SetKind::Final,
                ..
            })
        ));
    }

    #[test]
    fn workflow_walks_all_stages() {
        let mut wf = Workflow::new(universe(6), Caps::new(3, 2));
        assert_eq!(wf.stage(), Stage::Selecting);
        fill_selection(&mut wf, 3);
        assert!(matches!(
            wf.toggle_selection("v4"),
            Err(EngineError::CapacityExceeded { .. })
        ));
        assert_eq!(
            wf.advance().unwrap(),
            StageEvent::Advanced {
                from: Stage::Selecting,
                to: Stage::Reducing
            }
        );
        wf.toggle_final("v0").unwrap();
        wf.toggle_final("v2").unwrap();
        wf.advance().unwrap();
        assert_eq!(wf.stage(), Stage::Comparing);
        assert!(matches!(
            wf.advance(),
            Err(EngineError::IncompleteComparisons { remaining: 1, .. })
        ));
        let event = wf.record_choice("v2", "v0", "v2").unwrap();
        assert!(event.requires_save());
        let event = wf.advance().unwrap();
        match event {
            StageEvent::Completed { ranking } => {
                assert_eq!(ranking[0].value, "v2");
                assert_eq!(ranking[0].score, 1);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(wf.stage(), Stage::Complete);
        assert!(wf.advance().is_err());
        assert!(wf.go_back().is_err());
    }

    #[test]
    fn go_back_keeps_downstream_data() {
        let mut wf = Workflow::new(universe(6), Caps::new(3, 2));
        fill_selection(&mut wf, 3);
        wf.advance().unwrap();
        wf.toggle_final("v1").unwrap();
        wf.go_back().unwrap();
        assert_eq!(wf.stage(), Stage::Selecting);
        assert_eq!(wf.session().final_set, vec!["v1".to_string()]);
        wf.advance().unwrap();
        assert_eq!(wf.session().final_set, vec!["v1".to_string()]);
    }

    #[test]
    fn stage_guard_rejects_out_of_stage_operations() {
        let mut wf = Workflow::new(universe(6), Caps::new(3, 2));
        assert!(matches!(
            wf.toggle_final("v0"),
            Err(EngineError::InvalidTransition {
                stage: Stage::Selecting,
                ..
            })
        ));
        assert!(matches!(
            wf.record_choice("v0", "v1", "v0"),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn resume_infers_stage_and_prunes_foreign_items() {
        let u = universe(6);
        let caps = Caps::new(3, 2);
        let mut s = Session::new();
        s.selection = vec!["v0".into(), "v1".into(), "gone".into()];
        s.final_set = vec!["gone".into()];
        let wf = Workflow::resume(u.clone(), caps, s);
        assert_eq!(wf.stage(), Stage::Selecting);
        assert_eq!(wf.session().selection.len(), 2);
        assert!(wf.session().final_set.is_empty());

        let mut s = Session::new();
        s.selection = vec!["v0".into(), "v1".into(), "v2".into()];
        s.final_set = vec!["v0".into(), "v1".into()];
        s.comparisons.record("v0", "v1", "v0").unwrap();
        let wf = Workflow::resume(u.clone(), caps, s.clone());
        assert_eq!(wf.stage(), Stage::Comparing);

        let done = s.finish().unwrap();
        let wf = Workflow::resume(u, caps, done);
        assert_eq!(wf.stage(), Stage::Complete);
    }
}
