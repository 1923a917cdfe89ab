//! Persisted session blob.
//!
//! The JSON shape is the boundary shared with the rest of the application and must
//! round-trip unchanged:
//!
//! ```json
//! {
//!   "top15Values": ["Trust", "..."],
//!   "final7Values": ["Trust", "..."],
//!   "pairwiseChoices": { "Trust-Joy": "Trust", "Joy-Trust": "Trust" },
//!   "valueScores": [ { "value": "Trust", "score": 6 } ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::engine::{pair_key, split_pair_key, ComparisonRecord, Session, ValueScore};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate item '{item}' in {field}")]
    Duplicate { field: &'static str, item: String },
    #[error("final item '{0}' is not in the shortlist")]
    NotInShortlist(String),
    #[error("cannot resolve pairwise key '{key}' with winner '{winner}'")]
    UnresolvedKey { key: String, winner: String },
    #[error("pairwise entries '{key}' and its mirror disagree")]
    MirrorMismatch { key: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "top15Values", default)]
    pub top15_values: Vec<String>,
    #[serde(rename = "final7Values", default)]
    pub final7_values: Vec<String>,
    #[serde(rename = "pairwiseChoices", default)]
    pub pairwise_choices: BTreeMap<String, String>,
    #[serde(rename = "valueScores", default)]
    pub value_scores: Vec<ValueScore>,
}

impl SessionState {
    /// The zeroed blob handed out for a session that does not exist yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(raw: &str) -> Result<Self, StateError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_session(session: &Session) -> Self {
        let pairwise_choices = session
            .comparisons
            .iter()
            .map(|(a, b, w)| (pair_key(a, b), w.clone()))
            .collect();
        Self {
            top15_values: session.selection.clone(),
            final7_values: session.final_set.clone(),
            pairwise_choices,
            value_scores: session.ranking.clone(),
        }
    }

    /// Decode into a `Session`, checking the structural invariants of the blob.
    ///
    /// An entry whose mirror is missing is accepted and mirrored; an entry whose mirror
    /// names a different winner is rejected.
    pub fn to_session(&self) -> Result<Session, StateError> {
        check_unique("top15Values", &self.top15_values)?;
        check_unique("final7Values", &self.final7_values)?;
        if let Some(stray) = self
            .final7_values
            .iter()
            .find(|v| !self.top15_values.contains(v))
        {
            return Err(StateError::NotInShortlist(stray.clone()));
        }

        let mut comparisons = ComparisonRecord::new();
        let mut repaired = 0usize;
        for (key, winner) in &self.pairwise_choices {
            let (a, b) = split_pair_key(key, winner).ok_or_else(|| StateError::UnresolvedKey {
                key: key.clone(),
                winner: winner.clone(),
            })?;
            match self.pairwise_choices.get(&pair_key(&b, &a)) {
                Some(mirror) if mirror != winner => {
                    return Err(StateError::MirrorMismatch { key: key.clone() });
                }
                Some(_) => {}
                None => repaired += 1,
            }
            comparisons
                .record(&a, &b, winner)
                .map_err(|_| StateError::UnresolvedKey {
                    key: key.clone(),
                    winner: winner.clone(),
                })?;
        }
        if repaired > 0 {
            tracing::warn!(repaired, "pairwise entries without mirror; mirrored on load");
        }

        Ok(Session {
            selection: self.top15_values.clone(),
            final_set: self.final7_values.clone(),
            comparisons,
            ranking: self.value_scores.clone(),
            last_updated: None,
        })
    }
}

fn check_unique(field: &'static str, items: &[String]) -> Result<(), StateError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item) {
            return Err(StateError::Duplicate {
                field,
                item: item.clone(),
            });
        }
    }
    Ok(())
}
