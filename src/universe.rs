//! Candidate universe: the fixed vocabulary a session narrows down from.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::engine::matrix::{pair_key, split_pair_key, PAIR_KEY_SEPARATOR};

/// Built-in value vocabulary offered by the values workshop.
pub const DEFAULT_VALUES: &[&str] = &[
    "Agility", "Transparency", "Modernity", "Mindfulness", "Caring", "Dignity", "Humility",
    "Courage", "Honesty", "Learning", "Integrity", "Reliability", "Loyalty", "Self-esteem",
    "Risk taking", "Openness", "Peace", "Intuition", "Solidarity", "Enthusiasm", "Dedication",
    "Optimism", "Freedom", "Tolerance", "Curiosity", "Trust", "Authenticity", "Security",
    "Sustainability", "Responsibility", "Sense of duty", "Generosity", "Health", "Joy",
    "Perfection", "Warmth", "Respect", "Empathy", "Sensitivity", "Attention", "Humor",
    "Austerity", "Justice", "Team Spirit", "Effectiveness", "Kindness", "Creativity",
    "Passion", "Control", "Impact", "Determination", "Endurance", "Consequence",
    "Efficiency", "Winning", "Pragmatism",
];

#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    #[error("universe item {index} is empty")]
    EmptyLabel { index: usize },
    #[error("duplicate universe item: {0}")]
    Duplicate(String),
    #[error("universe file looks like JSON but failed to parse: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("items '{first}' and '{second}' produce an ambiguous pairwise key '{key}'")]
    AmbiguousPairKey {
        first: String,
        second: String,
        key: String,
    },
}

/// Immutable, duplicate-free list of items eligible for ranking.
///
/// Enumeration order is the order the items were supplied in. Membership is by exact
/// string equality.
#[derive(Debug, Clone)]
pub struct CandidateUniverse {
    items: Vec<String>,
    index: HashSet<String>,
}

impl CandidateUniverse {
    pub fn new<I, S>(items: I) -> Result<Self, UniverseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut index = HashSet::new();
        for (i, item) in items.into_iter().enumerate() {
            let item: String = item.into();
            if item.trim().is_empty() {
                return Err(UniverseError::EmptyLabel { index: i });
            }
            if !index.insert(item.clone()) {
                return Err(UniverseError::Duplicate(item));
            }
            ordered.push(item);
        }
        check_pair_keys(&ordered)?;
        Ok(Self {
            items: ordered,
            index,
        })
    }

    /// The built-in values vocabulary.
    pub fn default_values() -> Self {
        Self {
            items: DEFAULT_VALUES.iter().map(|v| v.to_string()).collect(),
            index: DEFAULT_VALUES.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Parse either a JSON array of strings or plain text with one item per line.
    /// Blank lines and blank JSON entries are skipped.
    pub fn parse(content: &str) -> Result<Self, UniverseError> {
        let trimmed = content.trim();
        if trimmed.starts_with('[') {
            let items: Vec<String> = serde_json::from_str(trimmed)?;
            Self::new(items.into_iter().filter(|s| !s.trim().is_empty()))
        } else {
            Self::new(
                trimmed
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty()),
            )
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, UniverseError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn contains(&self, item: &str) -> bool {
        self.index.contains(item)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Every ordered pair must map to its own `"A-B"` key, and that key must split back into
/// the same pair whichever side won. Only labels containing the separator can break this,
/// so only pairs involving one are checked.
fn check_pair_keys(items: &[String]) -> Result<(), UniverseError> {
    let mut seen: HashMap<String, (&str, &str)> = HashMap::new();
    for hyphenated in items.iter().filter(|v| v.contains(PAIR_KEY_SEPARATOR)) {
        for other in items.iter().filter(|v| *v != hyphenated) {
            for (a, b) in [(hyphenated, other), (other, hyphenated)] {
                let key = pair_key(a, b);
                let expected = Some((a.clone(), b.clone()));
                let splits_back =
                    split_pair_key(&key, a) == expected && split_pair_key(&key, b) == expected;
                let collides = seen
                    .get(&key)
                    .copied()
                    .is_some_and(|prior| prior != (a.as_str(), b.as_str()));
                if !splits_back || collides {
                    return Err(UniverseError::AmbiguousPairKey {
                        first: a.clone(),
                        second: b.clone(),
                        key,
                    });
                }
                seen.insert(key, (a.as_str(), b.as_str()));
            }
        }
    }
    Ok(())
}
