//! Symmetric pairwise comparison record.
//!
//! Every recorded comparison is stored under both directional keys with the same winner,
//! so `winner(a, b) == winner(b, a)` holds after every write. Pair enumeration follows
//! the upper triangle of the final set's order; that order is for presentation only and
//! never influences scoring.

use std::collections::BTreeMap;

use super::error::EngineError;
use super::types::{required_pair_count, Item};

/// Separator used by the persisted `"A-B"` key format.
pub const PAIR_KEY_SEPARATOR: char = '-';

/// Directional storage key `"A-B"`.
pub fn pair_key(a: &str, b: &str) -> String {
    format!("{a}{PAIR_KEY_SEPARATOR}{b}")
}

/// Recover `(A, B)` from a persisted `"A-B"` key using its winner.
///
/// Labels may themselves contain `-` ("Self-esteem"), so the key is split where the
/// winner sits: either `"{winner}-{other}"` or `"{other}-{winner}"`. Returns `None` when
/// the winner matches neither side or both sides yield different splits.
pub fn split_pair_key(key: &str, winner: &str) -> Option<(Item, Item)> {
    let as_first = key
        .strip_prefix(winner)
        .and_then(|rest| rest.strip_prefix(PAIR_KEY_SEPARATOR))
        .filter(|other| !other.is_empty() && *other != winner)
        .map(|other| (winner.to_string(), other.to_string()));
    let as_second = key
        .strip_suffix(winner)
        .and_then(|rest| rest.strip_suffix(PAIR_KEY_SEPARATOR))
        .filter(|other| !other.is_empty() && *other != winner)
        .map(|other| (other.to_string(), winner.to_string()));

    match (as_first, as_second) {
        (Some(a), Some(b)) if a != b => None,
        (Some(a), _) => Some(a),
        (None, b) => b,
    }
}

/// Unordered pairs `(items[i], items[j])` with `i < j`.
pub fn pairs(items: &[Item]) -> Vec<(Item, Item)> {
    let mut out = Vec::with_capacity(required_pair_count(items.len()));
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            out.push((items[i].clone(), items[j].clone()));
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonRecord {
    entries: BTreeMap<(Item, Item), Item>,
}

impl ComparisonRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `winner` for the unordered pair {item_a, item_b}, overwriting any prior
    /// result in both directions.
    pub fn record(&mut self, item_a: &str, item_b: &str, winner: &str) -> Result<(), EngineError> {
        if item_a == item_b || (winner != item_a && winner != item_b) {
            return Err(EngineError::InvalidWinner {
                item_a: item_a.to_string(),
                item_b: item_b.to_string(),
                winner: winner.to_string(),
            });
        }
        self.entries.insert(
            (item_a.to_string(), item_b.to_string()),
            winner.to_string(),
        );
        self.entries.insert(
            (item_b.to_string(), item_a.to_string()),
            winner.to_string(),
        );
        Ok(())
    }

    pub fn winner(&self, item_a: &str, item_b: &str) -> Option<&str> {
        self.entries
            .get(&(item_a.to_string(), item_b.to_string()))
            .map(String::as_str)
    }

    /// Number of directional entries (twice the number of recorded pairs).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Directional entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Item, &Item, &Item)> {
        self.entries.iter().map(|((a, b), w)| (a, b, w))
    }

    /// Pairs over `items` that already have a winner.
    pub fn recorded_count(&self, items: &[Item]) -> usize {
        pairs(items)
            .iter()
            .filter(|(a, b)| self.winner(a, b).is_some())
            .count()
    }

    /// Pairs over `items` still waiting for a winner, in canonical order.
    pub fn pending_pairs(&self, items: &[Item]) -> Vec<(Item, Item)> {
        pairs(items)
            .into_iter()
            .filter(|(a, b)| self.winner(a, b).is_none())
            .collect()
    }

    pub fn is_complete(&self, items: &[Item]) -> bool {
        self.recorded_count(items) == required_pair_count(items.len())
    }

    pub fn require_complete(&self, items: &[Item]) -> Result<(), EngineError> {
        let required = required_pair_count(items.len());
        let recorded = self.recorded_count(items);
        if recorded == required {
            return Ok(());
        }
        Err(EngineError::IncompleteComparisons {
            recorded,
            required,
            remaining: required - recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> Vec<Item> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pairs_follow_upper_triangle() {
        let p = pairs(&items(&["a", "b", "c"]));
        assert_eq!(
            p,
            vec![
                ("a".to_string(), "b".to_string()),
                ("a".to_string(), "c".to_string()),
                ("b".to_string(), "c".to_string()),
            ]
        );
        assert_eq!(pairs(&items(&["a", "b", "c", "d", "e", "f", "g"])).len(), 21);
    }

    #[test]
    fn record_writes_both_directions() {
        let mut record = ComparisonRecord::new();
        record.record("a", "b", "b").unwrap();
        assert_eq!(record.winner("a", "b"), Some("b"));
        assert_eq!(record.winner("b", "a"), Some("b"));
        assert_eq!(record.len(), 2);

        record.record("b", "a", "a").unwrap();
        assert_eq!(record.winner("a", "b"), Some("a"));
        assert_eq!(record.winner("b", "a"), Some("a"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn record_rejects_foreign_winner_and_self_pairs() {
        let mut record = ComparisonRecord::new();
        assert!(matches!(
            record.record("a", "b", "c"),
            Err(EngineError::InvalidWinner { .. })
        ));
        assert!(matches!(
            record.record("a", "a", "a"),
            Err(EngineError::InvalidWinner { .. })
        ));
        assert!(record.is_empty());
    }

    #[test]
    fn completeness_counts_unordered_pairs() {
        let set = items(&["a", "b", "c"]);
        let mut record = ComparisonRecord::new();
        record.record("a", "b", "a").unwrap();
        assert_eq!(record.recorded_count(&set), 1);
        assert_eq!(
            record.require_complete(&set),
            Err(EngineError::IncompleteComparisons {
                recorded: 1,
                required: 3,
                remaining: 2
            })
        );
        assert_eq!(
            record.pending_pairs(&set),
            vec![
                ("a".to_string(), "c".to_string()),
                ("b".to_string(), "c".to_string())
            ]
        );
        record.record("c", "a", "c").unwrap();
        record.record("c", "b", "b").unwrap();
        assert!(record.is_complete(&set));
    }

    #[test]
    fn split_pair_key_handles_hyphenated_labels() {
        assert_eq!(
            split_pair_key("Self-esteem-Trust", "Trust"),
            Some(("Self-esteem".to_string(), "Trust".to_string()))
        );
        assert_eq!(
            split_pair_key("Self-esteem-Trust", "Self-esteem"),
            Some(("Self-esteem".to_string(), "Trust".to_string()))
        );
        assert_eq!(split_pair_key("a-b", "c"), None);
        assert_eq!(split_pair_key("a-a", "a"), None);
    }
}
