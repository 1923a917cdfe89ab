//! Core value types shared by the engine stages.

use serde::{Deserialize, Serialize};

/// An opaque label drawn from the candidate universe.
pub type Item = String;

/// Default shortlist cap (K₁).
pub const DEFAULT_SELECTION_CAP: usize = 15;
/// Default final-set cap (K₂).
pub const DEFAULT_REDUCTION_CAP: usize = 7;

/// Stage of the narrowing workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Selecting,
    Reducing,
    Comparing,
    Complete,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Reducing => "reducing",
            Self::Comparing => "comparing",
            Self::Complete => "complete",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Selecting => Some(Self::Reducing),
            Self::Reducing => Some(Self::Comparing),
            Self::Comparing => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Previous stage reachable through `go_back`. `Complete` is terminal.
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::Selecting | Self::Complete => None,
            Self::Reducing => Some(Self::Selecting),
            Self::Comparing => Some(Self::Reducing),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which capped set a toggle or advance applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetKind {
    /// Shortlist drawn from the universe (K₁).
    Selection,
    /// Final set drawn from the shortlist (K₂).
    Final,
}

impl std::fmt::Display for SetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Selection => f.write_str("selection"),
            Self::Final => f.write_str("final"),
        }
    }
}

/// Stage caps. The reduction cap must be strictly smaller than the selection cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caps {
    pub selection: usize,
    pub reduction: usize,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            selection: DEFAULT_SELECTION_CAP,
            reduction: DEFAULT_REDUCTION_CAP,
        }
    }
}

impl Caps {
    pub fn new(selection: usize, reduction: usize) -> Self {
        Self {
            selection,
            reduction,
        }
    }

    pub fn for_kind(&self, kind: SetKind) -> usize {
        match kind {
            SetKind::Selection => self.selection,
            SetKind::Final => self.reduction,
        }
    }

    /// Check 2 ≤ K₂ < K₁ ≤ universe size.
    pub fn validate(&self, universe_len: usize) -> Result<(), String> {
        if self.reduction < 2 {
            return Err(format!(
                "reduction cap must be at least 2 to compare anything, got {}",
                self.reduction
            ));
        }
        if self.reduction >= self.selection {
            return Err(format!(
                "reduction cap ({}) must be smaller than selection cap ({})",
                self.reduction, self.selection
            ));
        }
        if self.selection > universe_len {
            return Err(format!(
                "selection cap ({}) exceeds universe size ({universe_len})",
                self.selection
            ));
        }
        Ok(())
    }
}

/// Number of unordered pairs over `n` items: n·(n-1)/2.
pub fn required_pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Tournament score for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueScore {
    pub value: Item,
    pub score: u32,
}

/// Scores sorted descending, ties in final-set order.
pub type Ranking = Vec<ValueScore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_counts() {
        assert_eq!(required_pair_count(0), 0);
        assert_eq!(required_pair_count(1), 0);
        assert_eq!(required_pair_count(2), 1);
        assert_eq!(required_pair_count(3), 3);
        assert_eq!(required_pair_count(7), 21);
    }

    #[test]
    fn caps_validation() {
        assert!(Caps::default().validate(57).is_ok());
        assert!(Caps::new(7, 7).validate(57).is_err());
        assert!(Caps::new(15, 1).validate(57).is_err());
        assert!(Caps::new(15, 7).validate(10).is_err());
    }

    #[test]
    fn complete_is_terminal() {
        assert_eq!(Stage::Complete.next(), None);
        assert_eq!(Stage::Complete.previous(), None);
        assert_eq!(Stage::Comparing.previous(), Some(Stage::Reducing));
    }
}
