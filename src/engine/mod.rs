//! Forced-choice narrowing and round-robin pairwise ranking.
//!
//! Pure computation: no IO, no async. The flow is
//! shortlist (K₁ of the universe) → final set (K₂ of the shortlist) →
//! every unordered pair of the final set decided → tournament ranking.

pub mod error;
pub mod matrix;
pub mod scoring;
pub mod selection;
pub mod session;
pub mod types;

pub use error::EngineError;
pub use matrix::{pair_key, pairs, split_pair_key, ComparisonRecord};
pub use scoring::{score, total_score};
pub use session::{Progress, Session, StageEvent, Workflow};
pub use types::{
    required_pair_count, Caps, Item, Ranking, SetKind, Stage, ValueScore, DEFAULT_REDUCTION_CAP,
    DEFAULT_SELECTION_CAP,
};
