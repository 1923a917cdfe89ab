//! Capped toggle selection shared by the shortlist and final-set stages.

use super::error::EngineError;
use super::types::{Item, SetKind};

/// Toggle `item` in `current`.
///
/// Present items are removed unconditionally. Absent items are appended only when
/// `item` is in the stage's domain and `current` holds fewer than `cap` entries.
/// Returns the new set; `current` is never touched.
pub fn toggle<F>(
    current: &[Item],
    item: &str,
    cap: usize,
    kind: SetKind,
    in_domain: F,
) -> Result<Vec<Item>, EngineError>
where
    F: Fn(&str) -> bool,
{
    if current.iter().any(|v| v == item) {
        return Ok(current.iter().filter(|v| *v != item).cloned().collect());
    }
    if !in_domain(item) {
        return Err(EngineError::UnknownItem {
            kind,
            item: item.to_string(),
        });
    }
    if current.len() >= cap {
        return Err(EngineError::CapacityExceeded { kind, cap });
    }
    let mut next = current.to_vec();
    next.push(item.to_string());
    Ok(next)
}

/// Require exactly `cap` entries before the stage may advance.
pub fn require_exact(current: &[Item], cap: usize, kind: SetKind) -> Result<(), EngineError> {
    if current.len() == cap {
        return Ok(());
    }
    Err(EngineError::IncompleteSelection {
        kind,
        required: cap,
        selected: current.len(),
        shortfall: cap.saturating_sub(current.len()),
    })
}

/// Keep only the members of `final_set` still present in `selection`, preserving order.
pub fn prune_to_selection(final_set: &[Item], selection: &[Item]) -> Vec<Item> {
    final_set
        .iter()
        .filter(|v| selection.contains(v))
        .cloned()
        .collect()
}
