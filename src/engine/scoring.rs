//! Tournament scoring: one point per unordered pair won.

use super::matrix::ComparisonRecord;
use super::types::{Item, Ranking, ValueScore};

/// Score every item of `final_set` and sort descending.
///
/// Unrecorded pairs contribute nothing. Entries for items outside `final_set` are
/// ignored. `sort_by` is stable, so tied items keep their final-set order.
pub fn score(final_set: &[Item], record: &ComparisonRecord) -> Ranking {
    let mut ranking: Ranking = final_set
        .iter()
        .map(|item| ValueScore {
            value: item.clone(),
            score: 0,
        })
        .collect();

    for (i, j) in index_pairs(final_set.len()) {
        let (a, b) = (&final_set[i], &final_set[j]);
        match record.winner(a, b) {
            Some(w) if w == a => ranking[i].score += 1,
            Some(w) if w == b => ranking[j].score += 1,
            _ => {}
        }
    }

    ranking.sort_by(|x, y| y.score.cmp(&x.score));
    ranking
}

fn index_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j)))
}

/// Sum of all scores in a ranking.
pub fn total_score(ranking: &[ValueScore]) -> usize {
    ranking.iter().map(|v| v.score as usize).sum()
}
