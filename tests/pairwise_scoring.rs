use pairwise_prioritizer::engine::{
    pairs, required_pair_count, score, total_score, ComparisonRecord, EngineError, Session,
};
use pairwise_prioritizer::ValueScore;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn items(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn scores(pairs: &[(&str, u32)]) -> Vec<ValueScore> {
    pairs
        .iter()
        .map(|(value, score)| ValueScore {
            value: value.to_string(),
            score: *score,
        })
        .collect()
}

fn session_with_final(names: &[&str]) -> Session {
    Session {
        selection: items(names),
        final_set: items(names),
        ..Session::default()
    }
}

#[test]
fn three_item_round_robin() {
    let mut session = session_with_final(&["A", "B", "C"]);
    for (a, b, w) in [("A", "B", "A"), ("B", "C", "B"), ("A", "C", "A")] {
        session = session.record_choice(a, b, w).unwrap();
    }
    assert!(session.is_complete());

    let done = session.finish().unwrap();
    assert_eq!(done.ranking, scores(&[("A", 2), ("B", 1), ("C", 0)]));
}

#[test]
fn one_choice_completes_a_pair() {
    let session = session_with_final(&["A", "B"]);
    assert_eq!(session.pending_pairs().len(), 1);

    let session = session.record_choice("A", "B", "A").unwrap();
    assert!(session.is_complete());
    assert_eq!(session.comparisons.winner("B", "A"), Some("A"));
    assert!(session.pending_pairs().is_empty());
}

#[test]
fn rerecording_overwrites_both_directions() {
    let session = session_with_final(&["A", "B"])
        .record_choice("A", "B", "A")
        .unwrap()
        .record_choice("B", "A", "B")
        .unwrap();

    assert_eq!(session.comparisons.winner("A", "B"), Some("B"));
    assert_eq!(session.comparisons.winner("B", "A"), Some("B"));
    let ranking = session.finish().unwrap().ranking;
    assert_eq!(ranking, scores(&[("B", 1), ("A", 0)]));
    assert_eq!(total_score(&ranking), 1);
}

#[test]
fn ties_keep_final_set_order() {
    let mut session = session_with_final(&["A", "B", "C", "D"]);
    for (a, b, w) in [
        ("A", "B", "B"),
        ("A", "C", "A"),
        ("A", "D", "A"),
        ("B", "C", "C"),
        ("B", "D", "B"),
        ("C", "D", "D"),
    ] {
        session = session.record_choice(a, b, w).unwrap();
    }
    let ranking = session.finish().unwrap().ranking;
    assert_eq!(
        ranking,
        scores(&[("A", 2), ("B", 2), ("C", 1), ("D", 1)])
    );
}

#[test]
fn winner_must_be_one_of_the_pair() {
    let session = session_with_final(&["A", "B", "C"]);
    let err = session.record_choice("A", "B", "C").unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidWinner {
            item_a: "A".to_string(),
            item_b: "B".to_string(),
            winner: "C".to_string(),
        }
    );
    assert!(session.comparisons.is_empty());

    assert!(matches!(
        session.record_choice("A", "Z", "A"),
        Err(EngineError::UnknownItem { .. })
    ));
}

#[test]
fn finishing_early_reports_remaining_pairs() {
    let session = session_with_final(&["A", "B", "C"])
        .record_choice("A", "C", "C")
        .unwrap();
    assert_eq!(
        session.finish().unwrap_err(),
        EngineError::IncompleteComparisons {
            recorded: 1,
            required: 3,
            remaining: 2,
        }
    );
    // Partial scores are still available for display.
    assert_eq!(session.score()[0], ValueScore { value: "C".to_string(), score: 1 });
}

#[test]
fn seven_items_need_twenty_one_comparisons() {
    let final_set: Vec<String> = (0..7).map(|i| format!("v{i}")).collect();
    assert_eq!(pairs(&final_set).len(), 21);
    assert_eq!(required_pair_count(final_set.len()), 21);
}

#[test]
fn mirror_and_score_sum_hold_for_any_answer_order() {
    let final_set: Vec<String> = (0..7).map(|i| format!("v{i}")).collect();
    for seed in 0..25u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order = pairs(&final_set);
        order.shuffle(&mut rng);

        let mut record = ComparisonRecord::new();
        for (a, b) in &order {
            let (first, second) = if rng.gen_bool(0.5) { (a, b) } else { (b, a) };
            let winner = if rng.gen_bool(0.5) { first } else { second };
            record.record(first, second, winner).unwrap();

            for (x, y, w) in record.iter() {
                assert_eq!(record.winner(y, x), Some(w.as_str()));
            }
        }

        assert!(record.is_complete(&final_set));
        let ranking = score(&final_set, &record);
        assert_eq!(total_score(&ranking), 21, "seed {seed}");
        assert!(ranking.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[test]
fn entries_outside_the_final_set_do_not_score() {
    let mut record = ComparisonRecord::new();
    record.record("A", "B", "A").unwrap();
    record.record("A", "X", "X").unwrap();

    let ranking = score(&items(&["A", "B"]), &record);
    assert_eq!(ranking, scores(&[("A", 1), ("B", 0)]));
}
