use std::collections::BTreeMap;

use libid_core::identify::{Action, IdentificationState};
use libid_core::model::{CandidateSet, LibraryKind};
use libid_core::services::engine::{TrialEngine, TrialError};

/// Engine answering from a fixed table and enforcing the clear-before-apply contract.
#[derive(Default)]
struct TableEngine {
    counts: BTreeMap<String, i64>,
    cleared: bool,
    trials: Vec<String>,
}

impl TableEngine {
    fn new(counts: &[(&str, i64)]) -> Self {
        Self {
            counts: counts.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Default::default()
        }
    }
}

impl TrialEngine for TableEngine {
    fn clear_library_flags(&mut self) -> Result<(), TrialError> {
        self.cleared = true;
        Ok(())
    }

    fn apply_candidate(&mut self, candidate: &str) -> Result<i64, TrialError> {
        if !std::mem::replace(&mut self.cleared, false) {
            return Err(TrialError::FlagsNotCleared(candidate.to_string()));
        }
        self.trials.push(candidate.to_string());
        Ok(self.counts.get(candidate).copied().unwrap_or(0))
    }
}

fn candidates(ids: &[&str]) -> CandidateSet {
    ids.iter().copied().collect()
}

fn run_to_done(state: &mut IdentificationState, set: &CandidateSet, engine: &mut TableEngine) {
    for _ in 0..100 {
        let step = state.advance(set, engine).expect("advance");
        if step.action.is_done() && !step.dirty {
            return;
        }
    }
    panic!("identification did not converge");
}

#[test]
fn leader_is_determined_then_resolved() {
    let set = candidates(&["_libc_a", "_libc_b"]);
    let mut engine = TableEngine::new(&[("_libc_a", 10), ("_libc_b", 4)]);
    let mut state = IdentificationState::new();

    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeEstimate("_libc_a".into()));
    assert!(step.dirty);
    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeEstimate("_libc_b".into()));

    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeDetermine("_libc_a".into()));
    assert_eq!(state.determine.get("_libc_a"), Some(&10));
    assert!(state.result.is_none());

    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::Done);
    assert!(step.dirty);
    let result = state.result.clone().expect("result");
    assert_eq!(result.get(&LibraryKind::Libc), Some(&Some("_libc_a".to_string())));
    assert_eq!(result.get(&LibraryKind::Libgcc), Some(&None));
}

#[test]
fn advance_is_idempotent_once_done() {
    let set = candidates(&["_libc_a", "_libgcc_x"]);
    let mut engine = TableEngine::new(&[("_libc_a", 3), ("_libgcc_x", 9)]);
    let mut state = IdentificationState::new();
    run_to_done(&mut state, &set, &mut engine);

    let snapshot = state.clone();
    let trials = engine.trials.len();
    for _ in 0..3 {
        let step = state.advance(&set, &mut engine).unwrap();
        assert_eq!(step.action, Action::Done);
        assert!(!step.dirty);
    }
    assert_eq!(state, snapshot);
    assert_eq!(engine.trials.len(), trials, "no trial after the fixed point");
}

#[test]
fn every_probe_records_exactly_one_entry() {
    let set = candidates(&["_libc_a", "_libc_b", "_libc_c", "_libgcc_x", "_libgcc_y"]);
    let mut engine = TableEngine::new(&[
        ("_libc_a", 5),
        ("_libc_b", 8),
        ("_libc_c", 8),
        ("_libgcc_x", 2),
        ("_libgcc_y", 1),
    ]);
    let mut state = IdentificationState::new();
    let mut previous = state.to_json().unwrap();
    loop {
        let before = state.clone();
        let step = state.advance(&set, &mut engine).unwrap();
        let current = state.to_json().unwrap();
        if !step.dirty {
            assert_eq!(current, previous);
            break;
        }
        assert_ne!(current, previous, "dirty step {:?} left the document unchanged", step);

        let entries = |s: &IdentificationState| s.estimate.len() + s.determine.len();
        match &step.action {
            Action::ProbeEstimate(id) => {
                assert_eq!(entries(&state), entries(&before) + 1);
                assert!(!before.estimate.contains_key(id));
                assert!(state.estimate.contains_key(id));
                assert_eq!(state.determine, before.determine);
            }
            Action::ProbeDetermine(id) => {
                assert_eq!(entries(&state), entries(&before) + 1);
                assert!(!before.determine.contains_key(id));
                assert!(state.determine.contains_key(id));
                assert_eq!(state.estimate, before.estimate);
            }
            Action::Done => {
                assert_eq!(entries(&state), entries(&before));
                assert!(before.result.is_none() && state.result.is_some());
            }
        }
        previous = current;
    }
    let result = state.result.expect("result");
    assert_eq!(result[&LibraryKind::Libc].as_deref(), Some("_libc_b"));
    assert_eq!(result[&LibraryKind::Libgcc].as_deref(), Some("_libgcc_x"));
}

#[test]
fn stale_candidates_are_purged_and_result_cleared() {
    let mut state = IdentificationState::from_json(
        r#"{"estimate": {"_libc_x": 5, "_libc_y": 2},
            "determine": {"_libc_x": 5, "_libc_y": 2},
            "result": {"libc": "_libc_x", "libgcc": null}}"#,
    )
    .unwrap();
    let set = candidates(&["_libc_x"]);
    let mut engine = TableEngine::new(&[("_libc_x", 5)]);

    let step = state.advance(&set, &mut engine).unwrap();
    assert!(step.dirty);
    assert!(!state.estimate.contains_key("_libc_y"));
    assert!(!state.determine.contains_key("_libc_y"));
    // Purge forces a fresh resolution pass, which completes immediately here.
    assert_eq!(step.action, Action::Done);
    assert_eq!(state.result.unwrap()[&LibraryKind::Libc].as_deref(), Some("_libc_x"));
}

#[test]
fn purge_without_determine_reprobes_leader() {
    let mut state = IdentificationState::from_json(
        r#"{"estimate": {"_libc_x": 5, "_libc_y": 2}, "result": {"libc": "_libc_x"}}"#,
    )
    .unwrap();
    let set = candidates(&["_libc_x"]);
    let mut engine = TableEngine::new(&[("_libc_x", 5)]);

    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeDetermine("_libc_x".into()));
    assert!(state.result.is_none());
    assert_eq!(state.estimate.keys().collect::<Vec<_>>(), vec!["_libc_x"]);
}

#[test]
fn zero_counts_resolve_to_no_match() {
    let set = candidates(&["_libc_a", "_libgcc_b"]);
    let mut engine = TableEngine::new(&[]);
    let mut state = IdentificationState::new();
    run_to_done(&mut state, &set, &mut engine);

    let result = state.result.clone().unwrap();
    assert_eq!(result[&LibraryKind::Libc], None);
    assert_eq!(result[&LibraryKind::Libgcc], None);
    assert!(state.determine.is_empty(), "zero estimates are never determined");
    assert!(state.to_json().unwrap().contains("\"libc\": null"));
}

#[test]
fn empty_candidate_set_resolves_immediately() {
    let set = CandidateSet::new();
    let mut engine = TableEngine::new(&[]);
    let mut state = IdentificationState::new();
    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::Done);
    assert!(step.dirty);
    assert!(engine.trials.is_empty());
    assert!(state.chosen().is_empty());
}

#[test]
fn ties_go_to_the_smallest_candidate_id() {
    let set = candidates(&["_libc_b", "_libc_a"]);
    let mut engine = TableEngine::new(&[("_libc_a", 7), ("_libc_b", 7)]);
    let mut state = IdentificationState::new();
    state.advance(&set, &mut engine).unwrap();
    state.advance(&set, &mut engine).unwrap();

    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeDetermine("_libc_a".into()));

    run_to_done(&mut state, &set, &mut engine);
    assert_eq!(state.chosen(), vec!["_libc_a"]);
}

#[test]
fn negative_counts_are_recorded_as_zero() {
    let set = candidates(&["_libc_bad"]);
    let mut engine = TableEngine::new(&[("_libc_bad", -1)]);
    let mut state = IdentificationState::new();
    state.advance(&set, &mut engine).unwrap();
    assert_eq!(state.estimate.get("_libc_bad"), Some(&0));
}

#[test]
fn new_candidate_invalidates_result() {
    let mut set = candidates(&["_libc_a"]);
    let mut engine = TableEngine::new(&[("_libc_a", 3), ("_libc_c", 12)]);
    let mut state = IdentificationState::new();
    run_to_done(&mut state, &set, &mut engine);
    assert_eq!(state.chosen(), vec!["_libc_a"]);

    set.insert("_libc_c");
    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeEstimate("_libc_c".into()));
    assert!(state.result.is_none());

    run_to_done(&mut state, &set, &mut engine);
    assert_eq!(state.chosen(), vec!["_libc_c"]);
}

#[test]
fn determine_baseline_blocks_weaker_candidates() {
    // b estimates high but confirms low; a must still be probed since its
    // estimate reaches the confirmed baseline.
    let set = candidates(&["_libc_a", "_libc_b"]);
    let mut engine = TableEngine::new(&[("_libc_a", 6), ("_libc_b", 9)]);
    let mut state = IdentificationState::new();
    state.advance(&set, &mut engine).unwrap();
    state.advance(&set, &mut engine).unwrap();
    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeDetermine("_libc_b".into()));

    state.determine.insert("_libc_b".into(), 4);
    let step = state.advance(&set, &mut engine).unwrap();
    assert_eq!(step.action, Action::ProbeDetermine("_libc_a".into()));

    run_to_done(&mut state, &set, &mut engine);
    assert_eq!(state.chosen(), vec!["_libc_a"]);
}

#[test]
fn unknown_kinds_are_estimated_but_never_chosen() {
    let set = candidates(&["_libm_x", "_libc_a"]);
    let mut engine = TableEngine::new(&[("_libm_x", 50), ("_libc_a", 2)]);
    let mut state = IdentificationState::new();
    run_to_done(&mut state, &set, &mut engine);
    assert_eq!(state.estimate.get("_libm_x"), Some(&50));
    assert_eq!(state.chosen(), vec!["_libc_a"]);
}

#[test]
fn every_trial_is_preceded_by_a_clear() {
    let set = candidates(&["_libc_a", "_libc_b", "_libgcc_c"]);
    let mut engine = TableEngine::new(&[("_libc_a", 1), ("_libc_b", 2), ("_libgcc_c", 3)]);
    let mut state = IdentificationState::new();
    // TableEngine errors on any apply without a fresh clear.
    run_to_done(&mut state, &set, &mut engine);
    assert!(engine.trials.len() >= 3);
}

#[test]
fn standings_report_pending_leader() {
    let set = candidates(&["_libc_a", "_libc_b"]);
    let state = IdentificationState::from_json(
        r#"{"estimate": {"_libc_a": 4, "_libc_b": 9}, "determine": {"_libc_a": 4}}"#,
    )
    .unwrap();
    let standings = state.standings(&set);
    let libc = standings.iter().find(|s| s.kind == LibraryKind::Libc).unwrap();
    assert_eq!(libc.best, Some(("_libc_a".to_string(), 4)));
    assert_eq!(libc.best_determine, 4);
    assert_eq!(libc.pending, Some(("_libc_b".to_string(), 9)));
    assert!(!libc.is_resolved());
}
