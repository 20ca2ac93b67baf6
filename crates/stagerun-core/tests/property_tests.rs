//! # Property-Based Tests
//!
//! Selection and ordering invariants of the runner, checked with proptest.

use proptest::collection::btree_set;
use proptest::prelude::*;
use stagerun_core::{ActionError, RunBounds, StageIndex, StageRunner, StageSpec, StageTable};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<u32>>>;

fn recording_runner(indices: &BTreeSet<u32>, fail: Option<u32>) -> (StageRunner, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let stages = indices
        .iter()
        .map(|&index| {
            let log = Arc::clone(&log);
            StageSpec::new(index, format!("s{index}"), "c.json", move |_: &Path| {
                log.lock().expect("lock").push(index);
                if fail == Some(index) {
                    Err(ActionError::Failed("boom".to_string()))
                } else {
                    Ok(())
                }
            })
        })
        .collect();
    (
        StageRunner::new(StageTable::new(stages).expect("table")),
        log,
    )
}

fn bounds_strategy() -> impl Strategy<Value = RunBounds> {
    (0u32..40, prop::option::of(0u32..40))
        .prop_map(|(current, stop)| RunBounds::new(StageIndex(current), stop.map(StageIndex)))
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Executed indices are exactly the defined indices inside the window, ascending.
    #[test]
    fn executed_set_matches_window(
        indices in btree_set(0u32..40, 0..12),
        bounds in bounds_strategy()
    ) {
        let (runner, log) = recording_runner(&indices, None);
        let report = runner.run(bounds).expect("run");

        let expected: Vec<u32> = indices
            .iter()
            .copied()
            .filter(|&i| bounds.current.value() <= i && bounds.stop.is_none_or(|s| s.value() >= i))
            .collect();

        let invoked = log.lock().expect("lock").clone();
        prop_assert_eq!(&invoked, &expected);
        prop_assert_eq!(
            report.executed().iter().map(|i| i.value()).collect::<Vec<_>>(),
            expected
        );
        prop_assert_eq!(report.outcomes.len(), indices.len());
    }

    /// Running twice with side-effect-free actions invokes the same sequence.
    #[test]
    fn runs_are_repeatable(
        indices in btree_set(0u32..40, 0..12),
        bounds in bounds_strategy()
    ) {
        let (runner, log) = recording_runner(&indices, None);

        runner.run(bounds).expect("first");
        let first = std::mem::take(&mut *log.lock().expect("lock"));
        runner.run(bounds).expect("second");
        let second = log.lock().expect("lock").clone();

        prop_assert_eq!(first, second);
    }

    /// Nothing after a failing stage is ever invoked.
    #[test]
    fn fail_fast_never_passes_the_failure(
        indices in btree_set(0u32..40, 1..12),
        pick in any::<prop::sample::Index>()
    ) {
        let all: Vec<u32> = indices.iter().copied().collect();
        let failing = all[pick.index(all.len())];
        let (runner, log) = recording_runner(&indices, Some(failing));

        let err = runner.run(RunBounds::all()).expect_err("must fail");
        let invoked = log.lock().expect("lock").clone();

        prop_assert_eq!(invoked.last().copied(), Some(failing));
        prop_assert!(invoked.iter().all(|&i| i <= failing));
        prop_assert_eq!(err.failed_stage().map(|(i, _)| i), Some(StageIndex(failing)));
    }

    /// Inverted bounds never invoke anything and still succeed.
    #[test]
    fn inverted_bounds_are_noop(
        indices in btree_set(0u32..40, 0..12),
        stop in 0u32..20,
        gap in 1u32..20
    ) {
        let (runner, log) = recording_runner(&indices, None);
        let report = runner.run(RunBounds::between(stop + gap, stop)).expect("run");

        prop_assert!(report.is_noop());
        prop_assert!(log.lock().expect("lock").is_empty());
    }
}
