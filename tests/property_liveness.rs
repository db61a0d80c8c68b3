//! Property-based tests for the liveness tracker.
//!
//! # Invariants
//! - Every task that ends with a terminal event leaves the tracker idle,
//!   whatever the interleaving across tasks and however often events repeat
//! - The in-flight count always equals the number of tasks seen but not finished
//! - The level is active exactly while that count is non-zero
//! - A fully drained run has an even number of level flips

use std::collections::HashMap;

use proptest::prelude::*;
use taskpulse::{LivenessTracker, TaskEvent, TaskEventKind};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_terminal() -> impl Strategy<Value = TaskEventKind> {
    prop_oneof![
        Just(TaskEventKind::Succeeded),
        Just(TaskEventKind::Failed),
        Just(TaskEventKind::Revoked),
    ]
}

/// One task's events in delivery order: `received`, optionally `started`, one
/// terminal event, then up to three redeliveries of earlier events placed
/// anywhere after their first copy.
fn arb_task_script() -> impl Strategy<Value = Vec<TaskEventKind>> {
    (
        any::<bool>(),
        arb_terminal(),
        proptest::collection::vec((any::<usize>(), any::<usize>()), 0..=3),
    )
        .prop_map(|(started, end, dups)| {
            let mut script = vec![TaskEventKind::Received];
            if started {
                script.push(TaskEventKind::Started);
            }
            script.push(end);
            for (which, offset) in dups {
                let i = which % script.len();
                let at = i + 1 + offset % (script.len() - i);
                script.insert(at, script[i]);
            }
            script
        })
}

/// Several task scripts plus the choices used to interleave them.
fn arb_run() -> impl Strategy<Value = (Vec<Vec<TaskEventKind>>, Vec<usize>)> {
    (
        proptest::collection::vec(arb_task_script(), 1..=6),
        proptest::collection::vec(any::<usize>(), 1..=64),
    )
}

/// Merges the scripts, keeping each task's own order.
fn interleave(scripts: &[Vec<TaskEventKind>], choices: &[usize]) -> Vec<(String, TaskEventKind)> {
    let mut cursors = vec![0usize; scripts.len()];
    let mut out = Vec::new();
    let mut step = 0;
    loop {
        let open: Vec<usize> = (0..scripts.len())
            .filter(|&t| cursors[t] < scripts[t].len())
            .collect();
        if open.is_empty() {
            return out;
        }
        let t = open[choices[step % choices.len()] % open.len()];
        out.push((format!("task-{t}"), scripts[t][cursors[t]]));
        cursors[t] += 1;
        step += 1;
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// For any interleaving of complete task lifecycles, including repeated
    /// and late events, the tracker ends idle and never flips while work remains.
    #[test]
    fn complete_lifecycles_end_idle((scripts, choices) in arb_run()) {
        let tracker = LivenessTracker::new();
        // true once the task's first terminal event was delivered
        let mut finished: HashMap<String, bool> = HashMap::new();

        for (task, kind) in interleave(&scripts, &choices) {
            let before = tracker.snapshot().transitions;
            tracker.apply(&TaskEvent::new(kind).with_task(task.as_str()));

            let done = finished.entry(task).or_insert(false);
            *done |= kind.is_terminal();
            let expected = finished.values().filter(|done| !**done).count();

            prop_assert_eq!(tracker.in_flight(), expected);
            prop_assert_eq!(tracker.is_active(), expected > 0);
            let after = tracker.snapshot().transitions;
            prop_assert!(after - before <= 1);
            if after != before {
                // A flip happens only on a zero crossing.
                prop_assert!(expected <= 1);
            }
        }

        prop_assert!(tracker.is_idle());
        prop_assert_eq!(tracker.in_flight(), 0);
        prop_assert_eq!(tracker.snapshot().transitions % 2, 0);
        prop_assert_eq!(tracker.snapshot().unresolved, 0);
    }

    /// Terminal events for tasks never seen as received never activate the tracker.
    #[test]
    fn terminal_only_streams_stay_idle(
        ends in proptest::collection::vec((0usize..8, arb_terminal()), 0..=32)
    ) {
        let tracker = LivenessTracker::new();
        for (id, kind) in ends {
            tracker.apply(&TaskEvent::new(kind).with_task(format!("ghost-{id}").as_str()));
            prop_assert!(tracker.is_idle());
        }
        prop_assert_eq!(tracker.snapshot().transitions, 0);
    }
}
