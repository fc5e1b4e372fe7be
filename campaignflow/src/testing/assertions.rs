//! Assertions over run results and recorded events.

use crate::core::{Branch, FailureKind, RunStatus};
use crate::events::CollectingEventSink;
use crate::pipeline::{RunOutcome, RunResult};

/// Asserts that the run completed and returns its outcome.
pub fn assert_completed(result: &RunResult) -> &RunOutcome {
    match result {
        RunResult::Completed(outcome) => outcome,
        other => panic!("Expected a completed run, got {other:?}"),
    }
}

/// Asserts that the run completed with status `Generated`.
pub fn assert_generated(result: &RunResult) -> &RunOutcome {
    let outcome = assert_completed(result);
    assert_eq!(
        outcome.status,
        Some(RunStatus::Generated),
        "Expected status Generated, got {:?}",
        outcome.status
    );
    outcome
}

/// Asserts the output of one branch.
pub fn assert_branch_output(outcome: &RunOutcome, branch: Branch, expected: Option<&str>) {
    assert_eq!(
        outcome.outputs.get(branch),
        expected,
        "Unexpected {branch} output"
    );
}

/// Asserts that a soft failure of `kind` was recorded.
pub fn assert_failure_recorded(outcome: &RunOutcome, kind: FailureKind) {
    assert!(
        outcome.has_failure(kind),
        "Expected a {kind} failure, got {:?}",
        outcome.failures
    );
}

/// Asserts that no soft failure was recorded.
pub fn assert_no_failures(outcome: &RunOutcome) {
    assert!(
        outcome.failures.is_empty(),
        "Expected no failures, got {:?}",
        outcome.failures
    );
}

/// Asserts that every `before` event precedes the first `after` event.
pub fn assert_events_before(sink: &CollectingEventSink, before: &str, after: &str) {
    let types = sink.event_types();
    let last_before = types.iter().rposition(|t| t == before);
    let first_after = types.iter().position(|t| t == after);
    match (last_before, first_after) {
        (Some(b), Some(a)) => assert!(
            b < a,
            "Expected every '{before}' before '{after}', got {types:?}"
        ),
        _ => panic!("Expected both '{before}' and '{after}' events, got {types:?}"),
    }
}
