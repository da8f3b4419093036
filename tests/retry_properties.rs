//! Property tests for attempt counting and recovery.

use std::time::Duration;

use eventually::testing::{Counter, Script};
use eventually::{AttemptPolicy, Fault, Retry, RetryError};
use proptest::prelude::*;

fn immediate(max_retries: u32) -> AttemptPolicy {
    AttemptPolicy::retries(max_retries).with_delay(Duration::ZERO)
}

proptest! {
    #[test]
    fn always_failing_operation_runs_n_plus_one_times(max_retries in 0u32..25) {
        let mut op = Script::<(), _>::failing("transient");
        let recoveries = Counter::new();

        let result = Retry::new(immediate(max_retries))
            .recover_with(recoveries.recovery())
            .run(|| op.call());

        prop_assert_eq!(op.calls(), max_retries + 1);
        prop_assert_eq!(recoveries.get(), max_retries + 1);
        match result {
            Err(RetryError::Exhausted(exhausted)) => {
                prop_assert_eq!(exhausted.attempts, max_retries + 1);
                prop_assert_eq!(exhausted.max_retries, max_retries);
                prop_assert_eq!(exhausted.last_error, Some("transient"));
            }
            other => prop_assert!(false, "expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn success_within_budget_is_returned(max_retries in 0u32..25, failures in 0usize..25) {
        prop_assume!(failures as u32 <= max_retries);
        let mut op = Script::failing_then(failures, "transient", "ok");
        let recoveries = Counter::new();

        let result = Retry::new(immediate(max_retries))
            .recover_with(recoveries.recovery())
            .run(|| op.call());

        prop_assert_eq!(result, Ok("ok"));
        prop_assert_eq!(op.calls() as usize, failures + 1);
        // One recovery per failed attempt, none for the successful one.
        prop_assert_eq!(recoveries.get() as usize, failures);
    }

    #[test]
    fn success_after_budget_is_never_reached(max_retries in 0u32..25, extra in 1usize..10) {
        let failures = max_retries as usize + extra;
        let mut op = Script::failing_then(failures, "transient", "ok");

        let result = Retry::new(immediate(max_retries)).run(|| op.call());

        prop_assert!(result.unwrap_err().is_exhausted());
        prop_assert_eq!(op.calls(), max_retries + 1);
    }

    #[test]
    fn fatal_error_stops_at_the_attempt_it_happens(max_retries in 1u32..25, before in 0usize..25) {
        prop_assume!(before as u32 <= max_retries);
        let steps = std::iter::repeat_n(Err(Fault::Transient("flaky")), before)
            .chain([Err(Fault::Fatal("typo")), Ok(())]);
        let mut op = Script::new(steps);
        let recoveries = Counter::new();

        let result = Retry::new(immediate(max_retries))
            .recover_with(recoveries.recovery())
            .run(|| op.call());

        prop_assert_eq!(result, Err(RetryError::Fatal(Fault::Fatal("typo"))));
        prop_assert_eq!(op.calls() as usize, before + 1);
        prop_assert_eq!(recoveries.get() as usize, before);
    }
}

#[test]
fn documented_example_fail_fail_succeed() {
    let mut outcomes = vec![Ok("ok"), Err("fail"), Err("fail")];
    let mut calls = 0;

    let result = Retry::new(immediate(2)).run(|| {
        calls += 1;
        outcomes.pop().unwrap_or(Err("script exhausted"))
    });

    assert_eq!(result, Ok("ok"));
    assert_eq!(calls, 3);
}
