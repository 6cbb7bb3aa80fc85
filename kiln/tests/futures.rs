use kiln::{Failure, Outcome, Scheduler, Value, Values, futurize};
use proptest::prelude::*;

use std::cell::Cell;
use std::rc::Rc;

fn ints(future: &kiln::Future) -> Vec<i32> {
    let values = future.values().unwrap();
    (0..values.len())
        .map(|i| values.get::<i32>(i).unwrap())
        .collect()
}

#[test]
fn futurize_plain_value_is_done() {
    let sched = Scheduler::new();

    let future = futurize!(sched; Value::new(7i32));

    assert!(future.is_ready());
    assert_eq!(future.get::<i32>().unwrap(), 7);
}

#[test]
fn futurize_without_arguments_is_empty() {
    let sched = Scheduler::new();

    let future = futurize!(sched);

    assert!(future.is_ready());
    assert!(future.values().unwrap().is_empty());
}

#[test]
fn futurize_merges_keyword_futures() {
    let sched = Scheduler::new();

    let promise = sched.promise();
    let future = futurize!(
        sched;
        Value::new(1i32),
        promise.future(),
        tag = sched.ready("release"),
        marker = sched.done(Values::new())
    );
    assert!(!future.is_ready());

    promise.satisfy(Values::of(2i32).with(Value::new(3i32)));

    let values = future.values().unwrap();
    assert_eq!(ints(&future), vec![1, 2, 3]);
    assert_eq!(
        values.get_named("tag").unwrap().downcast_ref::<&str>(),
        Some(&"release")
    );
    assert!(values.get_named("marker").unwrap().is_unit());
}

#[test]
fn wait_returns_futurized_value() {
    let sched = Scheduler::new();

    let future = futurize!(sched; Value::new(String::from("out")));

    assert_eq!(
        sched.wait(&future).get::<String>().unwrap(),
        "out".to_string()
    );
}

#[test]
fn all_concatenates_in_argument_order() {
    let sched = Scheduler::new();

    let first = sched.promise();
    let second = sched.promise();
    let all = sched.all([first.future(), second.future()]);

    second.satisfy(Value::new(2i32));
    assert!(!all.is_ready());

    first.satisfy(Value::new(1i32));
    assert!(all.is_ready());
    assert_eq!(ints(&all), vec![1, 2]);
}

#[test]
fn all_fails_with_first_failure_in_argument_order() {
    let sched = Scheduler::new();

    let failure = Failure::msg("a failed");
    let a = sched.failed(failure.clone());
    let b = sched.ready(2i32);

    for all in [sched.all([&a, &b]), sched.all([&b, &a])] {
        match all.outcome() {
            Outcome::Failure(got) => assert!(got.same_error(&failure)),
            Outcome::Success(_) => panic!("expected a failure"),
        }
    }
}

#[test]
fn bind_skips_continuation_on_failure() {
    let sched = Scheduler::new();
    let called = Rc::new(Cell::new(false));

    let failure = Failure::msg("upstream");
    let bound = sched.failed(failure.clone()).bind({
        let called = called.clone();
        move |_| {
            called.set(true);
            Ok(())
        }
    });

    assert!(!called.get());
    match bound.outcome() {
        Outcome::Failure(got) => assert!(got.same_error(&failure)),
        Outcome::Success(_) => panic!("expected a failure"),
    }
}

#[test]
fn bind_waits_for_returned_future() {
    let sched = Scheduler::new();

    let later = sched.promise();
    let bound = sched.ready(2i32).bind({
        let later = later.future();
        move |_| Ok(later)
    });

    assert!(!bound.is_ready());

    later.satisfy(Value::new(5i32));
    assert_eq!(bound.get::<i32>().unwrap(), 5);
}

#[test]
fn bind_error_fails_bound_future() {
    let sched = Scheduler::new();

    let bound = sched
        .ready(1i32)
        .bind(|_| Err::<Values, _>(Failure::msg("rejected")));

    assert_eq!(bound.explode().unwrap_err().to_string(), "rejected");
}

#[test]
fn bind_outcome_sees_failures() {
    let sched = Scheduler::new();

    let recovered = sched
        .failed(Failure::msg("flaky"))
        .bind_outcome(|outcome| Ok(Values::of(outcome.is_success())));

    assert!(!recovered.get::<bool>().unwrap());
}

#[test]
fn when_done_ignores_failures() {
    let sched = Scheduler::new();

    let pending = sched.promise();
    let done = sched.when_done([sched.failed(Failure::msg("ignored")), pending.future()]);
    assert!(!done.is_ready());

    pending.satisfy(());
    assert!(done.outcome().is_success());
}

#[test]
fn when_succeeded_reports_first_failure() {
    let sched = Scheduler::new();

    let first = Failure::msg("first");
    let second = Failure::msg("second");

    let late = sched.promise();
    let result = sched.when_succeeded([late.future(), sched.failed(second)]);
    assert!(!result.is_ready());

    late.satisfy(first.clone());
    match result.outcome() {
        Outcome::Failure(got) => assert!(got.same_error(&first)),
        Outcome::Success(_) => panic!("expected a failure"),
    }
}

#[test]
fn when_succeeded_with_successes_is_empty() {
    let sched = Scheduler::new();

    let result = sched.when_succeeded([sched.ready(1i32), sched.ready(2i32)]);

    assert!(result.values().unwrap().is_empty());
}

#[test]
fn promise_forwards_a_pending_future() {
    let sched = Scheduler::new();

    let source = sched.promise();
    let target = sched.promise();
    target.satisfy(source.future());

    assert!(target.is_satisfied());
    assert!(!target.future().is_ready());

    source.satisfy(Value::new(9i32));
    assert_eq!(target.future().get::<i32>().unwrap(), 9);
}

#[test]
#[should_panic(expected = "satisfied twice")]
fn promise_satisfied_twice_panics() {
    let sched = Scheduler::new();

    let promise = sched.promise();
    promise.satisfy(());
    promise.satisfy(());
}

#[test]
#[should_panic(expected = "before it is ready")]
fn reading_a_pending_future_panics() {
    let sched = Scheduler::new();

    let promise = sched.promise();
    let _ = promise.future().values();
}

#[test]
fn finished_futures_are_freed() {
    let sched = Scheduler::new();
    let baseline = sched.live_futures();

    {
        let promise = sched.promise();
        let bound = promise.future().bind(|values| Ok(values));
        let all = sched.all([&bound, &sched.ready(1i32)]);

        promise.satisfy(Value::new(0i32));
        assert!(all.is_ready());
    }

    assert_eq!(sched.live_futures(), baseline);
}

proptest! {
    #[test]
    fn all_preserves_argument_order(values in proptest::collection::vec(any::<i32>(), 0..16)) {
        let sched = Scheduler::new();

        let promises: Vec<_> = values.iter().map(|_| sched.promise()).collect();
        let all = sched.all(promises.iter().map(|p| p.future()));

        // Completion order is the reverse of argument order.
        for (promise, &value) in promises.iter().zip(&values).rev() {
            promise.satisfy(Value::new(value));
        }

        prop_assert_eq!(ints(&all), values);
    }

    #[test]
    fn all_fails_with_first_failing_argument(successes in proptest::collection::vec(any::<bool>(), 1..12)) {
        let sched = Scheduler::new();

        let failures: Vec<_> = (0..successes.len())
            .map(|i| Failure::msg(format!("failure {i}")))
            .collect();
        let promises: Vec<_> = successes.iter().map(|_| sched.promise()).collect();
        let all = sched.all(promises.iter().map(|p| p.future()));

        for ((promise, &ok), failure) in promises.iter().zip(&successes).zip(&failures).rev() {
            if ok {
                promise.satisfy(Value::new(1i32));
            } else {
                promise.satisfy(failure.clone());
            }
        }

        match (successes.iter().position(|&ok| !ok), all.outcome()) {
            (None, outcome) => prop_assert!(outcome.is_success()),
            (Some(first), Outcome::Failure(got)) => prop_assert!(got.same_error(&failures[first])),
            (Some(_), Outcome::Success(_)) => prop_assert!(false, "expected a failure"),
        }
    }
}
