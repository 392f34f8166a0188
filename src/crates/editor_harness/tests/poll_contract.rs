use std::cell::Cell;
use std::time::{Duration, Instant};

use editor_harness::{Poller, Report, Step};

fn fast_poller() -> Poller {
    Poller::new(Duration::from_millis(5))
}

#[test]
fn returns_true_on_first_success_without_further_polls() {
    let calls = Cell::new(0);
    let satisfied = fast_poller().wait_for_condition(
        || {
            calls.set(calls.get() + 1);
            calls.get() == 3
        },
        Duration::from_secs(5),
    );

    assert!(satisfied);
    assert_eq!(calls.get(), 3, "polling must stop once the predicate holds");
}

#[test]
fn immediate_success_evaluates_once() {
    let calls = Cell::new(0);
    let start = Instant::now();
    let satisfied = Poller::new(Duration::from_secs(1)).wait_for_condition(
        || {
            calls.set(calls.get() + 1);
            true
        },
        Duration::from_secs(5),
    );

    assert!(satisfied);
    assert_eq!(calls.get(), 1);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn timeout_yields_false_instead_of_error() {
    let calls = Cell::new(0);
    let start = Instant::now();
    let satisfied = fast_poller().wait_for_condition(
        || {
            calls.set(calls.get() + 1);
            false
        },
        Duration::from_millis(60),
    );

    assert!(!satisfied);
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert!(calls.get() > 1, "predicate should be retried within the window");
}

#[test]
fn zero_timeout_checks_exactly_once() {
    let calls = Cell::new(0);
    let satisfied = fast_poller().wait_for_condition(
        || {
            calls.set(calls.get() + 1);
            false
        },
        Duration::ZERO,
    );

    assert!(!satisfied);
    assert_eq!(calls.get(), 1);
}

#[test]
fn condition_that_becomes_true_later_is_observed() {
    let start = Instant::now();
    let satisfied = fast_poller().wait_for_condition(
        || start.elapsed() >= Duration::from_millis(30),
        Duration::from_secs(2),
    );
    assert!(satisfied);
}

#[test]
fn reported_wait_records_the_poll_outcome() {
    let mut report = Report::with_sink(std::io::sink());
    let step = Step::new("Expected instances planted", "Instance count did not match");

    let ok = fast_poller().wait_for_condition_reported(
        &mut report,
        &step,
        || false,
        Duration::from_millis(20),
    );

    assert!(!ok);
    assert_eq!(report.lines(), ["Failure: Instance count did not match".to_string()]);
}

#[test]
fn unbounded_timeout_does_not_overflow() {
    let calls = Cell::new(0);
    let satisfied = fast_poller().wait_for_condition(
        || {
            calls.set(calls.get() + 1);
            calls.get() == 2
        },
        Duration::MAX,
    );

    assert!(satisfied);
    assert_eq!(calls.get(), 2);
}
