use std::thread;
use std::time::{Duration, Instant};

use crate::report::{Report, Step};

/// Bounded polling of host state.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
        }
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Evaluate `predicate` until it holds or `timeout` elapses.
    ///
    /// The predicate runs once immediately and then once per interval. The
    /// first `true` returns straight away. Running out of time is a plain
    /// `false`, never an error; a zero timeout evaluates exactly once. A
    /// timeout too large to represent as a deadline polls without one.
    pub fn wait_for_condition<F>(&self, mut predicate: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if predicate() {
                return true;
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.interval.min(deadline - now)
                }
                None => self.interval,
            };
            thread::sleep(pause);
        }
    }

    /// Poll, then record the result against `step`.
    pub fn wait_for_condition_reported<F>(
        &self,
        report: &mut Report,
        step: &Step,
        predicate: F,
        timeout: Duration,
    ) -> bool
    where
        F: FnMut() -> bool,
    {
        let outcome = self.wait_for_condition(predicate, timeout);
        report.record_step(step, outcome)
    }
}

/// Block while the host processes a previously issued command.
pub fn idle_wait(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
