//! Bounded retry with a backoff schedule.
//!
//! The attempt closure decides success: it returns [`Attempt::Done`] to stop or
//! [`Attempt::Retry`] with a reason to go again. Sleeping goes through a
//! [`Sleeper`] so the schedule can be observed without blocking.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// Retry n waits n * step.
    Linear(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    Retry(String),
}

#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct Exhausted {
    pub attempts: u32,
    pub last_error: String,
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay slept before the given 1-based attempt. The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(step) => step * (attempt - 1),
        }
    }

    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, mut attempt_fn: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Attempt<T>,
    {
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.max_attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(attempt, ?delay, "Waiting before retry");
                sleeper.sleep(delay);
            }

            match attempt_fn(attempt) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(reason) => {
                    tracing::debug!(attempt, max = self.max_attempts, %reason, "Attempt failed");
                    last_error = reason;
                }
            }
        }

        Err(Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Sleeper;
    use std::cell::RefCell;
    use std::time::Duration;

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub delays: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.delays.borrow_mut().push(duration);
        }
    }
}
