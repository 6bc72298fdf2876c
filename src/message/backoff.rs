use std::{iter::Take, time::Duration};

/// An endless series of delays, each `factor` times the last, capped at
/// `max`. Used for polling and reconnecting; the caller does the sleeping.
pub struct ExponentialBackoff {
    curr: Duration,
    max: Duration,
    factor: u32,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32) -> Self {
        Self {
            curr: start,
            max,
            factor,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.curr;
        self.curr = (self.curr * self.factor).min(self.max);
        Some(delay)
    }
}

/// Retrying over a series of delays.
pub trait Retry {
    /// Call `f` until it succeeds or the delays run out, and return the last
    /// outcome (`None` if there were no delays at all). `sleep` gets the
    /// failure and the delay before every attempt but the last.
    fn retry<F, S, T, E>(&mut self, mut f: F, sleep: S) -> Option<Result<T, E>>
    where
        F: FnMut() -> Result<T, E>,
        S: Fn(&E, Duration),
        Self: Iterator<Item = Duration> + Sized,
    {
        let mut delays = self.peekable();
        let mut outcome = None;

        while let Some(delay) = delays.next() {
            match f() {
                Ok(value) => return Some(Ok(value)),
                Err(e) if delays.peek().is_some() => sleep(&e, delay),
                Err(e) => outcome = Some(Err(e)),
            }
        }
        outcome
    }
}

impl Retry for ExponentialBackoff {}

impl Retry for Take<ExponentialBackoff> {}

// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use std::cell::Cell;

    #[test]
    fn delays_grow_up_to_the_maximum() {
        let delays: Vec<_> = ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(5),
            2,
        )
        .take(5)
        .collect();
        let ms: Vec<_> = delays.iter().map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn retry_stops_at_the_first_success() {
        let attempts = Cell::new(0);
        let sleeps = Cell::new(0);
        let result = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1), 2)
            .take(10)
            .retry(
                || {
                    attempts.set(attempts.get() + 1);
                    if attempts.get() < 3 {
                        Err("not yet")
                    } else {
                        Ok(attempts.get())
                    }
                },
                |_, _| sleeps.set(sleeps.get() + 1),
            );
        assert_eq!(result, Some(Ok(3)));
        assert_eq!(sleeps.get(), 2);
    }

    #[test]
    fn retry_returns_the_last_error_when_exhausted() {
        let result: Option<Result<(), &str>> =
            ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(1), 2)
                .take(3)
                .retry(|| Err("nope"), |_, _| ());
        assert_eq!(result, Some(Err("nope")));
    }
}
