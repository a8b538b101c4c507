//! Capped exponential backoff for resubscription.

use std::iter::{Chain, Once};
use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;

/// Doubling delay sequence: `initial, 2·initial, 4·initial, …` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    delays: Chain<Once<Duration>, ExponentialBackoff>,
}

impl Backoff {
    /// Creates a backoff starting at `initial` and capped at `max`.
    ///
    /// A `max` below `initial` is raised to `initial`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            delays: Self::strategy(initial, max),
        }
    }

    fn strategy(initial: Duration, max: Duration) -> Chain<Once<Duration>, ExponentialBackoff> {
        let factor = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        std::iter::once(initial).chain(
            ExponentialBackoff::from_millis(2)
                .factor(factor)
                .max_delay(max),
        )
    }

    /// Returns the delay to wait now and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        self.delays.next().unwrap_or(self.max)
    }

    /// Starts over from the initial delay.
    pub fn reset(&mut self) {
        self.delays = Self::strategy(self.initial, self.max);
    }
}
