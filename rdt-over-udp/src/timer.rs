//! Timeout and retry policy shared by the sender and the receiver.
//!
//! Every wait point in the protocol is a single receive bounded by
//! [`RetryPolicy::timeout`].  Consecutive timeouts are tracked by a
//! [`RetryCounter`]; any successful receipt resets it, and more than
//! [`RetryPolicy::max_retries`] consecutive timeouts exhausts the budget.

use std::time::Duration;

/// Per-receive deadline.
pub const TIMEOUT: Duration = Duration::from_millis(500);

/// Consecutive timeouts tolerated before a transfer is abandoned.
pub const MAX_RETRY_TIMES: u32 = 5;

/// Adjustable timeout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Bound on every blocking receive.
    pub timeout: Duration,
    /// Consecutive timeouts allowed; one more aborts the call.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: TIMEOUT,
            max_retries: MAX_RETRY_TIMES,
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Counter that starts charging timeouts immediately (sender side).
    pub fn counter(&self) -> RetryCounter {
        RetryCounter {
            count: 0,
            max: self.max_retries,
            started: true,
        }
    }

    /// Counter that ignores timeouts until the first receipt (receiver side).
    ///
    /// An idle receiver has not started yet, so it may wait indefinitely for
    /// the first datagram of a transfer.
    pub fn idle_counter(&self) -> RetryCounter {
        RetryCounter {
            started: false,
            ..self.counter()
        }
    }
}

/// What the caller should do after a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing has been received yet; keep waiting without charge.
    Idle,
    /// The `n`-th consecutive timeout; still within budget.
    Retry(u32),
    /// The `n`-th consecutive timeout exceeded the budget.
    Exhausted(u32),
}

/// Consecutive-timeout counter.
#[derive(Debug, Clone)]
pub struct RetryCounter {
    count: u32,
    max: u32,
    started: bool,
}

impl RetryCounter {
    /// A datagram arrived: reset the streak.
    pub fn on_receipt(&mut self) {
        self.count = 0;
        self.started = true;
    }

    /// A wait elapsed without a datagram.
    pub fn on_timeout(&mut self) -> Tick {
        if !self.started {
            return Tick::Idle;
        }
        self.count += 1;
        if self.count > self.max {
            Tick::Exhausted(self.count)
        } else {
            Tick::Retry(self.count)
        }
    }

    /// Consecutive timeouts since the last receipt.
    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let p = RetryPolicy::default();
        assert_eq!(p.timeout, Duration::from_millis(500));
        assert_eq!(p.max_retries, 5);
    }

    #[test]
    fn exhausted_after_max_plus_one_timeouts() {
        let mut c = RetryPolicy::default().counter();
        for n in 1..=5 {
            assert_eq!(c.on_timeout(), Tick::Retry(n));
        }
        assert_eq!(c.on_timeout(), Tick::Exhausted(6));
    }

    #[test]
    fn receipt_resets_the_streak() {
        let mut c = RetryPolicy::default().with_max_retries(2).counter();
        assert_eq!(c.on_timeout(), Tick::Retry(1));
        assert_eq!(c.on_timeout(), Tick::Retry(2));
        c.on_receipt();
        assert_eq!(c.count(), 0);
        assert_eq!(c.on_timeout(), Tick::Retry(1));
    }

    #[test]
    fn idle_counter_waits_for_first_receipt() {
        let mut c = RetryPolicy::default().with_max_retries(1).idle_counter();
        for _ in 0..10 {
            assert_eq!(c.on_timeout(), Tick::Idle);
        }
        c.on_receipt();
        assert_eq!(c.on_timeout(), Tick::Retry(1));
        assert_eq!(c.on_timeout(), Tick::Exhausted(2));
    }

    #[test]
    fn builder_overrides() {
        let p = RetryPolicy::default()
            .with_timeout(Duration::from_millis(50))
            .with_max_retries(3);
        assert_eq!(p.timeout, Duration::from_millis(50));
        assert_eq!(p.max_retries, 3);
    }
}
