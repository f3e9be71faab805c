//! Reconnect backoff policy.

use crate::constants::{MAX_RECONNECT_ATTEMPTS, RECONNECT_BACKOFF};
use std::time::Duration;

/// Fixed-interval reconnect policy, generalized from a configurable
/// exponential backoff down to the flat wait/attempt-ceiling spec.md §5
/// pins exactly: 2s between attempts, 5 attempts before giving up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Retry {
    /// Wait between reconnect attempts.
    pub wait: Duration,
    /// Maximum number of consecutive attempts before escalating to `Closed`.
    pub limit: usize,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            wait: RECONNECT_BACKOFF,
            limit: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl Retry {
    /// Returns the wait to apply before the next attempt, or `None` if
    /// `attempts_so_far` has already exhausted the limit.
    pub fn next_wait(&self, attempts_so_far: usize) -> Option<Duration> {
        if attempts_so_far >= self.limit {
            None
        } else {
            Some(self.wait)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let r = Retry::default();
        assert_eq!(r.wait, Duration::from_secs(2));
        assert_eq!(r.limit, 5);
    }

    #[test]
    fn exhausts_after_limit_attempts() {
        let r = Retry::default();
        for i in 0..5 {
            assert!(r.next_wait(i).is_some());
        }
        assert!(r.next_wait(5).is_none());
    }
}
