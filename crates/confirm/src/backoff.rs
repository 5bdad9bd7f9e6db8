use std::time::Duration;

/// Dynamic polling interval: grows by a fixed increment per poll and is
/// capped at a maximum. Used for external services whose answers arrive on
/// human timescales (multisig confirmation, bridge status), where hammering
/// at a fixed short interval wastes quota.
#[derive(Debug, Clone)]
pub struct PollingBackoff {
    initial: Duration,
    increment: Duration,
    max: Duration,
    current_attempt: u32,
}

impl PollingBackoff {
    pub fn new(initial: Duration, increment: Duration, max: Duration) -> Self {
        Self {
            initial,
            increment,
            max,
            current_attempt: 0,
        }
    }

    /// Next delay: `initial + increment * attempt`, capped at `max`.
    /// Non-decreasing across calls.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self
            .initial
            .saturating_add(self.increment * self.current_attempt)
            .min(self.max);
        self.current_attempt += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for PollingBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(10),
            Duration::from_secs(2),
            Duration::from_secs(30),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = PollingBackoff::default();

        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(12));
        assert_eq!(backoff.next_delay(), Duration::from_secs(14));
        assert_eq!(backoff.current_attempt(), 3);
    }

    #[test]
    fn test_backoff_is_non_decreasing_and_capped() {
        let mut backoff = PollingBackoff::default();

        let mut previous = Duration::ZERO;
        for _ in 0..50 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(30));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = PollingBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.current_attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_custom_parameters() {
        let mut backoff = PollingBackoff::new(
            Duration::from_millis(500),
            Duration::from_millis(250),
            Duration::from_secs(1),
        );

        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(750));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
