use std::time::Duration;
use tokio::time::Instant;

/// A deadline sampled once at step/loop entry. Timer semantics require
/// computing `remaining = deadline - now()` before every recv rather than
/// re-arming a fresh timeout per inner iteration, so every multi-frame wait
/// in the session is built around one of these.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Sample `now()` and add `timeout` to get the deadline.
    pub fn after(timeout: Duration) -> Self {
        Deadline { at: Instant::now() + timeout }
    }

    /// Time left until the deadline, or `Duration::ZERO` if already past.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_counts_down() {
        let d = Deadline::after(Duration::from_millis(100));
        assert!(d.remaining() <= Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(d.has_passed());
        assert_eq!(d.remaining(), Duration::ZERO);
    }
}
