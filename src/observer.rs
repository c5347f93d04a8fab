//! The controller's upstream notification contract and the CP-state event
//! the controller consumes.

use tokio::sync::mpsc;
use tracing::info;

/// One control-pilot state transition, as delivered by whatever external
/// collaborator watches the pilot line (or, in this repository, the stdin
/// demo harness).
#[derive(Debug, Clone)]
pub struct CpEvent {
    pub state: String,
    pub evse_id: String,
}

impl CpEvent {
    /// Only the first character of `state` is meaningful — A1/A2-style
    /// suffixes are ignored.
    pub fn letter(&self) -> Option<char> {
        self.state.chars().next()
    }
}

/// Sink for matching-run lifecycle notifications. Implementations must not
/// block the controller for long; spawn if the notification needs I/O.
pub trait Observer: Send + Sync {
    fn matching_ongoing(&self, evse_id: &str);
    fn matching_failed(&self, evse_id: &str);
}

/// Default binary wiring: notifications become log lines and nothing else.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn matching_ongoing(&self, evse_id: &str) {
        info!(evse_id, "matching ongoing");
    }

    fn matching_failed(&self, evse_id: &str) {
        tracing::warn!(evse_id, "matching failed after exhausting retries");
    }
}

/// Delivers notifications as values on a channel instead of log lines, for
/// callers that want to react programmatically (tests, a parent
/// orchestrator).
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    MatchingOngoing { evse_id: String },
    MatchingFailed { evse_id: String },
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelObserver { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn matching_ongoing(&self, evse_id: &str) {
        let _ = self.tx.send(ObserverEvent::MatchingOngoing { evse_id: evse_id.to_string() });
    }

    fn matching_failed(&self, evse_id: &str) {
        let _ = self.tx.send(ObserverEvent::MatchingFailed { evse_id: evse_id.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_ignores_numeric_suffix() {
        let ev = CpEvent { state: "B1".to_string(), evse_id: "evse-0".to_string() };
        assert_eq!(ev.letter(), Some('B'));
    }

    #[tokio::test]
    async fn channel_observer_delivers_events() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.matching_ongoing("evse-0");
        observer.matching_failed("evse-0");
        assert_eq!(
            rx.recv().await,
            Some(ObserverEvent::MatchingOngoing { evse_id: "evse-0".to_string() })
        );
        assert_eq!(
            rx.recv().await,
            Some(ObserverEvent::MatchingFailed { evse_id: "evse-0".to_string() })
        );
    }
}
