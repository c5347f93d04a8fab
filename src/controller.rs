//! Watches control-pilot transitions and drives one session's matching runs:
//! spawns on a charging-state transition, retries on failure, cancels on
//! disconnect, and notifies an [`Observer`] of lifecycle events.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Deadline;
use crate::observer::{CpEvent, Observer};
use crate::session::{SessionTimeouts, SlacSession, TT_MATCHING_REPETITION};
use crate::stats::Stats;

const MAX_ATTEMPTS: u32 = 3;

pub struct SessionController {
    session: Arc<Mutex<SlacSession>>,
    observer: Arc<dyn Observer>,
    stats: Arc<Stats>,
    evse_id: String,
    timeouts: SessionTimeouts,
    task: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(
        session: Arc<Mutex<SlacSession>>,
        observer: Arc<dyn Observer>,
        stats: Arc<Stats>,
        evse_id: impl Into<String>,
        timeouts: SessionTimeouts,
    ) -> Self {
        SessionController {
            session,
            observer,
            stats,
            evse_id: evse_id.into(),
            timeouts,
            task: None,
        }
    }

    fn is_matching_running(&self) -> bool {
        self.task.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Dispatch one CP-state transition. Only the first character of
    /// `event.state` is meaningful.
    pub async fn handle_cp_event(&mut self, event: CpEvent) {
        let Some(letter) = event.letter() else {
            warn!(evse_id = %event.evse_id, "empty CP state, ignoring");
            return;
        };

        match letter {
            'A' | 'E' | 'F' => {
                let matched = self.session.lock().await.state() == crate::session::SessionState::Matched;
                if self.is_matching_running() && (letter == 'A' || matched) {
                    info!(evse_id = %self.evse_id, cp_state = %event.state, "cancelling matching run");
                    if let Some(task) = self.task.take() {
                        task.abort();
                    }
                    self.session.lock().await.leave_logical_network();
                }
            }
            'B' | 'C' | 'D' => {
                if !self.is_matching_running() {
                    self.spawn_matching(event.state);
                }
            }
            other => {
                warn!(evse_id = %self.evse_id, cp_state = %other, "unrecognized CP state, ignoring");
            }
        }
    }

    fn spawn_matching(&mut self, cp_state: String) {
        info!(evse_id = %self.evse_id, cp_state = %cp_state, "arming matching run");
        self.observer.matching_ongoing(&self.evse_id);
        self.stats.record_matching_started();

        let session = Arc::clone(&self.session);
        let observer = Arc::clone(&self.observer);
        let stats = Arc::clone(&self.stats);
        let evse_id = self.evse_id.clone();
        let timeouts = self.timeouts;

        self.task = Some(tokio::spawn(async move {
            run_with_retries(session, observer, stats, evse_id, timeouts).await;
        }));
    }
}

/// Up to [`MAX_ATTEMPTS`] matching attempts, bounded by
/// [`TT_MATCHING_REPETITION`] overall. Each attempt — success or failure —
/// consumes exactly one of the three, regardless of outcome.
async fn run_with_retries(
    session: Arc<Mutex<SlacSession>>,
    observer: Arc<dyn Observer>,
    stats: Arc<Stats>,
    evse_id: String,
    timeouts: SessionTimeouts,
) {
    let deadline = Deadline::after(TT_MATCHING_REPETITION);
    let mut attempts_left = MAX_ATTEMPTS;

    while attempts_left > 0 && !deadline.has_passed() {
        attempts_left -= 1;
        let outcome = session.lock().await.run_matching(&timeouts).await;
        match outcome {
            Ok(()) => {
                stats.record_matching_succeeded();
                info!(evse_id = %evse_id, "matching succeeded");
                return;
            }
            Err(e) => {
                match &e {
                    crate::error::CoreError::Timeout(_) => stats.record_timeout(),
                    crate::error::CoreError::Protocol(_) => stats.record_protocol_error(),
                    _ => {}
                }
                warn!(evse_id = %evse_id, error = %e, attempts_left, "matching attempt failed");
            }
        }
    }

    stats.record_matching_failed();
    observer.matching_failed(&evse_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, ObserverEvent};

    #[test]
    fn cp_event_letter_drives_dispatch_not_full_string() {
        let event = CpEvent { state: "C2".to_string(), evse_id: "evse-0".to_string() };
        assert_eq!(event.letter(), Some('C'));
    }

    // Exercises the retry bookkeeping without a live raw socket: a session
    // can't be constructed without one, so this checks the attempt-counting
    // contract (single decrement per loop iteration, not per failure
    // branch) against a plain counter instead.
    #[test]
    fn single_decrement_per_attempt_gives_full_budget() {
        let mut attempts_left: u32 = MAX_ATTEMPTS;
        let mut ran = 0;
        while attempts_left > 0 {
            attempts_left -= 1;
            ran += 1;
            // simulate every attempt failing
        }
        assert_eq!(ran, MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn channel_observer_receives_failed_notification_directly() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.matching_failed("evse-0");
        assert_eq!(
            rx.recv().await,
            Some(ObserverEvent::MatchingFailed { evse_id: "evse-0".to_string() })
        );
    }
}
