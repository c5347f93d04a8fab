use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

/// Lock-free counters, diagnostic only — never consulted by protocol logic.
#[derive(Debug)]
pub struct Stats {
    pub frames_sent: AtomicU64,
    pub frames_recv: AtomicU64,
    pub parse_errors: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub timeouts: AtomicU64,
    pub matching_started: AtomicU64,
    pub matching_succeeded: AtomicU64,
    pub matching_failed: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames_sent: AtomicU64::new(0),
            frames_recv: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            matching_started: AtomicU64::new(0),
            matching_succeeded: AtomicU64::new(0),
            matching_failed: AtomicU64::new(0),
        })
    }

    #[inline(always)]
    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_frame_recv(&self) {
        self.frames_recv.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_matching_started(&self) {
        self.matching_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_matching_succeeded(&self) {
        self.matching_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_matching_failed(&self) {
        self.matching_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self, elapsed: Duration) -> StatsSnapshot {
        let secs = elapsed.as_secs_f64().max(0.001);
        StatsSnapshot {
            frames_sent: self.frames_sent.swap(0, Ordering::Relaxed),
            frames_recv: self.frames_recv.swap(0, Ordering::Relaxed),
            parse_errors: self.parse_errors.swap(0, Ordering::Relaxed),
            protocol_errors: self.protocol_errors.swap(0, Ordering::Relaxed),
            timeouts: self.timeouts.swap(0, Ordering::Relaxed),
            matching_started: self.matching_started.swap(0, Ordering::Relaxed),
            matching_succeeded: self.matching_succeeded.swap(0, Ordering::Relaxed),
            matching_failed: self.matching_failed.swap(0, Ordering::Relaxed),
            secs,
        }
    }
}

#[derive(Debug)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_recv: u64,
    pub parse_errors: u64,
    pub protocol_errors: u64,
    pub timeouts: u64,
    pub matching_started: u64,
    pub matching_succeeded: u64,
    pub matching_failed: u64,
    pub secs: f64,
}

/// Background stats reporter task.
pub async fn stats_reporter(stats: Arc<Stats>, interval_secs: u64) {
    if interval_secs == 0 {
        // Stats disabled — park forever
        std::future::pending::<()>().await;
        return;
    }

    let interval = Duration::from_secs(interval_secs);
    let mut last = Instant::now();

    loop {
        tokio::time::sleep(interval).await;
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        let snap = stats.snapshot_and_reset(elapsed);
        info!(
            frames_sent = snap.frames_sent,
            frames_recv = snap.frames_recv,
            parse_errors = snap.parse_errors,
            protocol_errors = snap.protocol_errors,
            timeouts = snap.timeouts,
            matching_started = snap.matching_started,
            matching_succeeded = snap.matching_succeeded,
            matching_failed = snap.matching_failed,
            "stats snapshot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_resets_counters() {
        let stats = Stats::new();
        stats.record_frame_sent();
        stats.record_frame_sent();
        stats.record_matching_failed();

        let snap = stats.snapshot_and_reset(Duration::from_secs(1));
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.matching_failed, 1);

        let snap_after = stats.snapshot_and_reset(Duration::from_secs(1));
        assert_eq!(snap_after.frames_sent, 0);
        assert_eq!(snap_after.matching_failed, 0);
    }
}
