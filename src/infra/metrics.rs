//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Lock-free metrics collector for the booth
#[derive(Default)]
pub struct Metrics {
    /// Total bus events ever dispatched (monotonic)
    events_total: AtomicU64,
    /// Bus events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Camera frames scanned since last report (reset on report)
    frames_since_report: AtomicU64,
    /// QR candidates rejected by parse/schema/payment checks (monotonic)
    candidates_rejected: AtomicU64,
    /// Admissions suppressed by the cooldown window (monotonic)
    admissions_suppressed: AtomicU64,
    /// Admissions accepted (monotonic)
    admissions_accepted: AtomicU64,
    /// Sessions started (monotonic)
    sessions_started: AtomicU64,
    /// Sessions that reached playback-finished (monotonic)
    sessions_completed: AtomicU64,
    /// Playback failures of any cause (monotonic)
    playback_failures: AtomicU64,
    /// Completed cleanup sequences (monotonic)
    cleanups_completed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_dispatched(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_scanned(&self) {
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate_rejected(&self) {
        self.candidates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission_suppressed(&self) {
        self.admissions_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission_accepted(&self) {
        self.admissions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_playback_failure(&self) {
        self.playback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cleanup_completed(&self) {
        self.cleanups_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters for reporting.
    ///
    /// Since-report counters are atomically swapped to zero so each
    /// report covers one interval.
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_interval: self.events_since_report.swap(0, Ordering::Relaxed),
            frames_interval: self.frames_since_report.swap(0, Ordering::Relaxed),
            candidates_rejected: self.candidates_rejected.load(Ordering::Relaxed),
            admissions_suppressed: self.admissions_suppressed.load(Ordering::Relaxed),
            admissions_accepted: self.admissions_accepted.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            playback_failures: self.playback_failures.load(Ordering::Relaxed),
            cleanups_completed: self.cleanups_completed.load(Ordering::Relaxed),
        }
    }
}

/// Consistent snapshot of all counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_interval: u64,
    pub frames_interval: u64,
    pub candidates_rejected: u64,
    pub admissions_suppressed: u64,
    pub admissions_accepted: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub playback_failures: u64,
    pub cleanups_completed: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_interval = %self.events_interval,
            frames_interval = %self.frames_interval,
            candidates_rejected = %self.candidates_rejected,
            admissions_suppressed = %self.admissions_suppressed,
            admissions_accepted = %self.admissions_accepted,
            sessions_started = %self.sessions_started,
            sessions_completed = %self.sessions_completed,
            playback_failures = %self.playback_failures,
            cleanups_completed = %self.cleanups_completed,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_counters_reset_on_report() {
        let metrics = Metrics::new();
        metrics.record_event_dispatched();
        metrics.record_event_dispatched();
        metrics.record_frame_scanned();

        let first = metrics.report();
        assert_eq!(first.events_total, 2);
        assert_eq!(first.events_interval, 2);
        assert_eq!(first.frames_interval, 1);

        let second = metrics.report();
        assert_eq!(second.events_total, 2);
        assert_eq!(second.events_interval, 0);
        assert_eq!(second.frames_interval, 0);
    }

    #[test]
    fn test_monotonic_counters() {
        let metrics = Metrics::new();
        metrics.record_admission_accepted();
        metrics.record_session_started();
        metrics.record_playback_failure();
        metrics.record_cleanup_completed();
        metrics.record_cleanup_completed();

        let summary = metrics.report();
        assert_eq!(summary.admissions_accepted, 1);
        assert_eq!(summary.sessions_started, 1);
        assert_eq!(summary.playback_failures, 1);
        assert_eq!(summary.cleanups_completed, 2);
    }
}
