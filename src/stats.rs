//! Statistics tracking for the lookup proxy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic statistics for tracking proxy performance.
pub struct Stats {
    pub requests: AtomicU64,
    pub cached: AtomicU64,
    pub forwarded: AtomicU64,
    pub not_found: AtomicU64,
    pub unavailable: AtomicU64,
    pub malformed: AtomicU64,
    pub sessions: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
    started: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            sessions: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_cached(&self, response_time_ms: f64) {
        self.record_answered(&self.cached, response_time_ms);
    }

    pub fn record_forwarded(&self, response_time_ms: f64) {
        self.record_answered(&self.forwarded, response_time_ms);
    }

    pub fn record_not_found(&self, response_time_ms: f64) {
        self.record_answered(&self.not_found, response_time_ms);
    }

    pub fn record_unavailable(&self, response_time_ms: f64) {
        self.record_answered(&self.unavailable, response_time_ms);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_answered(&self, counter: &AtomicU64, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let cached = self.cached.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let not_found = self.not_found.swap(0, Ordering::Relaxed);
        let unavailable = self.unavailable.swap(0, Ordering::Relaxed);
        let malformed = self.malformed.swap(0, Ordering::Relaxed);
        let sessions = self.sessions.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let avg_response_ms = if requests > 0 {
            (total_us as f64 / requests as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            cached,
            forwarded,
            not_found,
            unavailable,
            malformed,
            sessions,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub cached: u64,
    pub forwarded: u64,
    pub not_found: u64,
    pub unavailable: u64,
    pub malformed: u64,
    pub sessions: u64,
    pub avg_response_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_and_resets() {
        let stats = Stats::new();
        stats.record_cached(1.0);
        stats.record_forwarded(3.0);
        stats.record_malformed();
        stats.record_session();

        let snapshot = stats.snapshot_and_reset();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.cached, 1);
        assert_eq!(snapshot.forwarded, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.sessions, 1);
        assert!((snapshot.avg_response_ms - 2.0).abs() < 1e-6);

        let empty = stats.snapshot_and_reset();
        assert_eq!(empty.requests, 0);
        assert_eq!(empty.avg_response_ms, 0.0);
    }
}
