//! Language synchronization metrics.
//!
//! Counters are owned by a controller instance rather than a process-wide
//! singleton, so independent controllers (and tests) never share counts.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters describing what the controller has done so far.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Change requests that passed validation
    requests: AtomicUsize,

    /// Change requests rejected as unsupported
    rejected: AtomicUsize,

    /// Requests that converged on the immediate apply, without polling
    immediate_applies: AtomicUsize,

    /// Poller ticks across all sessions
    poll_ticks: AtomicUsize,

    /// Confirmed convergences (immediate or polled)
    convergences: AtomicUsize,

    /// Sessions that hit their deadline
    timeouts: AtomicUsize,

    /// Pending requests replaced by a newer one
    superseded: AtomicUsize,

    /// Selections adopted from the widget itself
    widget_changes: AtomicUsize,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_immediate_apply(&self) {
        self.immediate_applies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_tick(&self) {
        self.poll_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_convergence(&self) {
        self.convergences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_widget_change(&self) {
        self.widget_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn immediate_applies(&self) -> usize {
        self.immediate_applies.load(Ordering::Relaxed)
    }

    pub fn poll_ticks(&self) -> usize {
        self.poll_ticks.load(Ordering::Relaxed)
    }

    pub fn convergences(&self) -> usize {
        self.convergences.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn superseded(&self) -> usize {
        self.superseded.load(Ordering::Relaxed)
    }

    pub fn widget_changes(&self) -> usize {
        self.widget_changes.load(Ordering::Relaxed)
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        let convergences = self.convergences();
        let timeouts = self.timeouts();
        let settled = convergences + timeouts;
        let convergence_rate = if settled > 0 {
            (convergences as f64 / settled as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            requests: self.requests(),
            rejected: self.rejected(),
            immediate_applies: self.immediate_applies(),
            poll_ticks: self.poll_ticks(),
            convergences,
            timeouts,
            superseded: self.superseded(),
            widget_changes: self.widget_changes(),
            convergence_rate,
        }
    }
}

/// Snapshot of the synchronization counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub requests: usize,
    pub rejected: usize,
    pub immediate_applies: usize,
    pub poll_ticks: usize,
    pub convergences: usize,
    pub timeouts: usize,
    pub superseded: usize,
    pub widget_changes: usize,

    /// Share of settled sessions that converged, as a percentage (0-100)
    pub convergence_rate: f64,
}
