use std::collections::VecDeque;

use serde::{Serialize, Deserialize};

use crate::metrics::statistics::Statistics;

/// Window of recent absolute value changes used to judge convergence
pub const CONVERGENCE_WINDOW: usize = 100;

/// Convergence indicators over the last window of value updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub mean_change: f32,
    pub max_change: f32,
    /// Inverse of the standard deviation of the recent changes, guarded as
    /// `1 / (1 + std)` so a perfectly steady window reads 1 instead of infinity
    pub stability: f32,
    pub samples: usize,
}

/// Tracks `|ΔQ|` of the most recent value-table updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceTracker {
    changes: VecDeque<f32>,
    window: usize,
}

impl ConvergenceTracker {
    pub fn new(window: usize) -> Self {
        ConvergenceTracker {
            changes: VecDeque::with_capacity(window),
            window: window.max(1),
        }
    }

    pub fn record(&mut self, change: f32) {
        if self.changes.len() == self.window {
            self.changes.pop_front();
        }
        self.changes.push_back(change.abs());
    }

    pub fn report(&self) -> ConvergenceReport {
        let stats = Statistics::from_values(self.changes.iter().copied());
        ConvergenceReport {
            mean_change: stats.mean,
            max_change: stats.max,
            stability: 1.0 / (1.0 + stats.std),
            samples: stats.count,
        }
    }

    /// True once the window is full and every recent change is below `tolerance`
    pub fn has_converged(&self, tolerance: f32) -> bool {
        self.changes.len() == self.window && self.changes.iter().all(|&c| c < tolerance)
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}

impl Default for ConvergenceTracker {
    fn default() -> Self {
        Self::new(CONVERGENCE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keeps_latest_changes() {
        let mut tracker = ConvergenceTracker::new(3);
        for change in [5.0, -1.0, 1.0, 1.0] {
            tracker.record(change);
        }
        let report = tracker.report();
        assert_eq!(report.samples, 3);
        assert_eq!(report.max_change, 1.0);
        assert_eq!(report.mean_change, 1.0);
        assert_eq!(report.stability, 1.0);
    }

    #[test]
    fn test_stability_is_guarded_inverse_std() {
        let mut tracker = ConvergenceTracker::new(4);
        tracker.record(1.0);
        tracker.record(-3.0);
        // |changes| = [1, 3], population std 1
        assert_eq!(tracker.report().stability, 0.5);
    }

    #[test]
    fn test_convergence_needs_full_window() {
        let mut tracker = ConvergenceTracker::new(2);
        tracker.record(1e-5);
        assert!(!tracker.has_converged(1e-3));
        tracker.record(1e-5);
        assert!(tracker.has_converged(1e-3));
    }
}
