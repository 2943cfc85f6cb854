//! Time-bounded rolling window of forecast residuals.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
struct WindowEntry {
    timestamp: DateTime<Utc>,
    abs_residual_mw: f64,
}

/// Readings inside the forecast horizon with a running |residual| sum.
///
/// Push and evict are O(1) amortized; MAE is read without a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    entries: VecDeque<WindowEntry>,
    horizon: Duration,
    abs_residual_sum: f64,
}

impl RollingWindow {
    pub fn new(horizon_hours: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let horizon = Duration::milliseconds((horizon_hours * 3_600_000.0).round() as i64);
        Self {
            entries: VecDeque::new(),
            horizon,
            abs_residual_sum: 0.0,
        }
    }

    /// Insert a reading and evict everything older than the horizon.
    pub fn push(&mut self, timestamp: DateTime<Utc>, abs_residual_mw: f64) {
        self.entries.push_back(WindowEntry {
            timestamp,
            abs_residual_mw,
        });
        self.abs_residual_sum += abs_residual_mw;

        let cutoff = timestamp - self.horizon;
        while let Some(front) = self.entries.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.abs_residual_sum -= front.abs_residual_mw;
            self.entries.pop_front();
        }
        if self.entries.is_empty() {
            self.abs_residual_sum = 0.0;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean absolute residual over the window (MW).
    pub fn mae_mw(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = self.entries.len() as f64;
            (self.abs_residual_sum / n).max(0.0)
        }
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.entries.front().map(|e| e.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_evicts_entries_older_than_horizon() {
        let mut w = RollingWindow::new(1.0);
        w.push(at(6, 0), 2.0);
        w.push(at(6, 30), 4.0);
        assert_eq!(w.len(), 2);
        assert!((w.mae_mw() - 3.0).abs() < 1e-12);

        w.push(at(7, 15), 6.0);
        assert_eq!(w.len(), 2);
        assert_eq!(w.oldest(), Some(at(6, 30)));
        assert!((w.mae_mw() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_entry_exactly_at_horizon_is_kept() {
        let mut w = RollingWindow::new(1.0);
        w.push(at(6, 0), 1.0);
        w.push(at(7, 0), 1.0);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn test_empty_window_mae_is_zero() {
        let w = RollingWindow::new(6.0);
        assert!(w.is_empty());
        assert_eq!(w.mae_mw(), 0.0);
    }
}
