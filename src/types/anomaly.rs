use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FaultType, Severity};

/// What tripped the anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Metered output outside the pre-update forecast band plus tolerance
    OutOfRange,
    /// Output collapsed to ~0 while irradiance stayed up
    Dropout,
    /// Identical non-zero values for several consecutive readings
    Flatline,
    /// Output persistently below the median forecast
    Underperformance,
    /// Non-finite feature values were substituted
    CorruptFeature,
    /// Fault injected out-of-band
    InjectedFault,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::OutOfRange => write!(f, "out_of_range"),
            AnomalyKind::Dropout => write!(f, "dropout"),
            AnomalyKind::Flatline => write!(f, "flatline"),
            AnomalyKind::Underperformance => write!(f, "underperformance"),
            AnomalyKind::CorruptFeature => write!(f, "corrupt_feature"),
            AnomalyKind::InjectedFault => write!(f, "injected_fault"),
        }
    }
}

/// Band the observed value was compared against (MW).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRange {
    pub low: f64,
    pub high: f64,
}

impl ExpectedRange {
    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.low - tolerance && value <= self.high + tolerance
    }

    /// Distance outside the band, zero when inside.
    pub fn excess(&self, value: f64) -> f64 {
        if value < self.low {
            self.low - value
        } else if value > self.high {
            value - self.high
        } else {
            0.0
        }
    }
}

/// Terminal anomaly record, independent of any decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AnomalyKind,
    pub observed_value: f64,
    pub expected_range: ExpectedRange,
    pub severity: Severity,
    #[serde(default)]
    pub fault_type: Option<FaultType>,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_range_excess() {
        let r = ExpectedRange { low: 10.0, high: 20.0 };
        assert_eq!(r.excess(15.0), 0.0);
        assert_eq!(r.excess(5.0), 5.0);
        assert_eq!(r.excess(26.0), 6.0);
        assert!(r.contains(21.0, 1.5));
        assert!(!r.contains(22.0, 1.5));
    }
}
