use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-point generation forecast for one plant at one instant.
///
/// `p_low <= p_median <= p_high` holds for every value constructed through
/// [`Forecast::sorted`], which is the only path the forecaster uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    /// 10th percentile generation (MW)
    pub p_low: f64,
    /// Median generation (MW)
    pub p_median: f64,
    /// 90th percentile generation (MW)
    pub p_high: f64,
    /// Window below the minimum sample count; bounds are the widened naive band
    pub low_confidence: bool,
    /// Readings inside the rolling window when the forecast was produced
    pub window_samples: usize,
}

impl Forecast {
    /// Build a forecast from three (possibly crossed) estimates.
    pub fn sorted(
        plant_id: &str,
        timestamp: DateTime<Utc>,
        estimates: [f64; 3],
        low_confidence: bool,
        window_samples: usize,
    ) -> Self {
        let mut q = estimates;
        q.sort_by(f64::total_cmp);
        Self {
            plant_id: plant_id.to_string(),
            timestamp,
            p_low: q[0],
            p_median: q[1],
            p_high: q[2],
            low_confidence,
            window_samples,
        }
    }

    /// Width of the 10–90 band (MW).
    pub fn spread(&self) -> f64 {
        self.p_high - self.p_low
    }

    pub fn is_ordered(&self) -> bool {
        self.p_low <= self.p_median && self.p_median <= self.p_high
    }
}
