//! Windowed Forecaster
//!
//! Per-plant online probabilistic forecast of near-term generation. Each
//! reading is processed in O(1) amortized time:
//!
//! 1. Sanitize features, substituting non-finite values
//! 2. Compute the pre-update band (consumed by the anomaly detector)
//! 3. Push into the rolling window, evicting entries beyond the horizon
//! 4. Update the residual correction (EWMA) and the three quantile regressors
//! 5. Emit a [`Forecast`] for the reading's timestamp
//!
//! Until the window holds `min_window_samples` readings the band is the
//! widened naive estimate `nameplate × clamp(irradiance / 1000) × 0.7` and
//! the forecast is marked low-confidence. Non-finite model output resets the
//! regressors and falls back to the naive band; it is never an error.

pub mod features;
pub mod quantile;
pub mod window;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::{defaults, ForecastConfig};
use crate::registry::PlantSpec;
use crate::types::{FeatureField, Forecast, Reading};

pub use features::{FeatureSanitizer, SanitizedFeatures, FEATURE_DIM};
pub use quantile::{pinball_loss, QuantileRegressor};
pub use window::RollingWindow;

// ============================================================================
// Per-plant model state
// ============================================================================

/// Forecast parameters and history for one plant. Lives inside `PlantState`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastModel {
    sanitizer: FeatureSanitizer,
    window: RollingWindow,
    /// Low, median, high
    regressors: [QuantileRegressor; 3],
    /// EWMA of (actual − raw median) as a capacity fraction
    correction: f64,
    /// Most recent |actual − pre-update median| values (MW)
    error_history: VecDeque<f64>,
    resets: u32,
}

impl ForecastModel {
    pub fn new(config: &ForecastConfig) -> Self {
        // Start every quantile at the naive band so the learned path begins
        // where the low-confidence path leaves off.
        let seed = |scale: f64| {
            let mut w = [0.0; FEATURE_DIM];
            w[4] = config.naive_performance_ratio * scale;
            w
        };
        let widen = config.low_confidence_widening;
        Self {
            sanitizer: FeatureSanitizer::default(),
            window: RollingWindow::new(config.horizon_hours),
            regressors: [
                QuantileRegressor::new(config.quantile_low, seed(1.0 - widen)),
                QuantileRegressor::new(0.5, seed(1.0)),
                QuantileRegressor::new(config.quantile_high, seed(1.0 + widen)),
            ],
            correction: 0.0,
            error_history: VecDeque::with_capacity(defaults::MAE_HISTORY_LEN),
            resets: 0,
        }
    }

    pub fn window_samples(&self) -> usize {
        self.window.len()
    }

    pub fn diagnostics(&self) -> ForecastDiagnostics {
        ForecastDiagnostics {
            mae_mw: self.window.mae_mw(),
            window_samples: self.window.len(),
            recent_errors_mw: self.error_history.iter().copied().collect(),
            improving: self.is_improving(),
            correction: self.correction,
            model_resets: self.resets,
        }
    }

    /// Recent half of the error history has a lower mean than the older half.
    fn is_improving(&self) -> bool {
        let n = self.error_history.len();
        if n < 4 {
            return false;
        }
        let all: Vec<f64> = self.error_history.iter().copied().collect();
        let (older, recent) = all.split_at(n / 2);
        mean(recent) < mean(older)
    }

    fn record_error(&mut self, abs_error_mw: f64) {
        if self.error_history.len() == defaults::MAE_HISTORY_LEN {
            self.error_history.pop_front();
        }
        self.error_history.push_back(abs_error_mw);
    }

    fn reset_regressors(&mut self) {
        for r in &mut self.regressors {
            r.reset();
        }
        self.correction = 0.0;
        self.resets += 1;
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Forecast health surfaced through the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDiagnostics {
    pub mae_mw: f64,
    pub window_samples: usize,
    pub recent_errors_mw: Vec<f64>,
    pub improving: bool,
    pub correction: f64,
    pub model_resets: u32,
}

// ============================================================================
// Forecaster
// ============================================================================

/// Result of feeding one reading through the forecaster.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastStep {
    /// Band predicted for this reading before the model saw it
    pub prior: Forecast,
    /// Forecast after the update, stamped with the reading's timestamp
    pub forecast: Forecast,
    pub substituted: Vec<FeatureField>,
    /// Model output was non-finite and the regressors were reset
    pub model_reset: bool,
}

/// Stateless forecaster; all state is in [`ForecastModel`].
#[derive(Debug, Clone)]
pub struct WindowedForecaster {
    config: ForecastConfig,
}

impl WindowedForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Feed one reading and produce the next forecast.
    pub fn observe(&self, model: &mut ForecastModel, plant: &PlantSpec, reading: &Reading) -> ForecastStep {
        let features = model.sanitizer.sanitize(reading);
        let x = features.vector();
        let mut model_reset = false;

        let samples = model.window.len();
        let prior = self.band_or_reset(model, plant, &features, reading.timestamp, samples, &mut model_reset);

        let abs_error = (reading.generation_mw - prior.p_median).abs();
        model.window.push(reading.timestamp, abs_error);
        model.record_error(abs_error);

        let target = reading.generation_mw / plant.nameplate_mw;
        let raw_median = model.regressors[1].predict(&x);
        if raw_median.is_finite() {
            model.correction += self.config.residual_correction_rate * ((target - raw_median) - model.correction);
        }
        for r in &mut model.regressors {
            r.update(&x, target, self.config.learning_rate);
        }

        let samples = model.window.len();
        let forecast = self.band_or_reset(model, plant, &features, reading.timestamp, samples, &mut model_reset);

        ForecastStep {
            prior,
            forecast,
            substituted: features.substituted,
            model_reset,
        }
    }

    fn band_or_reset(
        &self,
        model: &mut ForecastModel,
        plant: &PlantSpec,
        features: &SanitizedFeatures,
        timestamp: DateTime<Utc>,
        samples: usize,
        model_reset: &mut bool,
    ) -> Forecast {
        if let Some(band) = self.band(model, plant, features, timestamp, samples) {
            return band;
        }
        model.reset_regressors();
        *model_reset = true;
        warn!(
            plant = %plant.id,
            resets = model.resets,
            "[Forecaster] Non-finite model output, regressors reset"
        );
        self.naive(plant, features, timestamp, samples)
    }

    /// Band for the current model, or `None` when the model output is not finite.
    fn band(
        &self,
        model: &ForecastModel,
        plant: &PlantSpec,
        features: &SanitizedFeatures,
        timestamp: DateTime<Utc>,
        samples: usize,
    ) -> Option<Forecast> {
        if samples < self.config.min_window_samples {
            return Some(self.naive(plant, features, timestamp, samples));
        }

        let x = features.vector();
        let mut mw = [0.0; 3];
        for (out, r) in mw.iter_mut().zip(&model.regressors) {
            let q = r.predict(&x) + model.correction;
            if !q.is_finite() || !r.is_finite() {
                return None;
            }
            *out = (q * plant.nameplate_mw).clamp(0.0, plant.nameplate_mw);
        }
        Some(Forecast::sorted(&plant.id, timestamp, mw, false, samples))
    }

    /// Widened naive band used while the window is short.
    fn naive(
        &self,
        plant: &PlantSpec,
        features: &SanitizedFeatures,
        timestamp: DateTime<Utc>,
        samples: usize,
    ) -> Forecast {
        let ratio = (features.irradiance_wm2 / defaults::REFERENCE_IRRADIANCE_WM2).clamp(0.0, 1.0);
        let naive = plant.nameplate_mw * ratio * self.config.naive_performance_ratio;
        let w = self.config.low_confidence_widening;
        let low = (naive * (1.0 - w)).max(0.0);
        let high = (naive * (1.0 + w)).min(plant.nameplate_mw);
        Forecast::sorted(&plant.id, timestamp, [low, naive, high], true, samples)
    }
}
