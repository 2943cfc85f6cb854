//! Online linear quantile regression
//!
//! One regressor per quantile level τ, trained by stochastic gradient descent
//! on the pinball loss:
//!
//! ```text
//! L_τ(y, ŷ) = max(τ (y − ŷ), (τ − 1)(y − ŷ))
//! w ← w + η (τ − 1[y < ŷ]) x
//! ```
//!
//! Targets are capacity fractions (generation / nameplate) so the same
//! learning rate works for every plant size.

use super::features::FEATURE_DIM;

/// Linear model for a single quantile level.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileRegressor {
    tau: f64,
    weights: [f64; FEATURE_DIM],
    initial: [f64; FEATURE_DIM],
}

impl QuantileRegressor {
    /// New regressor starting from `initial` weights.
    pub fn new(tau: f64, initial: [f64; FEATURE_DIM]) -> Self {
        Self {
            tau,
            weights: initial,
            initial,
        }
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn predict(&self, x: &[f64; FEATURE_DIM]) -> f64 {
        self.weights.iter().zip(x).map(|(w, v)| w * v).sum()
    }

    /// One pinball-loss SGD step.
    pub fn update(&mut self, x: &[f64; FEATURE_DIM], y: f64, learning_rate: f64) {
        let below = if y < self.predict(x) { 1.0 } else { 0.0 };
        let step = learning_rate * (self.tau - below);
        for (w, v) in self.weights.iter_mut().zip(x) {
            *w += step * v;
        }
    }

    /// Restore the initial weights.
    pub fn reset(&mut self) {
        self.weights = self.initial;
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().all(|w| w.is_finite())
    }
}

/// Pinball loss, used by diagnostics and tests.
pub fn pinball_loss(tau: f64, y: f64, prediction: f64) -> f64 {
    let diff = y - prediction;
    (tau * diff).max((tau - 1.0) * diff)
}
