//! Event acquisition
//!
//! Normalization of raw telemetry, weather and control events into canonical
//! per-plant form, plus the seeded synthetic telemetry generator.

pub mod normalizer;
pub mod synthetic;

pub use normalizer::{
    normalize, route, solar_hour_at, ClearScope, NormalizeError, Normalized, Route, Watermarks,
    WeatherContext,
};
pub use synthetic::{clear_sky_ghi, SyntheticGenerator};
