//! Value scalers applied around the sequence model.
//!
//! A scaler is loaded once at startup and shared read-only by every request.
//! Two on-disk formats are understood, tried in order:
//!
//! 1. a fitted min-max transformer (`{"data_min", "data_max", "feature_range"}`),
//! 2. a minimal heuristic record (`{"max": f64}`), where a missing `max` means 1.0.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ScalerError;

/// Min-max scaler over a single feature, mapping `[data_min, data_max]`
/// onto `feature_range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: f64,
    pub data_max: f64,
    #[serde(default = "default_feature_range")]
    pub feature_range: (f64, f64),
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

impl MinMaxScaler {
    /// Fit over every value produced by `values`. Feature range is `(0, 1)`.
    pub fn fit<I>(values: I) -> Result<Self, ScalerError>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        let mut seen = false;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            lo = lo.min(v);
            hi = hi.max(v);
            seen = true;
        }
        if !seen {
            return Err(ScalerError::EmptyFit);
        }
        Ok(Self {
            data_min: lo,
            data_max: hi,
            feature_range: default_feature_range(),
        })
    }

    fn validate(&self) -> Result<(), ScalerError> {
        let (a, b) = self.feature_range;
        if !(a.is_finite() && b.is_finite() && a < b) {
            return Err(ScalerError::FeatureRange(a, b));
        }
        Ok(())
    }

    // Constant data (zero range) scales by the feature width, mapping to the lower bound.
    fn scale(&self) -> f64 {
        let (a, b) = self.feature_range;
        let range = self.data_max - self.data_min;
        let range = if range == 0.0 { 1.0 } else { range };
        (b - a) / range
    }

    fn offset(&self) -> f64 {
        self.feature_range.0 - self.data_min * self.scale()
    }

    pub fn transform(&self, x: f64) -> f64 {
        x * self.scale() + self.offset()
    }

    pub fn inverse_transform(&self, x: f64) -> f64 {
        (x - self.offset()) / self.scale()
    }

    pub fn load(path: &Path) -> Result<Self, ScalerError> {
        let txt = fs::read_to_string(path).map_err(|source| ScalerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let scaler: Self = serde_json::from_str(&txt).map_err(|source| ScalerError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let txt = serde_json::to_string_pretty(self)?;
        fs::write(path, txt)
    }
}

#[derive(Debug, Deserialize)]
struct HeuristicRecord {
    max: Option<f64>,
}

/// The scaler available to the inference pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Scaler {
    Fitted(MinMaxScaler),
    HeuristicMax(f64),
    Absent,
}

impl Scaler {
    /// Load the best available scaler. Never fails: problems are logged and
    /// the next format (or `Absent`) is used.
    pub fn load(fitted_path: &Path, heuristic_path: &Path) -> Self {
        if fitted_path.exists() {
            match MinMaxScaler::load(fitted_path) {
                Ok(s) => {
                    tracing::info!(
                        "loaded fitted scaler from {} (min={:.3} max={:.3})",
                        fitted_path.display(),
                        s.data_min,
                        s.data_max
                    );
                    return Scaler::Fitted(s);
                }
                Err(e) => tracing::error!("failed to load fitted scaler: {}", e),
            }
        }

        if heuristic_path.exists() {
            match load_heuristic(heuristic_path) {
                Ok(max) => {
                    tracing::info!(
                        "loaded heuristic scaler from {} (max={})",
                        heuristic_path.display(),
                        max
                    );
                    return Scaler::HeuristicMax(max);
                }
                Err(e) => tracing::error!("failed to load scaler info: {}", e),
            }
        }

        tracing::warn!("no scaler available; heuristic path will divide by 1.0");
        Scaler::Absent
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scaler::Fitted(_) => "fitted",
            Scaler::HeuristicMax(_) => "heuristic_max",
            Scaler::Absent => "absent",
        }
    }
}

fn load_heuristic(path: &Path) -> Result<f64, ScalerError> {
    let txt = fs::read_to_string(path).map_err(|source| ScalerError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rec: HeuristicRecord = serde_json::from_str(&txt).map_err(|source| ScalerError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rec.max.unwrap_or(1.0))
}
