use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

/// Which degradation tier produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    LstmModel,
    FallbackMean,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::LstmModel => "lstm_model",
            PredictionSource::FallbackMean => "fallback_mean",
        }
    }
}

/// Output of the inference pipeline. Same shape on every tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_time_min: f64,
    pub source: PredictionSource,
}

/// Ordered trip durations in minutes, oldest first. Never empty, all finite.
#[derive(Debug, Clone, PartialEq)]
pub struct History(Vec<f64>);

impl History {
    pub fn new(values: Vec<f64>) -> Result<Self, HistoryError> {
        if values.is_empty() {
            return Err(HistoryError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(HistoryError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed history.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }
}

impl TryFrom<Vec<f64>> for History {
    type Error = HistoryError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        History::new(values)
    }
}

// ---------- Request/Response types ----------

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    // expected list of numbers (minutes)
    pub history: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predicted_time_min: f64,
    pub source: PredictionSource,
}

impl From<Prediction> for PredictResponse {
    fn from(p: Prediction) -> Self {
        Self {
            predicted_time_min: p.predicted_time_min,
            source: p.source,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub origin: serde_json::Value,
    #[serde(default)]
    pub destination: serde_json::Value,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>, // route duration from routing engine
    pub hour: Option<f64>,       // accepted, not a model input
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub origin: serde_json::Value,
    pub destination: serde_json::Value,
    pub predicted_travel_time_min: f64,
    pub prediction_source: PredictionSource,
    pub history_used: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
}
