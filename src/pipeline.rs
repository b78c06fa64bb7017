//! Online inference: history → fixed window → scale → model → inverse scale.
//!
//! `predict` never fails. Tiers, in order:
//! - no model loaded: mean of the history (`fallback_mean`)
//! - model + fitted scaler, or model + heuristic/absent scaler (`lstm_model`)
//! - any error while scaling or inferring: mean of the history (`fallback_mean`)

use std::sync::Arc;

use crate::error::ModelError;
use crate::model::SequenceModel;
use crate::scaler::Scaler;
use crate::types::{History, Prediction, PredictionSource};

/// Process-wide, read-only inference state. Built once at startup.
#[derive(Clone)]
pub struct Artifacts {
    pub model: Option<Arc<dyn SequenceModel>>,
    pub scaler: Scaler,
}

impl Artifacts {
    pub fn new(model: Option<Arc<dyn SequenceModel>>, scaler: Scaler) -> Self {
        Self { model, scaler }
    }

    /// No model, no scaler: every prediction is the history mean.
    pub fn empty() -> Self {
        Self::new(None, Scaler::Absent)
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }
}

impl std::fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifacts")
            .field(
                "model_seq_len",
                &self.model.as_ref().map(|m| m.declared_input_length()),
            )
            .field("scaler", &self.scaler)
            .finish()
    }
}

/// Fit `history` to exactly `seq_len` values.
///
/// Shorter histories are left-padded with their own mean; longer ones keep
/// the most recent `seq_len` values.
pub fn normalize_window(history: &History, seq_len: usize) -> Vec<f64> {
    let values = history.values();
    if values.len() < seq_len {
        let pad = history.mean();
        let mut seq = vec![pad; seq_len - values.len()];
        seq.extend_from_slice(values);
        seq
    } else {
        values[values.len() - seq_len..].to_vec()
    }
}

pub fn predict(history: &History, artifacts: &Artifacts) -> Prediction {
    let Some(model) = artifacts.model.as_deref() else {
        return fallback(history);
    };

    match run_model(history, model, &artifacts.scaler) {
        Ok(pred) => Prediction {
            predicted_time_min: pred,
            source: PredictionSource::LstmModel,
        },
        Err(e) => {
            tracing::error!("prediction error: {}", e);
            fallback(history)
        }
    }
}

fn fallback(history: &History) -> Prediction {
    Prediction {
        predicted_time_min: history.mean(),
        source: PredictionSource::FallbackMean,
    }
}

fn run_model(history: &History, model: &dyn SequenceModel, scaler: &Scaler) -> Result<f64, ModelError> {
    let seq_len = model.declared_input_length();
    let seq = normalize_window(history, seq_len);

    let pred = match scaler {
        Scaler::Fitted(s) => {
            let scaled: Vec<f64> = seq.iter().map(|v| s.transform(*v)).collect();
            let yhat = checked(model.infer(&scaled)?)?;
            s.inverse_transform(yhat)
        }
        Scaler::HeuristicMax(max_val) => infer_divided(model, &seq, *max_val)?,
        Scaler::Absent => infer_divided(model, &seq, 1.0)?,
    };

    tracing::debug!(
        seq_len,
        history_len = history.len(),
        scaler = scaler.kind(),
        pred,
        "model prediction"
    );
    checked(pred)
}

fn infer_divided(model: &dyn SequenceModel, seq: &[f64], max_val: f64) -> Result<f64, ModelError> {
    if max_val == 0.0 || !max_val.is_finite() {
        return Err(ModelError::InvalidDivisor(max_val));
    }
    let scaled: Vec<f64> = seq.iter().map(|v| v / max_val).collect();
    let yhat = checked(model.infer(&scaled)?)?;
    Ok(yhat * max_val)
}

fn checked(v: f64) -> Result<f64, ModelError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ModelError::NonFinite(v))
    }
}
