use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};

use crate::error::ModelError;

/// A sequence-to-scalar model with a fixed input window.
///
/// `infer` receives exactly `declared_input_length()` scaled values, oldest
/// first, and treats them as one batch of shape `(1, L, 1)`.
pub trait SequenceModel: Send + Sync {
    fn declared_input_length(&self) -> usize;

    fn infer(&self, window: &[f64]) -> Result<f64, ModelError>;
}

/// Metadata written next to the model by the trainer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub seq_len: Option<usize>,
    pub model_file: Option<String>,
    pub scaler_file: Option<String>,
    pub num_samples: Option<usize>,
}

impl Metadata {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read metadata at {}", path.display()))?;
        serde_json::from_str(&txt).with_context(|| "failed to parse metadata.json")
    }
}

/// Load the model at `model_path`, returning `None` (and logging why) when it
/// is missing or unusable. `seq_len` is the window length the model was
/// trained with.
pub fn load_model(model_path: &Path, seq_len: usize) -> Option<Arc<dyn SequenceModel>> {
    if !model_path.exists() {
        tracing::warn!("no model at {}; serving mean fallback", model_path.display());
        return None;
    }
    load_backend(model_path, seq_len)
}

#[cfg(feature = "torch")]
fn load_backend(model_path: &Path, seq_len: usize) -> Option<Arc<dyn SequenceModel>> {
    match torch::TorchModel::new(model_path, seq_len) {
        Ok(m) => {
            tracing::info!("loaded TorchScript model {} (seq_len={})", model_path.display(), seq_len);
            Some(Arc::new(m))
        }
        Err(e) => {
            tracing::error!("failed to load model: {:#}", e);
            None
        }
    }
}

#[cfg(not(feature = "torch"))]
fn load_backend(model_path: &Path, _seq_len: usize) -> Option<Arc<dyn SequenceModel>> {
    tracing::warn!(
        "model found at {} but this build has no `torch` feature; serving mean fallback",
        model_path.display()
    );
    None
}

#[cfg(feature = "torch")]
pub mod torch {
    use anyhow::{bail, Context, Result};
    use std::path::Path;
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::SequenceModel;
    use crate::error::ModelError;

    pub struct TorchModel {
        model: CModule,
        device: Device,
        seq_len: usize,
    }

    impl TorchModel {
        pub fn new(model_path: &Path, seq_len: usize) -> Result<Self> {
            if seq_len == 0 {
                bail!("seq_len must be at least 1");
            }
            let device = Device::Cpu;

            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path.display()))?;

            // Warmup forward with the declared window — expect a single scalar back
            let dummy = Tensor::zeros([1, seq_len as i64, 1], (Kind::Float, device));
            let t = model.forward_ts(&[dummy])?;
            if t.numel() != 1 {
                bail!("unexpected model output size: {:?}", t.size());
            }

            Ok(Self {
                model,
                device,
                seq_len,
            })
        }
    }

    impl SequenceModel for TorchModel {
        fn declared_input_length(&self) -> usize {
            self.seq_len
        }

        fn infer(&self, window: &[f64]) -> Result<f64, ModelError> {
            if window.len() != self.seq_len {
                return Err(ModelError::WindowMismatch {
                    got: window.len(),
                    expected: self.seq_len,
                });
            }

            let xs: Vec<f32> = window.iter().map(|v| *v as f32).collect();
            let input = Tensor::from_slice(&xs)
                .reshape([1, self.seq_len as i64, 1])
                .to_device(self.device);

            let out = tch::no_grad(|| self.model.forward_ts(&[input]))
                .map_err(|e| ModelError::Backend(e.to_string()))?;
            if out.numel() != 1 {
                return Err(ModelError::OutputShape(out.size()));
            }

            Ok(out.reshape([1]).to_kind(Kind::Double).double_value(&[0]))
        }
    }
}
