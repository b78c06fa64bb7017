use std::path::PathBuf;

/// Rejected caller input. Surfaced by the HTTP layer as a 400.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HistoryError {
    #[error("history must be a non-empty list of numbers")]
    Empty,

    #[error("history value at index {index} is not a finite number")]
    NonFinite { index: usize },
}

/// Failure inside a single inference call. Never leaves the pipeline:
/// it is logged and the call degrades to the mean fallback.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("window length mismatch: got {got}, model expects {expected}")]
    WindowMismatch { got: usize, expected: usize },

    #[error("scaler divisor must be finite and non-zero, got {0}")]
    InvalidDivisor(f64),

    #[error("non-finite value produced during inference: {0}")]
    NonFinite(f64),

    #[error("model expects a single scalar output, got shape {0:?}")]
    OutputShape(Vec<i64>),

    #[error("inference backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScalerError {
    #[error("failed to read scaler at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scaler at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot fit a scaler on an empty dataset")]
    EmptyFit,

    #[error("invalid feature range ({0}, {1})")]
    FeatureRange(f64, f64),
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("raw trip source is missing required column `{0}`")]
    MissingColumn(&'static str),

    #[error("window length must be at least 1")]
    ZeroWindow,

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got `{value}`")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
