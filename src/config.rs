use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::ConfigError;
use crate::sequences::{DEFAULT_MAX_TOTAL, DEFAULT_ROUTE_PRECISION, DEFAULT_WINDOW_LEN};
use crate::synth::DEFAULT_COUNT;

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key,
                expected,
                value: raw,
            })
        }
        _ => Ok(default),
    }
}

fn string_var(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Settings for the prediction service.
///
/// | Env Var              | Default              |
/// |----------------------|----------------------|
/// | `MODEL_DIR`          | `model`              |
/// | `MODEL_FILE`         | `lstm_model.pt`      |
/// | `METADATA_FILE`      | `metadata.json`      |
/// | `SCALER_FITTED_FILE` | `scaler_minmax.json` |
/// | `SCALER_FILE`        | `scaler.json`        |
/// | `SEQ_LEN`            | `10`                 |
/// | `HISTORY_COUNT`      | `10`                 |
/// | `HOST`               | `0.0.0.0`            |
/// | `PORT`               | `5000`               |
/// | `CORS_ORIGINS`       | `*`                  |
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub model_dir: PathBuf,
    pub model_file: String,
    pub metadata_file: String,
    pub scaler_fitted_file: String,
    pub scaler_file: String,
    /// Window length used when no metadata record is available.
    pub seq_len: usize,
    /// Length of the synthetic history built by `/optimize`.
    pub history_count: usize,
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cors_origins = string_var(&lookup, "CORS_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "*")
            .collect();

        Ok(Self {
            model_dir: PathBuf::from(string_var(&lookup, "MODEL_DIR", "model")),
            model_file: string_var(&lookup, "MODEL_FILE", "lstm_model.pt"),
            metadata_file: string_var(&lookup, "METADATA_FILE", "metadata.json"),
            scaler_fitted_file: string_var(&lookup, "SCALER_FITTED_FILE", "scaler_minmax.json"),
            scaler_file: string_var(&lookup, "SCALER_FILE", "scaler.json"),
            seq_len: parse_var(&lookup, "SEQ_LEN", "usize", DEFAULT_WINDOW_LEN)?,
            history_count: parse_var(&lookup, "HISTORY_COUNT", "usize", DEFAULT_COUNT)?,
            host: string_var(&lookup, "HOST", "0.0.0.0"),
            port: parse_var(&lookup, "PORT", "u16", 5000)?,
            cors_origins,
        })
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.model_dir.join(&self.metadata_file)
    }

    pub fn scaler_fitted_path(&self) -> PathBuf {
        self.model_dir.join(&self.scaler_fitted_file)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.model_dir.join(&self.scaler_file)
    }
}

/// Settings for the offline sequence build. Loaded from an optional JSON
/// file, then overridden by environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub raw_csv: PathBuf,
    pub out_dir: PathBuf,
    pub seq_len: usize,
    pub max_total: usize,
    pub route_precision: u32,
    /// Also fit a min-max scaler over the windows and save it to `out_dir`.
    pub fit_scaler: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            raw_csv: PathBuf::from("data/raw/nyc_taxi_trip_duration.csv"),
            out_dir: PathBuf::from("data/processed"),
            seq_len: DEFAULT_WINDOW_LEN,
            max_total: DEFAULT_MAX_TOTAL,
            route_precision: DEFAULT_ROUTE_PRECISION,
            fit_scaler: true,
        }
    }
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `BUILD_CONFIG` (optional JSON file), then `RAW_CSV`, `OUT_DIR`,
    /// `SEQ_LEN`, `MAX_TOTAL`, `ROUTE_PRECISION`, `FIT_SCALER`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match env_lookup("BUILD_CONFIG") {
            Some(path) if !path.trim().is_empty() => Self::load(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        base.with_overrides(env_lookup)
    }

    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            raw_csv: lookup("RAW_CSV")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(self.raw_csv),
            out_dir: lookup("OUT_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(self.out_dir),
            seq_len: parse_var(&lookup, "SEQ_LEN", "usize", self.seq_len)?,
            max_total: parse_var(&lookup, "MAX_TOTAL", "usize", self.max_total)?,
            route_precision: parse_var(&lookup, "ROUTE_PRECISION", "u32", self.route_precision)?,
            fit_scaler: parse_var(&lookup, "FIT_SCALER", "bool", self.fit_scaler)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_service_defaults() {
        let cfg = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.seq_len, 10);
        assert_eq!(cfg.history_count, 10);
        assert!(cfg.cors_origins.is_empty());
        assert_eq!(cfg.model_path(), PathBuf::from("model/lstm_model.pt"));
        assert_eq!(cfg.scaler_fitted_path(), PathBuf::from("model/scaler_minmax.json"));
    }

    #[test]
    fn test_service_overrides() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("MODEL_DIR", "/srv/artifacts"),
            ("CORS_ORIGINS", "http://localhost:5173, https://maps.example.com"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.metadata_path(), PathBuf::from("/srv/artifacts/metadata.json"));
        assert_eq!(cfg.cors_origins.len(), 2);
    }

    #[test]
    fn test_invalid_port() {
        let err = ServiceConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_build_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.json");
        fs::write(&path, r#"{"seq_len": 6, "max_total": 500, "fit_scaler": false}"#).unwrap();

        let cfg = BuildConfig::load(&path)
            .unwrap()
            .with_overrides(lookup(&[("MAX_TOTAL", "50")]))
            .unwrap();
        assert_eq!(cfg.seq_len, 6);
        assert_eq!(cfg.max_total, 50);
        assert!(!cfg.fit_scaler);
        assert_eq!(cfg.out_dir, PathBuf::from("data/processed"));
    }
}
