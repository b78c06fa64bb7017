//! Build sliding-window training sequences from a raw trip CSV.
//!
//! Configured through `BUILD_CONFIG` / `RAW_CSV` / `OUT_DIR` / `SEQ_LEN` /
//! `MAX_TOTAL` / `ROUTE_PRECISION` / `FIT_SCALER`.

use anyhow::{Context, Result};
use std::fs::File;
use tracing_subscriber::EnvFilter;

use route_predictor::{config::BuildConfig, sequences::SequenceBuilder, MinMaxScaler};

const SCALER_FILE: &str = "scaler_minmax.json";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = BuildConfig::from_env().context("invalid build configuration")?;
    tracing::info!("loading raw CSV {}", cfg.raw_csv.display());

    let file = File::open(&cfg.raw_csv)
        .with_context(|| format!("failed to open {}", cfg.raw_csv.display()))?;
    let builder = SequenceBuilder::new(cfg.seq_len, cfg.max_total).with_route_precision(cfg.route_precision);
    let (dataset, summary) = builder.build(file)?;

    if summary.cap_reached {
        tracing::warn!(
            "sample cap {} reached; route groups sorting later are under-represented",
            cfg.max_total
        );
    }

    let (x_path, y_path) = dataset.write_csv(&cfg.out_dir)?;
    tracing::info!(
        "saved {} sequences of length {} to {} and {}",
        dataset.len(),
        dataset.window_len,
        x_path.display(),
        y_path.display()
    );

    if cfg.fit_scaler {
        match MinMaxScaler::fit(dataset.window_values()) {
            Ok(scaler) => {
                let path = cfg.out_dir.join(SCALER_FILE);
                scaler
                    .save(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!(
                    "saved scaler (min={:.3} max={:.3}) to {}",
                    scaler.data_min,
                    scaler.data_max,
                    path.display()
                );
            }
            Err(e) => tracing::warn!("scaler not fitted: {}", e),
        }
    }
    Ok(())
}
