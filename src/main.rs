use anyhow::Context;
use tracing_subscriber::EnvFilter;

use route_predictor::{
    config::ServiceConfig,
    model::{self, Metadata},
    server::{self, AppState},
    Artifacts, History, Scaler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = ServiceConfig::from_env().context("invalid service configuration")?;

    // Window length comes from the trainer's metadata when present
    let meta = match Metadata::load(&cfg.metadata_path()) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!("no usable metadata ({:#}); using SEQ_LEN={}", e, cfg.seq_len);
            None
        }
    };
    let seq_len = match meta.as_ref().and_then(|m| m.seq_len) {
        Some(n) => {
            if n != cfg.seq_len {
                tracing::warn!("metadata seq_len ({}) != SEQ_LEN ({}); using metadata", n, cfg.seq_len);
            }
            n
        }
        None => cfg.seq_len,
    };
    if let Some(m) = &meta {
        tracing::info!(
            "metadata: seq_len={:?} model_file={:?} scaler_file={:?} num_samples={:?}",
            m.seq_len,
            m.model_file,
            m.scaler_file,
            m.num_samples
        );
    }

    let mdl = model::load_model(&cfg.model_path(), seq_len);
    let scaler = Scaler::load(&cfg.scaler_fitted_path(), &cfg.scaler_path());
    let artifacts = Artifacts::new(mdl, scaler);
    tracing::info!(
        "model_loaded={} scaler={}",
        artifacts.model_loaded(),
        artifacts.scaler.kind()
    );

    // Warmup so a broken model shows up in the startup log
    if artifacts.model_loaded() {
        let probe = History::new(vec![10.0; seq_len.max(1)])?;
        let p = route_predictor::predict(&probe, &artifacts);
        tracing::info!("warmup prediction {:.3} via {}", p.predicted_time_min, p.source.as_str());
    }

    let state = AppState::new(artifacts, cfg.history_count);
    let app = server::router(state, server::cors_layer(&cfg.cors_origins));

    let addr = format!("{}:{}", cfg.host, cfg.port);
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
