use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::pipeline::{self, Artifacts};
use crate::synth;
use crate::types::{
    HealthResponse, History, OptimizeRequest, OptimizeResponse, PredictRequest, PredictResponse,
    Prediction, PredictionSource,
};

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub artifacts: Arc<Artifacts>,
    pub history_count: usize, // synthetic history length for /optimize
}

impl AppState {
    pub fn new(artifacts: Artifacts, history_count: usize) -> Self {
        Self {
            artifacts: Arc::new(artifacts),
            history_count,
        }
    }
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg.into() })))
}

/// Synthesize a short history from the routing-engine estimate, then predict on it.
pub fn optimize_route<R: Rng + ?Sized>(
    req: OptimizeRequest,
    artifacts: &Artifacts,
    rng: &mut R,
    count: usize,
) -> OptimizeResponse {
    let history = synth::synthesize(rng, req.duration_s, req.distance_m, count.max(1));
    let pred = History::new(history.clone())
        .map(|h| pipeline::predict(&h, artifacts))
        .unwrap_or_else(|e| {
            tracing::error!("synthetic history rejected: {}", e);
            Prediction {
                predicted_time_min: synth::baseline_min(req.duration_s, req.distance_m),
                source: PredictionSource::FallbackMean,
            }
        });

    OptimizeResponse {
        origin: req.origin,
        destination: req.destination,
        predicted_travel_time_min: pred.predicted_time_min,
        prediction_source: pred.source,
        history_used: history,
    }
}

// ---------- Handlers ----------

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Route travel-time prediction API",
        "endpoints": {
            "GET /health": "Check API health and model status",
            "POST /predict": "Predict travel time from history",
            "POST /optimize": "Predict travel time for a routing-engine estimate"
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model_loaded: state.artifacts.model_loaded(),
    })
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| {
        tracing::debug!("rejected /predict body: {}", e);
        bad_request("history must be a list of numbers")
    })?;
    let values = req
        .history
        .ok_or_else(|| bad_request("history must be a list of numbers"))?;
    let history = History::new(values).map_err(|e| bad_request(e.to_string()))?;

    let pred = pipeline::predict(&history, &state.artifacts);
    tracing::debug!(
        history_len = history.len(),
        source = pred.source.as_str(),
        pred = pred.predicted_time_min,
        "predict"
    );
    Ok(Json(pred.into()))
}

/// A missing or unparseable body runs as `{}`. Well-formed JSON with a wrongly
/// typed field is a 400.
pub async fn optimize(
    State(state): State<AppState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(JsonRejection::JsonDataError(e)) => {
            return Err(bad_request(format!("invalid /optimize body: {}", e.body_text())));
        }
        Err(e) => {
            tracing::warn!("unreadable /optimize body, using defaults: {}", e);
            OptimizeRequest::default()
        }
    };
    let out = optimize_route(req, &state.artifacts, &mut rand::rng(), state.history_count);
    Ok(Json(out))
}

// ---------- Router ----------

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("ignoring invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/optimize", post(optimize))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::model::SequenceModel;
    use crate::scaler::Scaler;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use rand::{rngs::StdRng, SeedableRng};
    use tower::ServiceExt;

    struct Constant(f64);

    impl SequenceModel for Constant {
        fn declared_input_length(&self) -> usize {
            10
        }

        fn infer(&self, _window: &[f64]) -> Result<f64, ModelError> {
            Ok(self.0)
        }
    }

    fn state_without_model() -> AppState {
        AppState::new(Artifacts::empty(), 10)
    }

    #[tokio::test]
    async fn test_predict_mean_without_model() {
        let req = PredictRequest {
            history: Some(vec![10.0, 12.0, 11.0, 9.0, 10.0, 13.0, 12.0, 11.0, 10.0, 9.0]),
        };
        let Json(out) = predict(State(state_without_model()), Ok(Json(req))).await.unwrap();
        assert!((out.predicted_time_min - 10.7).abs() < 1e-9);
        assert_eq!(out.source, PredictionSource::FallbackMean);
    }

    #[tokio::test]
    async fn test_predict_rejects_missing_or_empty_history() {
        let err = predict(State(state_without_model()), Ok(Json(PredictRequest { history: None })))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = predict(
            State(state_without_model()),
            Ok(Json(PredictRequest { history: Some(vec![]) })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1 .0["error"].is_string());
    }

    #[tokio::test]
    async fn test_predict_with_model() {
        let state = AppState::new(
            Artifacts::new(Some(Arc::new(Constant(0.5))), Scaler::HeuristicMax(40.0)),
            10,
        );
        let req = PredictRequest {
            history: Some(vec![18.0, 22.0]),
        };
        let Json(out) = predict(State(state), Ok(Json(req))).await.unwrap();
        assert_eq!(out.source, PredictionSource::LstmModel);
        assert_eq!(out.predicted_time_min, 20.0);
    }

    #[tokio::test]
    async fn test_health_reports_model() {
        let Json(h) = health(State(state_without_model())).await;
        assert_eq!(h.status, "ok");
        assert!(!h.model_loaded);
    }

    #[test]
    fn test_optimize_route_echoes_and_predicts() {
        let req = OptimizeRequest {
            origin: json!({"lat": 40.76, "lng": -73.98}),
            destination: json!("JFK"),
            duration_s: Some(600.0),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let out = optimize_route(req, &Artifacts::empty(), &mut rng, 10);

        assert_eq!(out.origin["lat"], 40.76);
        assert_eq!(out.destination, "JFK");
        assert_eq!(out.history_used.len(), 10);
        assert_eq!(out.prediction_source, PredictionSource::FallbackMean);
        let mean = out.history_used.iter().sum::<f64>() / 10.0;
        assert!((out.predicted_travel_time_min - mean).abs() < 1e-9);
        assert!((9.0..=11.0).contains(&out.predicted_travel_time_min));
    }

    #[tokio::test]
    async fn test_optimize_defaults_to_one_km() {
        let state = state_without_model();
        let req = OptimizeRequest::default();
        let Json(out) = optimize(State(state), Ok(Json(req))).await.unwrap();
        // no duration, no distance: 1 km at 5 min/km
        for v in &out.history_used {
            assert!((4.5..=5.5).contains(v));
        }
    }

    async fn send(app: Router, req: Request<Body>) -> axum::response::Response {
        app.oneshot(req).await.unwrap()
    }

    fn get_with_origin(origin: &str) -> Request<Body> {
        Request::builder()
            .uri("/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    }

    fn post_optimize(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/optimize")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_cors_allows_listed_origin_and_drops_invalid_entry() {
        let origins = ["http://localhost:5173".to_string(), "bad\norigin".to_string()];
        let app = router(state_without_model(), cors_layer(&origins));

        let resp = send(app.clone(), get_with_origin("http://localhost:5173")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );

        let resp = send(app, get_with_origin("http://evil.example")).await;
        assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_cors_any_origin_when_unconfigured() {
        let app = router(state_without_model(), cors_layer(&[]));
        let resp = send(app, get_with_origin("http://evil.example")).await;
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }

    #[tokio::test]
    async fn test_optimize_rejects_wrong_field_types() {
        let app = router(state_without_model(), cors_layer(&[]));
        let resp = send(app, post_optimize(r#"{"origin": "A", "hour": "8"}"#)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_optimize_unreadable_body_runs_as_empty_request() {
        let app = router(state_without_model(), cors_layer(&[]));

        let resp = send(app.clone(), post_optimize("{}")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(app.clone(), post_optimize("not json")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let no_body = Request::builder()
            .method(Method::POST)
            .uri("/optimize")
            .body(Body::empty())
            .unwrap();
        let resp = send(app, no_body).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["prediction_source"], "fallback_mean");
        assert_eq!(body["history_used"].as_array().unwrap().len(), 10);
    }
}
