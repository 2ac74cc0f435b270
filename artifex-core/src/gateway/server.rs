//! HTTP gateway server built on axum.

use super::GatewayConfig;
use artifex_ml::features::ListingRecord;
use artifex_ml::inference::{HealthStatus, ImageAnalysis, ModelInfo};
use artifex_ml::{MlError, PredictionResult, PredictionService};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, State,
        rejection::{BytesRejection, JsonRejection},
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state. Cloning is cheap; the service is behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<PredictionService>,
    timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>, config: &GatewayConfig) -> Self {
        Self::with_timeout(service, Duration::from_secs(config.request_timeout_secs))
    }

    pub(crate) fn with_timeout(service: Arc<PredictionService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn service(&self) -> &Arc<PredictionService> {
        &self.service
    }
}

/// `POST /predict` body: listing fields plus an optional base64 image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(flatten)]
    pub listing: ListingRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

/// Errors surfaced over HTTP as `{error, detail}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Ml(#[from] MlError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request exceeded {0:?} budget")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ml(MlError::InvalidInput(_)) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Ml(MlError::InvalidImage(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Ml(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Ml(MlError::InvalidInput(_)) => "invalid_input",
            Self::Ml(MlError::InvalidImage(_)) => "invalid_image",
            Self::Ml(MlError::Scoring(_)) => "scoring_failed",
            Self::Ml(MlError::SchemaMismatch(_)) => "schema_mismatch",
            Self::Ml(_) | Self::Internal(_) => "internal_error",
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Timeout(_) => "timeout",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        let body = serde_json::json!({
            "error": self.code(),
            "detail": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

impl From<BytesRejection> for GatewayError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

/// Build the router with every endpoint, CORS and request tracing.
pub fn router(state: AppState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/model/info", get(model_info_handler))
        .route("/predict", post(predict_handler))
        .route("/analyze-image", post(analyze_image_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Run `work` on the blocking pool within the request budget.
///
/// On timeout the task is abandoned; it owns only its inputs and an `Arc` to
/// the read-only service.
async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: FnOnce(&PredictionService) -> Result<T, MlError> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    let task = tokio::task::spawn_blocking(move || work(service.as_ref()));
    match tokio::time::timeout(state.timeout, task).await {
        Err(_) => Err(GatewayError::Timeout(state.timeout)),
        Ok(Err(join)) => Err(GatewayError::Internal(format!("worker failed: {join}"))),
        Ok(Ok(result)) => result.map_err(GatewayError::from),
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Artifex art price prediction API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.service.health())
}

async fn model_info_handler(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.service.model_info())
}

/// Decode an inline image, accepting an optional `data:` URL prefix.
///
/// Size is not checked here: an oversized image degrades the prediction
/// inside the service instead of rejecting the listing.
fn decode_image(encoded: &str) -> Result<Vec<u8>, GatewayError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| MlError::invalid_input(format!("image_base64 is not valid base64: {e}")))?;
    Ok(bytes)
}

async fn predict_handler(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, GatewayError> {
    let Json(request) = payload?;
    let image = request
        .image_base64
        .as_deref()
        .map(decode_image)
        .transpose()?;
    let listing = request.listing;

    let result = run_blocking(&state, move |service| {
        service.predict(&listing, image.as_deref())
    })
    .await?;
    Ok(Json(result))
}

async fn analyze_image_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ImageAnalysis>, GatewayError> {
    let bytes = body?;
    let limit = state.service.max_image_bytes();
    if bytes.len() > limit {
        return Err(GatewayError::PayloadTooLarge(format!(
            "image is {} bytes, limit is {limit}",
            bytes.len()
        )));
    }
    let analysis = run_blocking(&state, move |service| service.analyze_image(&bytes)).await?;
    Ok(Json(analysis))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Serve until Ctrl-C.
pub async fn run(state: AppState, config: &GatewayConfig) -> Result<(), std::io::Error> {
    let app = router(state, config);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
