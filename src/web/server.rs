use std::any::Any;
use std::sync::Arc;
use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::features::UserActivityRecord;
use crate::predict::{panic_message, BatchPrediction, Method, Prediction, Predictor};

/// HTTP surface of the trust rating service
pub struct WebServer {
    predictor: Arc<Predictor>,
    config: Arc<Config>,
}

#[derive(Clone)]
struct AppState {
    predictor: Arc<Predictor>,
}

#[derive(Deserialize)]
struct JournalQuery {
    method: Option<Method>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    fallback_available: bool,
}

#[derive(Serialize)]
struct PredictResponse {
    success: bool,
    #[serde(flatten)]
    prediction: Prediction,
    message: &'static str,
}

#[derive(Serialize)]
struct BatchResponse {
    success: bool,
    predictions: Vec<BatchPrediction>,
    count: usize,
}

impl WebServer {
    pub fn new(predictor: Arc<Predictor>, config: Arc<Config>) -> Self {
        Self { predictor, config }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            predictor: self.predictor.clone(),
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/predict", post(predict))
            .route("/batch-predict", post(batch_predict))
            .route("/api/stats", get(api_stats))
            .route("/api/journal", get(api_journal))
            .with_state(state)
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TraceLayer::new_for_http());

        if self.config.cors.enabled {
            app.layer(CorsLayer::permissive())
        } else {
            app
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("🚀 Trust rating API listening on http://{}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Panics inside a handler become the usual 500 envelope
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal(panic_message(&*err)).into_response()
}

/// Parse a request body into a non-empty JSON object
fn parse_object(body: &[u8], empty_message: &str) -> ApiResult<serde_json::Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest(empty_message.to_string()));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;
    match value {
        Value::Object(map) if map.is_empty() => Err(ApiError::BadRequest(empty_message.to_string())),
        Value::Object(map) => Ok(map),
        Value::Null => Err(ApiError::BadRequest(empty_message.to_string())),
        _ => Err(ApiError::BadRequest("Request body must be a JSON object".to_string())),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.predictor.model_loaded(),
        fallback_available: true,
    })
}

async fn predict(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<PredictResponse>> {
    let object = parse_object(&body, "No data provided")?;
    let record = UserActivityRecord::from_value(Value::Object(object));
    let prediction = state.predictor.predict(&record);

    Ok(Json(PredictResponse {
        success: true,
        prediction,
        message: "Trust rating calculated successfully",
    }))
}

async fn batch_predict(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<BatchResponse>> {
    const NO_USERS: &str = "No users provided";

    let mut object = parse_object(&body, NO_USERS)?;
    let users = match object.remove("users") {
        Some(Value::Array(users)) if !users.is_empty() => users,
        _ => return Err(ApiError::BadRequest(NO_USERS.to_string())),
    };

    let records: Vec<UserActivityRecord> = users.into_iter().map(UserActivityRecord::from_value).collect();
    let predictions = state.predictor.predict_batch(&records);
    info!("Batch scored {} users", predictions.len());

    Ok(Json(BatchResponse {
        success: true,
        count: predictions.len(),
        predictions,
    }))
}

/// Stats API
async fn api_stats(State(state): State<AppState>) -> Json<Value> {
    Json(state.predictor.get_stats())
}

/// Journal API with method filter
async fn api_journal(
    State(state): State<AppState>,
    Query(params): Query<JournalQuery>,
) -> Json<Value> {
    let limit = params.limit.unwrap_or(100);
    let journal = state.predictor.journal();
    Json(serde_json::json!({
        "entries": journal.search(params.method, limit),
        "stats": journal.get_stats(),
    }))
}
