//! HTTP API for the prediction pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/predict-breach-impact` | Run the full prediction pipeline |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "invalid_input", "message": "invalid risk_management_and_safeguards: ..." } }
//! ```
//!
//! Codes map the pipeline taxonomy: `invalid_input` (400),
//! `no_precedents_found` (422), `retrieval_error` (502), `timeout` (504).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted — the dashboard calling
//! this API is browser-based.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::PredictError;
use crate::models::{CaseInput, PipelineResult};
use crate::oracle::HttpOracle;
use crate::pipeline::Predictor;
use crate::store::HttpPrecedentStore;

/// Shared application state passed to route handlers.
#[derive(Clone)]
struct AppState {
    predictor: Arc<Predictor>,
}

/// Start the HTTP server with clients built from the configuration.
///
/// Binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = HttpPrecedentStore::new(&config.store, &config.retrieval)?;
    let oracle = HttpOracle::new(&config.oracle)?;
    let predictor = Arc::new(Predictor::new(Arc::new(store), Arc::new(oracle), config));

    let app = build_router(predictor);

    println!("finecast API listening on http://{}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router around an already-constructed predictor. Split out so
/// tests can drive the API in-process with mock collaborators.
pub fn build_router(predictor: Arc<Predictor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict-breach-impact", post(handle_predict))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { predictor })
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable taxonomy kind (e.g. `"no_precedents_found"`).
    code: String,
    /// Human-readable message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PredictError> for AppError {
    fn from(err: PredictError) -> Self {
        Self {
            status: StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check for load balancers and monitoring.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /predict-breach-impact ============

/// Request body. Classification fields arrive as raw strings and are
/// validated before any retrieval call is made.
#[derive(Deserialize)]
struct PredictRequest {
    case_description: String,
    lawfulness_of_processing: String,
    data_subject_rights_compliance: String,
    risk_management_and_safeguards: String,
    accountability_and_governance: String,
}

#[derive(Serialize)]
struct SimilarCaseBody {
    id: String,
    company: String,
    description: String,
    fine: u64,
    similarity: u8,
    explanation_of_similarity: String,
    date: NaiveDate,
    authority: String,
}

#[derive(Serialize)]
struct PredictionBody {
    predicted_fine: u64,
    explanation_for_fine: String,
}

#[derive(Serialize)]
struct PredictResponse {
    similar_cases: Vec<SimilarCaseBody>,
    prediction_result: PredictionBody,
}

impl From<PipelineResult> for PredictResponse {
    fn from(result: PipelineResult) -> Self {
        let similar_cases = result
            .similar_cases
            .into_iter()
            .map(|(case, assessment)| SimilarCaseBody {
                id: case.id,
                company: case.company,
                description: case.description,
                fine: case.fine,
                similarity: assessment.similarity,
                explanation_of_similarity: assessment.explanation,
                date: case.date,
                authority: case.authority,
            })
            .collect();

        Self {
            similar_cases,
            prediction_result: PredictionBody {
                predicted_fine: result.prediction.predicted_fine,
                explanation_for_fine: result.prediction.explanation,
            },
        }
    }
}

/// Handler for `POST /predict-breach-impact`.
async fn handle_predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, AppError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id);

    async move {
        let input = CaseInput::parse(
            &request.case_description,
            &request.lawfulness_of_processing,
            &request.data_subject_rights_compliance,
            &request.risk_management_and_safeguards,
            &request.accountability_and_governance,
        )
        .map_err(PredictError::from)?;

        let result = state.predictor.predict(input).await?;
        info!(
            similar_cases = result.similar_cases.len(),
            predicted_fine = result.prediction.predicted_fine,
            "request served"
        );
        Ok(Json(PredictResponse::from(result)))
    }
    .instrument(span)
    .await
}
