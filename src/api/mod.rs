//! Read API
//!
//! Two read-only endpoints over the last published daily-total artifact.
//! Handlers never touch the price store or a run in flight; they read
//! whatever the sink last renamed into place, so they can serve while a
//! pipeline run is writing.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::output;
use crate::valuation::DailyTotal;

/// Shared state: where the published artifacts live
#[derive(Debug, Clone)]
pub struct ApiState {
    pub totals_path: PathBuf,
}

/// Error surfaced to API callers with a descriptive JSON body
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn service_banner() -> &'static str {
    "patrimoine portfolio valuation API"
}

/// Full daily-total series, oldest first.
async fn get_market_values(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<Vec<DailyTotal>>> {
    Ok(Json(load_totals(&state)?))
}

/// Most recent daily total.
async fn get_last_market_value(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<DailyTotal>> {
    let mut totals = load_totals(&state)?;
    let last = totals
        .pop()
        .ok_or_else(|| ApiError::not_found("no market values published yet"))?;
    Ok(Json(last))
}

fn load_totals(state: &ApiState) -> Result<Vec<DailyTotal>, ApiError> {
    if !state.totals_path.exists() {
        return Err(ApiError::not_found(format!(
            "daily totals not found at {}; run the pipeline first",
            state.totals_path.display()
        )));
    }

    output::read_daily_totals(&state.totals_path).map_err(ApiError::internal)
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(service_banner))
        .route("/api/market-value", get(get_market_values))
        .route("/api/market-value/last", get(get_last_market_value))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
