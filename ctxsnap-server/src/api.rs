use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

use crate::storage::StoreError;
use crate::types::{
    HealthResponse, ReportListing, ReportSavedResponse, ScreenshotRequest,
    ScreenshotSavedResponse,
};
use crate::AppState;

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "error": self.message
            })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::InvalidId(_) | StoreError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            StoreError::Io(_) | StoreError::Serialization(_) => {
                error!("❌ Storage failure: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Reports
// ============================================================================

pub async fn save_report(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<ReportSavedResponse>, ApiError> {
    let Json(report) = body?;
    if !report.is_object() {
        return Err(ApiError::bad_request("report must be a JSON object"));
    }
    let id = report
        .get("id")
        .and_then(|id| id.as_str())
        .ok_or_else(|| ApiError::bad_request("report is missing a string 'id'"))?
        .to_string();

    info!("📥 POST /report - id: {}", id);
    let filename = state.store.save_report(&id, &report).await?;
    info!("✅ Report saved: {}", filename);

    Ok(Json(ReportSavedResponse { id, filename }))
}

pub async fn list_reports(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReportListing>>, ApiError> {
    Ok(Json(state.store.list_reports().await?))
}

// ============================================================================
// Screenshots
// ============================================================================

pub async fn save_screenshot(
    State(state): State<AppState>,
    body: Result<Json<ScreenshotRequest>, JsonRejection>,
) -> Result<Json<ScreenshotSavedResponse>, ApiError> {
    let Json(request) = body?;
    info!("📥 POST /screenshot - report: {}", request.report_id);

    let filename = state
        .store
        .save_screenshot(&request.report_id, &request.data)
        .await?;
    info!("✅ Screenshot saved: {}", filename);

    Ok(Json(ScreenshotSavedResponse { filename }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("no such endpoint")
}
