use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSavedResponse {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRequest {
    pub report_id: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotSavedResponse {
    pub filename: String,
}

/// One stored report file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportListing {
    pub filename: String,
    /// RFC 3339
    pub created: String,
    pub size: u64,
}
