use base64::Engine;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

use crate::types::ReportListing;

/// Always points at the most recently stored report
pub const LATEST_REPORT_FILE: &str = "latest.json";

pub const MAX_ID_LENGTH: usize = 128;

const IMAGE_FORMATS: &[&str] = &["png", "jpeg", "jpg", "webp", "gif"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Ids become file names, so only a conservative alphabet is accepted
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::InvalidId("id must not be empty".to_string()));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(StoreError::InvalidId(format!(
            "id longer than {MAX_ID_LENGTH} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StoreError::InvalidId(format!(
            "'{id}' may only contain ASCII letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

/// Split a `data:image/<fmt>;base64,<payload>` URL into extension and bytes.
/// Bare base64 is taken as PNG.
pub fn decode_image(data: &str) -> Result<(String, Vec<u8>), StoreError> {
    let data = data.trim();
    let (ext, payload) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(|| {
                StoreError::InvalidPayload("data URL has no payload".to_string())
            })?;
            let format = header
                .strip_suffix(";base64")
                .and_then(|mime| mime.strip_prefix("image/"))
                .ok_or_else(|| {
                    StoreError::InvalidPayload(format!("unsupported data URL header '{header}'"))
                })?
                .to_ascii_lowercase();
            if !IMAGE_FORMATS.contains(&format.as_str()) {
                return Err(StoreError::InvalidPayload(format!(
                    "unsupported image format '{format}'"
                )));
            }
            let ext = if format == "jpeg" { "jpg".to_string() } else { format };
            (ext, payload)
        }
        None => ("png".to_string(), data),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| StoreError::InvalidPayload(format!("invalid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(StoreError::InvalidPayload("image is empty".to_string()));
    }
    Ok((ext, bytes))
}

/// Report and screenshot files in one output directory
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `<epoch-ms>_<id>.json` and refresh `latest.json`
    pub async fn save_report(
        &self,
        id: &str,
        report: &serde_json::Value,
    ) -> Result<String, StoreError> {
        validate_id(id)?;
        let filename = format!("{}_{}.json", Utc::now().timestamp_millis(), id);
        let body = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(self.dir.join(&filename), &body).await?;
        tokio::fs::write(self.dir.join(LATEST_REPORT_FILE), &body).await?;
        debug!(%filename, bytes = body.len(), "report written");
        Ok(filename)
    }

    /// Write `<report_id>.<ext>`
    pub async fn save_screenshot(&self, report_id: &str, data: &str) -> Result<String, StoreError> {
        validate_id(report_id)?;
        let (ext, bytes) = decode_image(data)?;
        let filename = format!("{report_id}.{ext}");
        tokio::fs::write(self.dir.join(&filename), &bytes).await?;
        debug!(%filename, bytes = bytes.len(), "screenshot written");
        Ok(filename)
    }

    /// Stored reports, newest first
    pub async fn list_reports(&self) -> Result<Vec<ReportListing>, StoreError> {
        let mut found: Vec<(SystemTime, ReportListing)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".json") || filename == LATEST_REPORT_FILE {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((
                modified,
                ReportListing {
                    filename,
                    created: DateTime::<Utc>::from(modified).to_rfc3339(),
                    size: metadata.len(),
                },
            ));
        }
        found.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.filename.cmp(&a.1.filename))
        });
        Ok(found.into_iter().map(|(_, listing)| listing).collect())
    }
}
