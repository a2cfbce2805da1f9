use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dom::NodeId;

/// Image linked to a report after the fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextScreenshot {
    pub report_id: String,
    /// `data:image/<fmt>;base64,...` URL or bare base64
    pub data: String,
}

/// Renders the page (or one element) to an image payload
#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    /// `Ok(None)` means nothing to attach
    async fn capture(&self, element: Option<NodeId>) -> anyhow::Result<Option<String>>;
}
