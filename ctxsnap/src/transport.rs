//! Two-tier delivery: the local endpoint when it answers, the log otherwise.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SnapshotConfig;
use crate::errors::ContextError;
use crate::report::{format_report_summary, ContextReport};
use crate::screenshot::ContextScreenshot;

/// Tag in front of locally delivered reports
pub const REPORT_LOG_TAG: &str = "[CTXSNAP_REPORT]";

/// Tag in front of locally delivered screenshots
pub const SCREENSHOT_LOG_TAG: &str = "[CTXSNAP_SCREENSHOT]";

pub const HEALTH_PATH: &str = "/health";
pub const REPORT_PATH: &str = "/report";
pub const SCREENSHOT_PATH: &str = "/screenshot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Remote,
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub method: DeliveryMethod,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl DeliveryResult {
    fn remote(filename: Option<String>) -> Self {
        Self {
            method: DeliveryMethod::Remote,
            success: true,
            filename,
        }
    }

    fn console() -> Self {
        Self {
            method: DeliveryMethod::Console,
            success: true,
            filename: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoredResponse {
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Availability {
    reachable: bool,
    checked_at: Instant,
}

pub struct DeliveryTransport {
    client: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
    report_timeout: Duration,
    screenshot_timeout: Duration,
    availability_ttl: Duration,
    force_local: bool,
    availability: Mutex<Option<Availability>>,
}

impl std::fmt::Debug for DeliveryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryTransport")
            .field("base_url", &self.base_url)
            .field("force_local", &self.force_local)
            .finish_non_exhaustive()
    }
}

impl DeliveryTransport {
    pub fn new(config: &SnapshotConfig) -> Result<Self, ContextError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ctxsnap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            health_timeout: config.health_timeout(),
            report_timeout: config.report_timeout(),
            screenshot_timeout: config.screenshot_timeout(),
            availability_ttl: config.availability_ttl(),
            force_local: config.force_local,
            availability: Mutex::new(None),
        })
    }

    fn cache(&self) -> MutexGuard<'_, Option<Availability>> {
        self.availability
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember(&self, reachable: bool) {
        *self.cache() = Some(Availability {
            reachable,
            checked_at: Instant::now(),
        });
    }

    /// Forget the cached probe result, e.g. right after starting the endpoint
    pub fn clear_availability_cache(&self) {
        *self.cache() = None;
    }

    /// Whether the endpoint answered its health check recently enough
    pub async fn is_available(&self) -> bool {
        if self.force_local {
            return false;
        }
        if let Some(cached) = *self.cache() {
            if cached.checked_at.elapsed() < self.availability_ttl {
                return cached.reachable;
            }
        }

        let reachable = self.probe().await;
        self.remember(reachable);
        reachable
    }

    async fn probe(&self) -> bool {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        match with_timeout(self.health_timeout, "health check", self.client.get(&url).send()).await {
            Ok(response) if response.status().is_success() => {
                debug!(target: "ctxsnap::transport", %url, "endpoint reachable");
                true
            }
            Ok(response) => {
                debug!(target: "ctxsnap::transport", %url, status = response.status().as_u16(), "endpoint unhealthy");
                false
            }
            Err(e) => {
                debug!(target: "ctxsnap::transport", %url, error = %e, "endpoint unreachable");
                false
            }
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<StoredResponse, ContextError> {
        let url = format!("{}{}", self.base_url, path);
        let response = with_timeout(timeout, path, self.client.post(&url).json(body).send()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ContextError::RemoteStatus {
                status: status.as_u16(),
            });
        }
        let text = with_timeout(timeout, path, response.text()).await?;
        Ok(serde_json::from_str(&text).unwrap_or(StoredResponse { filename: None }))
    }

    /// Deliver a report. Always succeeds: a failed remote attempt falls back
    /// to the log once, without retrying.
    pub async fn send_report(&self, report: &ContextReport) -> DeliveryResult {
        if self.is_available().await {
            match self.post_json(REPORT_PATH, report, self.report_timeout).await {
                Ok(stored) => {
                    info!(target: "ctxsnap::transport", id = %report.id, filename = ?stored.filename, "report delivered to endpoint");
                    return DeliveryResult::remote(stored.filename);
                }
                Err(e) => {
                    warn!(target: "ctxsnap::transport", id = %report.id, error = %e, "report delivery failed, logging locally");
                    self.remember(false);
                }
            }
        }
        log_report_locally(report);
        DeliveryResult::console()
    }

    /// Deliver a screenshot the same way as a report
    pub async fn send_screenshot(&self, screenshot: &ContextScreenshot) -> DeliveryResult {
        if self.is_available().await {
            match self
                .post_json(SCREENSHOT_PATH, screenshot, self.screenshot_timeout)
                .await
            {
                Ok(stored) => {
                    info!(target: "ctxsnap::transport", report_id = %screenshot.report_id, "screenshot delivered to endpoint");
                    return DeliveryResult::remote(stored.filename);
                }
                Err(e) => {
                    warn!(target: "ctxsnap::transport", report_id = %screenshot.report_id, error = %e, "screenshot delivery failed, logging locally");
                    self.remember(false);
                }
            }
        }
        log_screenshot_locally(screenshot);
        DeliveryResult::console()
    }
}

async fn with_timeout<T, E>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, ContextError>
where
    ContextError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ContextError::from),
        Err(_) => Err(ContextError::Timeout(format!(
            "{what} after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Tagged JSON line for tooling, then the human-readable summary
pub fn log_report_locally(report: &ContextReport) {
    match serde_json::to_string(report) {
        Ok(json) => info!(target: "ctxsnap::delivery", "{REPORT_LOG_TAG} {json}"),
        Err(e) => warn!(target: "ctxsnap::delivery", id = %report.id, error = %e, "report could not be serialized"),
    }
    info!(target: "ctxsnap::delivery", "{}", format_report_summary(report));
}

pub fn log_screenshot_locally(screenshot: &ContextScreenshot) {
    match serde_json::to_string(screenshot) {
        Ok(json) => info!(target: "ctxsnap::delivery", "{SCREENSHOT_LOG_TAG} {json}"),
        Err(e) => warn!(target: "ctxsnap::delivery", report_id = %screenshot.report_id, error = %e, "screenshot could not be serialized"),
    }
}
