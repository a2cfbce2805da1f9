use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

fn default_endpoint() -> String {
    "http://127.0.0.1:4590".to_string()
}

fn default_health_timeout_ms() -> u64 {
    1000
}

fn default_report_timeout_ms() -> u64 {
    5000
}

fn default_screenshot_timeout_ms() -> u64 {
    10000
}

fn default_availability_ttl_ms() -> u64 {
    5000
}

fn default_history_capacity() -> usize {
    crate::history::DEFAULT_HISTORY_CAPACITY
}

fn default_console_max_age_ms() -> u64 {
    60000
}

fn default_true() -> bool {
    true
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Base URL of the local delivery endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_report_timeout_ms")]
    pub report_timeout_ms: u64,
    #[serde(default = "default_screenshot_timeout_ms")]
    pub screenshot_timeout_ms: u64,
    /// How long an availability probe result is reused
    #[serde(default = "default_availability_ttl_ms")]
    pub availability_ttl_ms: u64,
    /// Skip the endpoint and always deliver to the log
    #[serde(default)]
    pub force_local: bool,
    /// Keys whose values are replaced in captured state
    #[serde(default)]
    pub redact_keys: Vec<String>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub history_path: Option<PathBuf>,
    #[serde(default = "default_console_max_age_ms")]
    pub console_max_age_ms: u64,
    #[serde(default = "default_true")]
    pub include_console: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            health_timeout_ms: default_health_timeout_ms(),
            report_timeout_ms: default_report_timeout_ms(),
            screenshot_timeout_ms: default_screenshot_timeout_ms(),
            availability_ttl_ms: default_availability_ttl_ms(),
            force_local: false,
            redact_keys: Vec::new(),
            history_capacity: default_history_capacity(),
            history_path: None,
            console_max_age_ms: default_console_max_age_ms(),
            include_console: true,
        }
    }
}

impl SnapshotConfig {
    /// Defaults overridden by `CTXSNAP_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`SnapshotConfig::from_env`] with an injectable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("CTXSNAP_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }
        parse_into(&lookup, "CTXSNAP_HEALTH_TIMEOUT_MS", &mut config.health_timeout_ms);
        parse_into(&lookup, "CTXSNAP_REPORT_TIMEOUT_MS", &mut config.report_timeout_ms);
        parse_into(
            &lookup,
            "CTXSNAP_SCREENSHOT_TIMEOUT_MS",
            &mut config.screenshot_timeout_ms,
        );
        parse_into(
            &lookup,
            "CTXSNAP_AVAILABILITY_TTL_MS",
            &mut config.availability_ttl_ms,
        );
        if let Some(raw) = lookup("CTXSNAP_FORCE_LOCAL") {
            match parse_flag(&raw) {
                Some(flag) => config.force_local = flag,
                None => warn!(target: "ctxsnap::config", value = %raw, "ignoring invalid CTXSNAP_FORCE_LOCAL"),
            }
        }
        if let Some(raw) = lookup("CTXSNAP_REDACT_KEYS") {
            config.redact_keys = raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = lookup("CTXSNAP_HISTORY_PATH").filter(|v| !v.trim().is_empty()) {
            config.history_path = Some(PathBuf::from(path.trim()));
        }

        config
    }

    /// Endpoint without a trailing slash
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_millis(self.screenshot_timeout_ms)
    }

    pub fn availability_ttl(&self) -> Duration {
        Duration::from_millis(self.availability_ttl_ms)
    }

    pub fn console_max_age(&self) -> Duration {
        Duration::from_millis(self.console_max_age_ms)
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T) {
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(target: "ctxsnap::config", variable = name, value = %raw, "ignoring unparseable value"),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SnapshotConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:4590");
        assert_eq!(config.availability_ttl(), Duration::from_secs(5));
        assert_eq!(config.history_capacity, 20);
        assert!(config.include_console);
        assert!(!config.force_local);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: SnapshotConfig =
            serde_json::from_str(r#"{"endpoint": "http://localhost:9000/", "force_local": true}"#)
                .unwrap();
        assert_eq!(config.base_url(), "http://localhost:9000");
        assert!(config.force_local);
        assert_eq!(config.report_timeout_ms, 5000);
    }

    #[test]
    fn test_env_overrides() {
        let config = SnapshotConfig::from_lookup(lookup(&[
            ("CTXSNAP_ENDPOINT", "http://10.0.0.2:4590"),
            ("CTXSNAP_HEALTH_TIMEOUT_MS", "250"),
            ("CTXSNAP_REPORT_TIMEOUT_MS", "soon"),
            ("CTXSNAP_FORCE_LOCAL", "yes"),
            ("CTXSNAP_REDACT_KEYS", "token, password,,email"),
            ("CTXSNAP_HISTORY_PATH", "/tmp/ctx.json"),
        ]));
        assert_eq!(config.endpoint, "http://10.0.0.2:4590");
        assert_eq!(config.health_timeout_ms, 250);
        assert_eq!(config.report_timeout_ms, 5000);
        assert!(config.force_local);
        assert_eq!(config.redact_keys, vec!["token", "password", "email"]);
        assert_eq!(config.history_path, Some(PathBuf::from("/tmp/ctx.json")));
    }
}
