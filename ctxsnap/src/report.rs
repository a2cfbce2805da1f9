use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::console::ConsoleEntry;
use crate::identity::ElementSnapshot;
use crate::ownership::ComponentPathItem;
use crate::page::{Page, Viewport};
use crate::state::CapturedAppState;
use crate::value::{truncate_chars, RuntimeValue};

pub const MAX_DESCRIPTION_LENGTH: usize = 2000;
pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_USER_AGENT_LENGTH: usize = 512;
pub const MAX_VERSION_LENGTH: usize = 32;

/// Global exposing the framework module
pub const FRAMEWORK_GLOBAL: &str = "React";

/// Global installed by the framework's developer tools
pub const DEVTOOLS_HOOK_GLOBAL: &str = "__REACT_DEVTOOLS_GLOBAL_HOOK__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_version: Option<String>,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

/// The unit of delivery and persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReport {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub element: ElementSnapshot,
    pub component_path: Vec<ComponentPathItem>,
    pub app_state: CapturedAppState,
    pub environment: EnvironmentInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_entries: Option<Vec<ConsoleEntry>>,
}

/// `ctx_<epoch-ms>_<8 hex chars>`
pub fn generate_report_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("ctx_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Best-effort framework version: the framework global first, then any
/// renderer registered with the developer-tools hook
pub fn detect_framework_version(page: &Page) -> Option<String> {
    let direct = page
        .global(FRAMEWORK_GLOBAL)
        .and_then(|module| module.get("version").as_str())
        .filter(|v| !v.is_empty());
    if let Some(version) = direct {
        return Some(truncate_chars(version, MAX_VERSION_LENGTH));
    }

    let renderers = page.global(DEVTOOLS_HOOK_GLOBAL)?.get("renderers");
    let candidates: Box<dyn Iterator<Item = &RuntimeValue>> = match renderers {
        RuntimeValue::Object(map) => Box::new(map.values()),
        RuntimeValue::Array(items) => Box::new(items.iter()),
        _ => return None,
    };
    candidates
        .filter_map(|renderer| renderer.get("version").as_str())
        .find(|v| !v.is_empty())
        .map(|v| truncate_chars(v, MAX_VERSION_LENGTH))
}

/// Combine the captured pieces with the page facts into one report
pub fn assemble_report(
    page: &Page,
    id: String,
    element: ElementSnapshot,
    component_path: Vec<ComponentPathItem>,
    app_state: CapturedAppState,
    description: Option<String>,
    console_entries: Option<Vec<ConsoleEntry>>,
) -> ContextReport {
    let now = Utc::now();
    let url = truncate_chars(&page.url, MAX_URL_LENGTH);
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(|d| truncate_chars(&d, MAX_DESCRIPTION_LENGTH));

    ContextReport {
        id,
        timestamp: now,
        url: url.clone(),
        viewport: page.viewport,
        description,
        element,
        component_path,
        app_state,
        environment: EnvironmentInfo {
            framework_version: detect_framework_version(page),
            user_agent: truncate_chars(&page.user_agent, MAX_USER_AGENT_LENGTH),
            timestamp: now,
            url,
        },
        console_entries,
    }
}

/// Multi-line summary for people reading the log
pub fn format_report_summary(report: &ContextReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Context report {}", report.id);
    let _ = writeln!(out, "  url:       {}", report.url);
    let _ = writeln!(out, "  element:   <{}> {}", report.element.tag_name, report.element.selector);
    if !report.component_path.is_empty() {
        let path = report
            .component_path
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" > ");
        let _ = writeln!(out, "  path:      {path}");
    }
    if !report.app_state.is_empty() {
        let keys = report.app_state.keys().collect::<Vec<_>>().join(", ");
        let _ = writeln!(out, "  state:     {keys}");
    }
    if let Some(entries) = &report.console_entries {
        let _ = writeln!(out, "  console:   {} recent entries", entries.len());
    }
    if let Some(version) = &report.environment.framework_version {
        let _ = writeln!(out, "  framework: {version}");
    }
    if let Some(description) = &report.description {
        let _ = writeln!(out, "  note:      {description}");
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_id_format() {
        let id = generate_report_id();
        let parts: Vec<_> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ctx");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_report_id(), id);
    }

    #[test]
    fn test_framework_version_detection() {
        let mut page = Page::new("http://localhost/");
        assert_eq!(detect_framework_version(&page), None);

        page.set_global(
            DEVTOOLS_HOOK_GLOBAL,
            RuntimeValue::from(json!({"renderers": {"1": {"version": "18.2.0"}}})),
        );
        assert_eq!(detect_framework_version(&page).as_deref(), Some("18.2.0"));

        page.set_global(FRAMEWORK_GLOBAL, RuntimeValue::from(json!({"version": "19.0.0"})));
        assert_eq!(detect_framework_version(&page).as_deref(), Some("19.0.0"));
    }

    #[test]
    fn test_assemble_bounds_page_facts() {
        let page = Page::new(format!("http://localhost/{}", "a".repeat(5_000)))
            .with_viewport(1280, 720)
            .with_user_agent("ua");
        let report = assemble_report(
            &page,
            "ctx_1_deadbeef".to_string(),
            ElementSnapshot::default(),
            Vec::new(),
            CapturedAppState::default(),
            Some("   ".to_string()),
            None,
        );
        assert_eq!(report.url.chars().count(), MAX_URL_LENGTH);
        assert_eq!(report.viewport, Viewport { width: 1280, height: 720 });
        assert_eq!(report.description, None);
        assert_eq!(report.environment.url, report.url);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("componentPath").is_some());
        assert!(json.get("consoleEntries").is_none());
    }

    #[test]
    fn test_summary_mentions_path_and_state() {
        let page = Page::new("http://localhost/cart");
        let mut state = CapturedAppState::default();
        state.0.insert("redux".to_string(), json!({"cart": {"items": 2}}));
        let report = assemble_report(
            &page,
            generate_report_id(),
            ElementSnapshot {
                tag_name: "button".to_string(),
                selector: "#checkout".to_string(),
                ..Default::default()
            },
            vec![
                ComponentPathItem::named("App", crate::ownership::ComponentOrigin::Fiber),
                ComponentPathItem::named("Cart", crate::ownership::ComponentOrigin::Fiber),
            ],
            state,
            Some("Button does nothing".to_string()),
            Some(Vec::new()),
        );
        let summary = format_report_summary(&report);
        assert!(summary.contains("<button> #checkout"));
        assert!(summary.contains("App > Cart"));
        assert!(summary.contains("state:     redux"));
        assert!(summary.contains("0 recent entries"));
        assert!(summary.contains("Button does nothing"));
    }
}
