//! Recent error and warning output, kept in a small ring buffer.
//!
//! The two channels are the `ERROR` and `WARN` levels of `tracing`. Install
//! [`ConsoleCapture::layer`] in the host's subscriber and call
//! [`ConsoleCapture::start_capture`]; hosts that have their own console can
//! feed it through [`ConsoleCapture::record`] instead.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{layer::Context, Layer};

use crate::value::{number_to_json, truncate_chars};

pub const DEFAULT_CONSOLE_CAPACITY: usize = 50;
pub const MAX_CONSOLE_MESSAGE_LENGTH: usize = 500;
pub const DEFAULT_CONSOLE_MAX_AGE: Duration = Duration::from_secs(60);

/// Target prefix of everything the engine itself logs
pub const INTERNAL_TARGET: &str = "ctxsnap";

/// Message prefix of the engine's own tagged delivery lines
pub const INTERNAL_TAG_PREFIX: &str = "[CTXSNAP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Error,
    Warn,
}

impl ConsoleLevel {
    fn from_tracing(level: &Level) -> Option<Self> {
        match *level {
            Level::ERROR => Some(ConsoleLevel::Error),
            Level::WARN => Some(ConsoleLevel::Warn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// One argument of a console call
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleArg {
    Error {
        name: String,
        message: String,
        stack: Option<String>,
    },
    Json(serde_json::Value),
    Text(String),
}

impl ConsoleArg {
    pub fn normalize(&self) -> String {
        match self {
            ConsoleArg::Error {
                name,
                message,
                stack,
            } => match stack {
                Some(stack) => format!("{name}: {message}\n{stack}"),
                None => format!("{name}: {message}"),
            },
            ConsoleArg::Json(value) => match value {
                serde_json::Value::String(s) => s.clone(),
                other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
            },
            ConsoleArg::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for ConsoleArg {
    fn from(text: &str) -> Self {
        ConsoleArg::Text(text.to_string())
    }
}

impl From<serde_json::Value> for ConsoleArg {
    fn from(value: serde_json::Value) -> Self {
        ConsoleArg::Json(value)
    }
}

/// Fixed-capacity FIFO of console entries
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    entries: VecDeque<ConsoleEntry>,
    capacity: usize,
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

impl ConsoleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: ConsoleEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries newer than `now_ms - max_age_ms`, oldest first
    pub fn recent(&self, max_age_ms: i64, now_ms: i64) -> Vec<ConsoleEntry> {
        let cutoff = now_ms.saturating_sub(max_age_ms);
        self.entries
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConsoleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

static GLOBAL_CAPTURE: Lazy<ConsoleCapture> =
    Lazy::new(|| ConsoleCapture::new(DEFAULT_CONSOLE_CAPACITY));

/// Lifecycle-managed capture service; clones share one buffer
#[derive(Debug, Clone)]
pub struct ConsoleCapture {
    buffer: Arc<Mutex<ConsoleBuffer>>,
    capturing: Arc<AtomicBool>,
}

impl Default for ConsoleCapture {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

impl ConsoleCapture {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(ConsoleBuffer::new(capacity))),
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Process-wide instance
    pub fn global() -> &'static ConsoleCapture {
        &GLOBAL_CAPTURE
    }

    fn buffer(&self) -> MutexGuard<'_, ConsoleBuffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start recording. Returns `false` when capture was already running.
    pub fn start_capture(&self) -> bool {
        !self.capturing.swap(true, Ordering::SeqCst)
    }

    /// Stop recording; the buffer is kept
    pub fn stop_capture(&self) {
        self.capturing.store(false, Ordering::SeqCst);
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// Record one console call made of `args`
    pub fn record(&self, level: ConsoleLevel, args: &[ConsoleArg]) {
        let message = args
            .iter()
            .map(ConsoleArg::normalize)
            .collect::<Vec<_>>()
            .join(" ");
        self.record_message(level, &message);
    }

    pub(crate) fn record_message(&self, level: ConsoleLevel, message: &str) {
        if !self.is_capturing() || message.starts_with(INTERNAL_TAG_PREFIX) {
            return;
        }
        let entry = ConsoleEntry {
            level,
            message: truncate_chars(message, MAX_CONSOLE_MESSAGE_LENGTH),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.buffer().push(entry);
    }

    /// Copies of the entries younger than `max_age`
    pub fn get_recent_entries(&self, max_age: Duration) -> Vec<ConsoleEntry> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        self.buffer()
            .recent(max_age_ms, Utc::now().timestamp_millis())
    }

    pub fn clear_buffer(&self) {
        self.buffer().clear();
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    /// Tracing layer feeding this capture
    pub fn layer(&self) -> ConsoleCaptureLayer {
        ConsoleCaptureLayer {
            capture: self.clone(),
        }
    }
}

/// Tracing layer that records `ERROR` and `WARN` events into a
/// [`ConsoleCapture`]
pub struct ConsoleCaptureLayer {
    capture: ConsoleCapture,
}

impl<S> Layer<S> for ConsoleCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.capture.is_capturing() {
            return;
        }
        let metadata = event.metadata();
        if metadata.target().starts_with(INTERNAL_TARGET) {
            return;
        }
        let Some(level) = ConsoleLevel::from_tracing(metadata.level()) else {
            return;
        };

        let mut text = EventText::default();
        event.record(&mut text);
        self.capture.record_message(level, &text.into_line());
    }
}

/// Event text and structured fields, flattened into one console line
#[derive(Default)]
struct EventText {
    message: String,
    fields: Map<String, Value>,
}

impl EventText {
    fn insert(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(text)) => self.message = text,
            ("message", other) => self.message = other.to_string(),
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    fn into_line(self) -> String {
        let mut line = self.message;
        if !self.fields.is_empty() {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&Value::Object(self.fields).to_string());
        }
        line
    }
}

impl Visit for EventText {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, number_to_json(value).unwrap_or(Value::Null));
    }
}
