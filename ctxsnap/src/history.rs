//! Capped, most-recent-first store of assembled reports.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::errors::ContextError;
use crate::report::ContextReport;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

#[derive(Debug)]
pub struct LocalHistory {
    capacity: usize,
    path: Option<PathBuf>,
    entries: Mutex<VecDeque<ContextReport>>,
}

impl Default for LocalHistory {
    fn default() -> Self {
        Self::in_memory(DEFAULT_HISTORY_CAPACITY)
    }
}

impl LocalHistory {
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity,
            path: None,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// History backed by a JSON file. A missing or unreadable file starts an
    /// empty history.
    pub fn open(capacity: usize, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut entries = match load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                if path.exists() {
                    warn!(target: "ctxsnap::history", path = %path.display(), error = %e, "could not load report history");
                }
                VecDeque::new()
            }
        };
        entries.truncate(capacity);
        debug!(target: "ctxsnap::history", path = %path.display(), count = entries.len(), "history opened");
        Self {
            capacity,
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<ContextReport>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Prepend a report, dropping the oldest on overflow
    pub fn push(&self, report: ContextReport) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries();
        entries.push_front(report);
        entries.truncate(self.capacity);
        self.persist(&entries);
    }

    /// Most recent first
    pub fn list(&self) -> Vec<ContextReport> {
        self.entries().iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<ContextReport> {
        self.entries().iter().find(|r| r.id == id).cloned()
    }

    pub fn clear(&self) {
        let mut entries = self.entries();
        entries.clear();
        self.persist(&entries);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn persist(&self, entries: &VecDeque<ContextReport>) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = save(path, entries) {
            warn!(target: "ctxsnap::history", path = %path.display(), error = %e, "could not persist report history");
        }
    }
}

fn load(path: &Path) -> Result<VecDeque<ContextReport>, ContextError> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn save(path: &Path, entries: &VecDeque<ContextReport>) -> Result<(), ContextError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_vec_pretty(entries)?;
    std::fs::write(path, raw)?;
    Ok(())
}
