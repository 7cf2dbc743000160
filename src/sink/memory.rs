use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::Sink;
use crate::error::SinkWriteError;
use crate::record::Record;

// ─── Process-wide histories ──────────────────────────────────────

static CPU_USAGE_RESULTS: Lazy<Arc<MemorySink>> = Lazy::new(|| Arc::new(MemorySink::new()));
static RAM_USAGE_RESULTS: Lazy<Arc<MemorySink>> = Lazy::new(|| Arc::new(MemorySink::new()));

/// Default sink for CPU monitors. Lives for the whole process.
pub fn cpu_usage_results() -> Arc<MemorySink> {
    CPU_USAGE_RESULTS.clone()
}

/// Default sink for RAM monitors. Lives for the whole process.
pub fn ram_usage_results() -> Arc<MemorySink> {
    RAM_USAGE_RESULTS.clone()
}

// ─── MemorySink ──────────────────────────────────────────────────

/// Thread-safe in-process history: name → records in append order.
/// No eviction.
#[derive(Default)]
pub struct MemorySink {
    inner: Mutex<HashMap<String, Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records stored under `name`, oldest first.
    pub fn history(&self, name: &str) -> Vec<Record> {
        self.inner.lock().get(name).cloned().unwrap_or_default()
    }

    /// Copy of every history.
    pub fn snapshot(&self) -> HashMap<String, Vec<Record>> {
        self.inner.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wipe all histories.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Sink for MemorySink {
    fn append(&self, name: &str, record: &Record) -> Result<(), SinkWriteError> {
        self.inner
            .lock()
            .entry(name.to_owned())
            .or_default()
            .push(record.clone());
        Ok(())
    }
}
