//! Counter hook for pipeline instrumentation

use std::collections::HashMap;
use std::sync::Mutex;

/// Stats key counting every successfully handled file
pub const FILE_COUNT: &str = "file_count";

/// Stats key for files handled with the given status (`downloaded`, `failed`, ...)
pub fn file_status_key(status: &str) -> String {
    format!("file_status_count/{status}")
}

/// Receives counter increments from the pipeline
pub trait StatsCollector: Send + Sync {
    /// Add `count` to the counter `key`
    fn inc_value(&self, key: &str, count: u64);

    /// Current value of `key`, if it was ever incremented
    fn get_value(&self, key: &str) -> Option<u64>;
}

/// Discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStats;

impl StatsCollector for NoopStats {
    fn inc_value(&self, _key: &str, _count: u64) {}

    fn get_value(&self, _key: &str) -> Option<u64> {
        None
    }
}

/// In-memory counters
#[derive(Debug, Default)]
pub struct MemoryStatsCollector {
    values: Mutex<HashMap<String, u64>>,
}

impl MemoryStatsCollector {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all counters
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl StatsCollector for MemoryStatsCollector {
    fn inc_value(&self, key: &str, count: u64) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        *values.entry(key.to_string()).or_insert(0) += count;
    }

    fn get_value(&self, key: &str) -> Option<u64> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }
}
