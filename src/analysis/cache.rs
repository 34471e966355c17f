use dashmap::DashMap;
use serde_json::Value;

/// Content-addressed store for analysis outputs.
pub trait AnalysisCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: String, value: Value);
}

/// In-process cache shared by every run of a pager.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Value>,
}

impl MemoryCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AnalysisCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: String, value: Value) {
        self.entries.insert(key, value);
    }
}
