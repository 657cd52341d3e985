use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{DocumentSource, Location};
use crate::logging::log_fetch;

/// Fetch-once document cache keyed by location.
///
/// Failures are not cached, so a later request fetches again.
pub struct DocumentCache<S> {
    source: S,
    entries: Arc<Mutex<HashMap<String, Arc<Value>>>>,
}

impl<S: DocumentSource> DocumentCache<S> {
    pub fn new(source: S) -> Self {
        Self { source, entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub async fn get(&self, location: &Location) -> Result<Arc<Value>> {
        let key = location.key();
        if let Some(hit) = self.cached(&key) {
            log_fetch(&key, true, true);
            return Ok(hit);
        }

        let doc = match self.source.fetch(location).await {
            Ok(doc) => Arc::new(doc),
            Err(err) => {
                log_fetch(&key, false, false);
                return Err(err);
            }
        };
        log_fetch(&key, false, true);

        if let Ok(mut entries) = self.entries.lock() {
            // A concurrent fetch of the same key may have landed first; keep it.
            let stored = entries.entry(key).or_insert_with(|| doc.clone());
            return Ok(stored.clone());
        }
        Ok(doc)
    }

    pub fn cached(&self, key: &str) -> Option<Arc<Value>> {
        self.entries.lock().ok().and_then(|e| e.get(key).cloned())
    }

    pub fn invalidate(&self, location: &Location) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&location.key());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DocumentSource for CountingSource {
        async fn fetch(&self, _location: &Location) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow::anyhow!("unreachable"));
            }
            Ok(json!([{"year": 2000, "patents": 1}]))
        }
    }

    #[tokio::test]
    async fn test_second_get_hits_cache() {
        let cache = DocumentCache::new(CountingSource { calls: AtomicUsize::new(0), fail: false });
        let loc = Location::parse("https://example.org/a.json").unwrap();
        let a = cache.get(&loc).await.unwrap();
        let b = cache.get(&loc).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);

        cache.invalidate(&loc);
        cache.get(&loc).await.unwrap();
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let cache = DocumentCache::new(CountingSource { calls: AtomicUsize::new(0), fail: true });
        let loc = Location::parse("https://example.org/a.json").unwrap();
        assert!(cache.get(&loc).await.is_err());
        assert!(cache.get(&loc).await.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);
    }
}
