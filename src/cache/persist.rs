//! Debounced cache snapshots in the store.

use crate::cache::{TranslationCache, now_ms};
use crate::defaults;
use crate::error::Result;
use crate::store::{Store, Values};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Writes [`TranslationCache`] snapshots to a [`Store`].
///
/// Owned by the same task as the cache. Every scheduled save restarts the
/// debounce window; the owner awaits [`CachePersistence::due`] and then calls
/// [`CachePersistence::flush`].
pub struct CachePersistence {
    store: Arc<dyn Store>,
    key: String,
    debounce: Duration,
    deadline: Option<Instant>,
}

impl CachePersistence {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            key: defaults::CACHE_STORAGE_KEY.to_string(),
            debounce: defaults::CACHE_SAVE_DEBOUNCE,
            deadline: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Restore the persisted snapshot into `cache`.
    ///
    /// A failing store is logged and leaves the cache empty.
    pub async fn load(&self, cache: &mut TranslationCache) -> usize {
        match self.store.get(&[self.key.as_str()], &Values::new()).await {
            Ok(values) => match values.get(&self.key) {
                Some(snapshot) => {
                    let loaded = cache.restore_at(snapshot, now_ms());
                    tracing::debug!(entries = loaded, "cache_snapshot_loaded");
                    loaded
                }
                None => 0,
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to load cache snapshot");
                0
            }
        }
    }

    /// Schedule a save, restarting the debounce window.
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.debounce);
    }

    /// Schedule a save if the cache changed since the last check.
    pub fn track(&mut self, cache: &mut TranslationCache) {
        if cache.take_dirty() {
            self.schedule();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when a scheduled save is due; pending forever otherwise.
    pub async fn due(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Write the snapshot now. An empty snapshot removes the stored key.
    pub async fn flush(&mut self, cache: &mut TranslationCache) -> Result<()> {
        self.deadline = None;
        let snapshot = cache.snapshot_at(now_ms());
        // Expiry during the snapshot is already reflected in what we write.
        cache.take_dirty();
        if snapshot.is_empty() {
            self.store.remove(&self.key).await
        } else {
            let mut values = Values::new();
            values.insert(self.key.clone(), serde_json::Value::Object(snapshot));
            self.store.set(values).await
        }
    }

    /// Empty `cache`, cancel any pending save and remove the snapshot.
    pub async fn clear(&mut self, cache: &mut TranslationCache) -> Result<()> {
        cache.clear();
        self.deadline = None;
        self.store.remove(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::store::MemoryStore;

    fn key(text: &str) -> CacheKey {
        CacheKey::new("zh-CN", "m", "u", text)
    }

    async fn stored_snapshot(store: &MemoryStore) -> Option<serde_json::Value> {
        store
            .get(&[defaults::CACHE_STORAGE_KEY], &Values::new())
            .await
            .unwrap()
            .get(defaults::CACHE_STORAGE_KEY)
            .cloned()
    }

    #[tokio::test]
    async fn test_flush_and_load_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let mut persistence = CachePersistence::new(store.clone());

        let mut cache = TranslationCache::new();
        cache.put(key("Hello"), "你好");
        persistence.flush(&mut cache).await.unwrap();
        assert!(stored_snapshot(&store).await.is_some());

        let mut restored = TranslationCache::new();
        assert_eq!(persistence.load(&mut restored).await, 1);
        assert_eq!(restored.get(&key("Hello")), Some("你好".to_string()));
    }

    #[tokio::test]
    async fn test_empty_flush_removes_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let mut persistence = CachePersistence::new(store.clone());

        let mut cache = TranslationCache::new();
        cache.put(key("Hello"), "你好");
        persistence.flush(&mut cache).await.unwrap();

        cache.clear();
        persistence.flush(&mut cache).await.unwrap();
        assert!(stored_snapshot(&store).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_restarts_window() {
        let store = Arc::new(MemoryStore::new());
        let mut persistence = CachePersistence::new(store).with_debounce(Duration::from_secs(2));

        persistence.schedule();
        let first = Instant::now();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        persistence.schedule();

        persistence.due().await;
        assert!(Instant::now() - first >= Duration::from_millis(3500));
    }

    #[tokio::test]
    async fn test_track_only_schedules_when_dirty() {
        let store = Arc::new(MemoryStore::new());
        let mut persistence = CachePersistence::new(store);
        let mut cache = TranslationCache::new();

        persistence.track(&mut cache);
        assert!(!persistence.is_scheduled());

        cache.put(key("a"), "A");
        persistence.track(&mut cache);
        assert!(persistence.is_scheduled());
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_save_and_removes_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let mut persistence = CachePersistence::new(store.clone());
        let mut cache = TranslationCache::new();

        cache.put(key("a"), "A");
        persistence.flush(&mut cache).await.unwrap();
        cache.put(key("b"), "B");
        persistence.track(&mut cache);

        persistence.clear(&mut cache).await.unwrap();
        assert!(cache.is_empty());
        assert!(!persistence.is_scheduled());
        assert!(stored_snapshot(&store).await.is_none());
    }
}
