//! Translation memo keyed by request fingerprint.
//!
//! The in-memory map is authoritative. [`persist::CachePersistence`] writes
//! debounced snapshots of it to the store and restores them at startup.

pub mod persist;

pub use persist::CachePersistence;

use crate::config::Settings;
use crate::defaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Deterministic fingerprint of `(target language, model, endpoint, text)`.
///
/// Components are escaped before joining with `::`, so values containing the
/// separator cannot make two different requests share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(target_language: &str, model: &str, api_base_url: &str, text: &str) -> Self {
        let parts = [target_language, model, api_base_url, text].map(escape_component);
        Self(parts.join("::"))
    }

    /// Key for `text` under the request parameters in `settings`.
    pub fn for_settings(settings: &Settings, text: &str) -> Self {
        Self::new(
            &settings.target_language,
            &settings.model,
            &settings.api_base_url,
            text,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_component(part: &str) -> String {
    part.replace('\\', "\\\\").replace(':', "\\:")
}

/// A memoized translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub translation: String,
    /// Unix time in milliseconds.
    pub created_at: u64,
}

/// Current unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// In-memory translation cache with lazy TTL expiry.
#[derive(Debug)]
pub struct TranslationCache {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl_ms: u64,
    dirty: bool,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::with_ttl(defaults::CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms: ttl.as_millis() as u64,
            dirty: false,
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.created_at) > self.ttl_ms
    }

    /// Look up `key`, evicting it if expired.
    pub fn get(&mut self, key: &CacheKey) -> Option<String> {
        self.get_at(key, now_ms())
    }

    pub fn get_at(&mut self, key: &CacheKey, now: u64) -> Option<String> {
        let entry = self.entries.get(key)?;
        if self.is_expired(entry, now) {
            self.entries.remove(key);
            self.dirty = true;
            return None;
        }
        Some(entry.translation.clone())
    }

    /// Store a translation. Blank translations are ignored.
    pub fn put(&mut self, key: CacheKey, translation: &str) -> bool {
        self.put_at(key, translation, now_ms())
    }

    pub fn put_at(&mut self, key: CacheKey, translation: &str, now: u64) -> bool {
        let translation = translation.trim();
        if translation.is_empty() {
            return false;
        }
        self.entries.insert(
            key,
            CacheEntry {
                translation: translation.to_string(),
                created_at: now,
            },
        );
        self.dirty = true;
        true
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true once after any change that should be persisted.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Evict expired entries and return the rest as a JSON object.
    pub fn snapshot_at(&mut self, now: u64) -> serde_json::Map<String, serde_json::Value> {
        let ttl_ms = self.ttl_ms;
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.created_at) <= ttl_ms);

        let mut out = serde_json::Map::new();
        for (key, entry) in &self.entries {
            if let Ok(value) = serde_json::to_value(entry) {
                out.insert(key.as_str().to_string(), value);
            }
        }
        out
    }

    /// Load entries from a snapshot, skipping malformed and expired ones.
    ///
    /// Existing entries with the same key are replaced. Returns the number of
    /// entries loaded.
    pub fn restore_at(&mut self, snapshot: &serde_json::Value, now: u64) -> usize {
        let Some(object) = snapshot.as_object() else {
            return 0;
        };
        let mut loaded = 0;
        for (key, value) in object {
            let Ok(entry) = serde_json::from_value::<CacheEntry>(value.clone()) else {
                continue;
            };
            if entry.translation.is_empty() || self.is_expired(&entry, now) {
                continue;
            }
            self.entries.insert(CacheKey(key.clone()), entry);
            loaded += 1;
        }
        loaded
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}
