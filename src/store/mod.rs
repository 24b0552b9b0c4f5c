//! Key-value persistence used for settings overrides and the cache snapshot.
//!
//! Values are JSON. Every effective write is published on a broadcast
//! channel so the pipeline can react to setting changes while running.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use serde_json::Value;
use tokio::sync::broadcast;

/// A set of stored values keyed by name.
pub type Values = serde_json::Map<String, Value>;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// One key changed in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<Value>,
    /// `None` when the key was removed.
    pub new_value: Option<Value>,
}

/// Persistence collaborator.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Read `keys`, substituting the entry from `defaults` for missing keys.
    ///
    /// Keys missing from both are absent from the result.
    async fn get(&self, keys: &[&str], defaults: &Values) -> Result<Values>;

    /// Write every entry of `values`.
    async fn set(&self, values: Values) -> Result<()>;

    /// Delete `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Subscribe to changes made after this call.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

pub(crate) fn change_channel() -> broadcast::Sender<StoreChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}

pub(crate) fn lookup(values: &Values, keys: &[&str], defaults: &Values) -> Values {
    let mut out = Values::new();
    for key in keys {
        if let Some(value) = values.get(*key).or_else(|| defaults.get(*key)) {
            out.insert((*key).to_string(), value.clone());
        }
    }
    out
}

/// Merge `incoming` into `values`, returning the keys whose value changed.
pub(crate) fn apply_set(values: &mut Values, incoming: Values) -> Vec<StoreChange> {
    let mut changes = Vec::new();
    for (key, new_value) in incoming {
        if values.get(&key) == Some(&new_value) {
            continue;
        }
        let old_value = values.insert(key.clone(), new_value.clone());
        changes.push(StoreChange {
            key,
            old_value,
            new_value: Some(new_value),
        });
    }
    changes
}

pub(crate) fn apply_remove(values: &mut Values, key: &str) -> Option<StoreChange> {
    values.remove(key).map(|old_value| StoreChange {
        key: key.to_string(),
        old_value: Some(old_value),
        new_value: None,
    })
}

pub(crate) fn publish(sender: &broadcast::Sender<StoreChange>, changes: Vec<StoreChange>) {
    for change in changes {
        // No subscribers is fine.
        if sender.send(change).is_err() {
            break;
        }
    }
}
