use crate::error::Result;
use crate::store::{
    Store, StoreChange, Values, apply_remove, apply_set, change_channel, lookup, publish,
};
use tokio::sync::{Mutex, broadcast};

/// Process-local store. Used by tests and the foreground watch mode.
#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<Values>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_values(Values::new())
    }

    /// Create a store pre-populated with `values`.
    pub fn with_values(values: Values) -> Self {
        Self {
            values: Mutex::new(values),
            changes: change_channel(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, keys: &[&str], defaults: &Values) -> Result<Values> {
        Ok(lookup(&*self.values.lock().await, keys, defaults))
    }

    async fn set(&self, values: Values) -> Result<()> {
        let changes = apply_set(&mut *self.values.lock().await, values);
        publish(&self.changes, changes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let change = apply_remove(&mut *self.values.lock().await, key);
        publish(&self.changes, change.into_iter().collect());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
