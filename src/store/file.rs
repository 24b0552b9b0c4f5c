use crate::error::{CaptransError, Result};
use crate::store::{
    Store, StoreChange, Values, apply_remove, apply_set, change_channel, lookup, publish,
};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, broadcast};

/// Store persisted as a single JSON object file.
///
/// The whole object is rewritten on every effective change via a temporary
/// file and a rename, so a crash never leaves a half-written file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Values>,
    changes: broadcast::Sender<StoreChange>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Values::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| CaptransError::Store {
                message: format!("Failed to parse {}: {}", path.display(), e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Values::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
            changes: change_channel(),
        })
    }

    /// Default store location: `$XDG_DATA_HOME/captrans/store.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("captrans")
            .join("store.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, values: &Values) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for JsonFileStore {
    async fn get(&self, keys: &[&str], defaults: &Values) -> Result<Values> {
        Ok(lookup(&*self.values.lock().await, keys, defaults))
    }

    async fn set(&self, incoming: Values) -> Result<()> {
        let mut values = self.values.lock().await;
        // Memory only takes the change once it is on disk.
        let mut updated = values.clone();
        let changes = apply_set(&mut updated, incoming);
        if changes.is_empty() {
            return Ok(());
        }
        self.write(&updated).await?;
        *values = updated;
        drop(values);
        publish(&self.changes, changes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        let mut updated = values.clone();
        let Some(change) = apply_remove(&mut updated, key) else {
            return Ok(());
        };
        self.write(&updated).await?;
        *values = updated;
        drop(values);
        publish(&self.changes, vec![change]);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
