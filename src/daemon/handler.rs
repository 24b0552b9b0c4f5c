//! Command handler implementation for the daemon.

use crate::config::Settings;
use crate::ipc::protocol::{Command, INVALID_SETTING, Response, STORE_ERROR, TRANSLATION_FAILED};
use crate::ipc::server::CommandHandler;
use crate::pipeline::PipelineHandle;
use crate::store::{Store, Values};
use std::sync::Arc;
use tokio::sync::Notify;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    pipeline: PipelineHandle,
    store: Arc<dyn Store>,
    shutdown: Arc<Notify>,
}

impl DaemonCommandHandler {
    pub fn new(pipeline: PipelineHandle, store: Arc<dyn Store>, shutdown: Arc<Notify>) -> Self {
        Self {
            pipeline,
            store,
            shutdown,
        }
    }

    async fn translate(&self, text: String, context: Vec<String>) -> Response {
        match self.pipeline.translate(text, context).await {
            Ok(translation) => Response::translated(translation),
            Err(e) => {
                tracing::debug!(code = e.code(), error = %e, "translate request failed");
                Response::from_error(&e)
            }
        }
    }

    async fn clear_cache(&self) -> Response {
        match self.pipeline.clear_cache().await {
            Ok(()) => Response::ok(),
            Err(e) => Response::failure(STORE_ERROR, e.to_string()),
        }
    }

    async fn status(&self) -> Response {
        match self.pipeline.status().await {
            Ok(status) => Response::status(status),
            Err(e) => Response::failure(TRANSLATION_FAILED, e.to_string()),
        }
    }

    /// Write one setting override. `null` removes the override.
    async fn set(&self, key: String, value: serde_json::Value) -> Response {
        if value.is_null() {
            if !Settings::KEYS.contains(&key.as_str()) {
                return Response::failure(INVALID_SETTING, format!("Unknown setting: {}", key));
            }
            return match self.store.remove(&key).await {
                Ok(()) => Response::ok(),
                Err(e) => Response::failure(STORE_ERROR, e.to_string()),
            };
        }

        if let Err(e) = Settings::default().apply(&key, &value) {
            return Response::failure(INVALID_SETTING, e.to_string());
        }

        let mut values = Values::new();
        values.insert(key, value);
        match self.store.set(values).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::failure(STORE_ERROR, e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Translate { text, context } => self.translate(text, context).await,
            Command::ClearCache => self.clear_cache().await,
            Command::Status => self.status().await,
            Command::Set { key, value } => self.set(key, value).await,
            Command::Shutdown => {
                self.shutdown.notify_one();
                Response::ok()
            }
        }
    }
}
