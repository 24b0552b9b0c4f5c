//! Error types for captrans.

use crate::translate::TranslateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptransError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Persistence errors
    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Translation errors
    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("Pipeline is not running")]
    PipelineClosed,

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CaptransError>;
