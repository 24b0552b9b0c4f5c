//! captrans - Live caption and transcript translation
//!
//! Translates live text sources through a chat-completion service with
//! bounded concurrency, request coalescing and a persisted TTL cache.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
#[cfg(feature = "cli")]
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod ipc;
pub mod pipeline;
pub mod store;
pub mod translate;

// Composition root for the interactive `watch` command
#[cfg(feature = "cli")]
pub mod app;

// Collaborator traits (store → pipeline → sink)
pub use pipeline::error::ErrorReporter;
pub use pipeline::sink::PresentationSink;
pub use store::Store;
pub use translate::Translator;

// Pipeline
pub use pipeline::orchestrator::{Pipeline, PipelineHandle, PipelineStatus};
pub use pipeline::source::SourceId;

// Error handling
pub use error::{CaptransError, Result};
pub use translate::TranslateError;

// Config
pub use config::{Config, Settings};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
