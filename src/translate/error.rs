//! Failures a translation request can end in.

use thiserror::Error;

/// Error returned by the translation adapter and by pipeline requests.
///
/// `Clone` because one failure is delivered to every caller coalesced onto
/// the same in-flight job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// Nothing to translate after trimming.
    #[error("No text to translate")]
    EmptyText,

    /// No API key configured.
    #[error("No API key configured")]
    MissingApiKey,

    #[error("Translation request timed out")]
    Timeout,

    /// The service rejected the credentials.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Connection or body read failure.
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Valid response without usable translated text.
    #[error("Service returned an empty translation")]
    EmptyResult,

    /// The pipeline stopped before the request completed.
    #[error("Translation pipeline shut down")]
    Shutdown,
}

impl TranslateError {
    /// Stable wire code used by the IPC protocol.
    pub fn code(&self) -> &'static str {
        match self {
            TranslateError::EmptyText => "EMPTY_TEXT",
            TranslateError::MissingApiKey => "MISSING_API_KEY",
            TranslateError::Timeout => "TIMEOUT",
            TranslateError::Auth { .. } => "AUTH_ERROR",
            TranslateError::Transport { .. } => "TRANSPORT_ERROR",
            TranslateError::Http { .. } => "HTTP_ERROR",
            TranslateError::EmptyResult => "EMPTY_TRANSLATION",
            TranslateError::Shutdown => "SHUTDOWN",
        }
    }
}
