//! JSON-line protocol between the CLI (or any other client) and the daemon.
//!
//! Requests are objects tagged by `type`. Every reply has the shape
//! `{"success": true, ...}` or `{"success": false, "error": CODE}`.

use crate::pipeline::PipelineStatus;
use crate::translate::TranslateError;
use serde::{Deserialize, Serialize};

/// Generic failure code when nothing more specific applies.
pub const TRANSLATION_FAILED: &str = "TRANSLATION_FAILED";
/// A `set` request named an unknown key or carried a value of the wrong type.
pub const INVALID_SETTING: &str = "INVALID_SETTING";
/// The persistence layer failed.
pub const STORE_ERROR: &str = "STORE_ERROR";
/// The request line was not a valid command.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Commands sent to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Translate one line with optional preceding context.
    Translate {
        text: String,
        #[serde(default)]
        context: Vec<String>,
    },
    /// Empty the translation cache and its persisted snapshot.
    ClearCache,
    /// Report queue, cache and settings state.
    Status,
    /// Write one setting into the store.
    Set {
        key: String,
        value: serde_json::Value,
    },
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Reply to a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    /// Stable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PipelineStatus>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            translated_text: None,
            error: None,
            message: None,
            status: None,
        }
    }

    pub fn translated(text: impl Into<String>) -> Self {
        Self {
            translated_text: Some(text.into()),
            ..Self::ok()
        }
    }

    pub fn status(status: PipelineStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::ok()
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(code.into()),
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Failure reply carrying the error's wire code.
    pub fn from_error(error: &TranslateError) -> Self {
        Self::failure(error.code(), error.to_string())
    }

    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_json_format_examples() {
        assert_eq!(Command::Status.to_json().unwrap(), r#"{"type":"status"}"#);
        assert_eq!(
            Command::ClearCache.to_json().unwrap(),
            r#"{"type":"clear_cache"}"#
        );
        assert_eq!(
            Command::Set {
                key: "concurrency_limit".to_string(),
                value: json!(4),
            }
            .to_json()
            .unwrap(),
            r#"{"type":"set","key":"concurrency_limit","value":4}"#
        );
    }

    #[test]
    fn test_translate_context_is_optional() {
        let command = Command::from_json(r#"{"type":"translate","text":"Hello"}"#).unwrap();
        assert_eq!(
            command,
            Command::Translate {
                text: "Hello".to_string(),
                context: vec![],
            }
        );

        let command =
            Command::from_json(r#"{"type":"translate","text":"B","context":["A"]}"#).unwrap();
        assert_eq!(
            command,
            Command::Translate {
                text: "B".to_string(),
                context: vec!["A".to_string()],
            }
        );
    }

    #[test]
    fn test_invalid_json_returns_error() {
        assert!(Command::from_json(r#"{"type": "unknown_command"}"#).is_err());
        assert!(Command::from_json(r#"{"invalid": "json"}"#).is_err());
        assert!(Command::from_json("not json at all").is_err());
        assert!(Command::from_json(r#"{"type":"translate"}"#).is_err());
    }

    #[test]
    fn test_success_reply_shape() {
        assert_eq!(Response::ok().to_json().unwrap(), r#"{"success":true}"#);
        assert_eq!(
            Response::translated("你好").to_json().unwrap(),
            r#"{"success":true,"translatedText":"你好"}"#
        );
    }

    #[test]
    fn test_failure_reply_uses_error_code() {
        let resp = Response::from_error(&TranslateError::MissingApiKey);
        let value: serde_json::Value = serde_json::from_str(&resp.to_json().unwrap()).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("MISSING_API_KEY"));
        assert_eq!(value["message"], json!("No API key configured"));
        assert!(value.get("translatedText").is_none());
    }

    #[test]
    fn test_status_reply_roundtrip() {
        let status = PipelineStatus {
            queued: 2,
            active: 3,
            pending: 5,
            transcript_queued: 0,
            transcript_active: 1,
            cache_entries: 10,
            sources: 2,
            awaiting: 1,
            concurrency_limit: 3,
            target_language: "zh-CN".to_string(),
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            has_api_key: true,
            translate_transcript: true,
        };
        let resp = Response::status(status);
        let parsed = Response::from_json(&resp.to_json().unwrap()).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn test_minimal_failure_from_other_clients_parses() {
        let resp = Response::from_json(r#"{"success":false,"error":"TRANSLATION_FAILED"}"#)
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some(TRANSLATION_FAILED));
        assert_eq!(resp.message, None);
    }
}
