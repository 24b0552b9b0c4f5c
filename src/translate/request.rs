//! Request shaping for the chat-completions translation service.

use crate::defaults;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "You are a precise subtitle translator. Keep timing subtleties and concise language. Avoid adding commentary.";

/// Everything the adapter needs for one call.
///
/// Credentials and language are captured when the job is created, so a
/// settings change never alters a request that is already queued.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    pub text: String,
    /// Preceding lines, oldest first.
    pub context: Vec<String>,
    pub api_key: String,
    pub target_language: String,
    pub model: String,
    pub api_base_url: String,
}

impl TranslationRequest {
    /// Resolved chat-completions URL for this request.
    pub fn endpoint(&self) -> String {
        normalize_endpoint(&self.api_base_url)
    }

    /// Model name, falling back to the default when unset.
    pub fn model_name(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() {
            defaults::MODEL
        } else {
            model
        }
    }

    /// User prompt: instruction, optional context block, then the line.
    pub fn prompt(&self) -> String {
        let lines: Vec<&str> = self
            .context
            .iter()
            .map(|line| line.as_str())
            .filter(|line| !line.is_empty())
            .collect();
        let context_block = if lines.is_empty() {
            String::new()
        } else {
            format!("Context:\n{}\n\n", lines.join("\n"))
        };
        format!(
            "Translate the following subtitle line into {}. Provide translation only.\n\n{}Subtitle:\n{}",
            self.target_language, context_block, self.text
        )
    }

    /// JSON body for the chat-completions call.
    pub fn body(&self) -> ChatRequest<'_> {
        ChatRequest {
            model: self.model_name(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: self.prompt(),
                },
            ],
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatChoice {
    pub message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChatChoiceMessage {
    pub content: Option<String>,
}

impl ChatResponse {
    /// Trimmed content of the first choice, if it has any text.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Error payload returned by OpenAI-compatible services.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorPayload {
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorDetail {
    pub message: Option<String>,
}

/// Resolve a configured base URL into a full chat-completions endpoint.
///
/// Non-absolute or non-http(s) values fall back to the default service.
/// URLs already naming `/chat/completions` or `/responses` are kept,
/// `.../v2` gets `/chat/completions`, anything else `/v1/chat/completions`.
pub fn normalize_endpoint(base: &str) -> String {
    let trimmed = base.trim();
    let endpoint = if is_absolute_http(trimmed) {
        trimmed
    } else {
        defaults::API_BASE_URL
    };
    let endpoint = endpoint.trim_end_matches('/');

    if has_api_path(endpoint) {
        endpoint.to_string()
    } else if ends_with_version(endpoint) {
        format!("{endpoint}/chat/completions")
    } else {
        format!("{endpoint}/v1/chat/completions")
    }
}

fn is_absolute_http(candidate: &str) -> bool {
    match reqwest::Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

fn has_api_path(endpoint: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();
    ["/chat/completions", "/responses"].iter().any(|segment| {
        lower.match_indices(segment).any(|(start, _)| {
            let rest = &lower[start + segment.len()..];
            rest.is_empty() || rest.starts_with('/')
        })
    })
}

fn ends_with_version(endpoint: &str) -> bool {
    let Some((_, last)) = endpoint.rsplit_once('/') else {
        return false;
    };
    let mut chars = last.chars();
    matches!(chars.next(), Some('v' | 'V'))
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_digit())
}

/// Clean caller-supplied context: trim, drop blanks, keep the newest lines.
pub fn sanitize_context(lines: &[String], limit: usize) -> Vec<String> {
    let cleaned: Vec<String> = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    let skip = cleaned.len().saturating_sub(limit);
    cleaned.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str, context: &[&str]) -> TranslationRequest {
        TranslationRequest {
            text: text.to_string(),
            context: context.iter().map(|s| s.to_string()).collect(),
            api_key: "sk-test".to_string(),
            target_language: "zh-CN".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_base_url: defaults::API_BASE_URL.to_string(),
        }
    }

    #[test]
    fn test_endpoint_appends_versioned_path() {
        assert_eq!(
            normalize_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            normalize_endpoint("https://proxy.example.com/"),
            "https://proxy.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_endpoint_with_version_suffix() {
        assert_eq!(
            normalize_endpoint("https://api.example.com/v2"),
            "https://api.example.com/v2/chat/completions"
        );
        assert_eq!(
            normalize_endpoint("https://api.example.com/openai/V1/"),
            "https://api.example.com/openai/V1/chat/completions"
        );
    }

    #[test]
    fn test_endpoint_full_path_is_kept() {
        assert_eq!(
            normalize_endpoint("https://api.example.com/v1/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            normalize_endpoint("http://localhost:8080/v1/responses/"),
            "http://localhost:8080/v1/responses"
        );
    }

    #[test]
    fn test_endpoint_rejects_non_absolute() {
        let fallback = "https://api.openai.com/v1/chat/completions";
        assert_eq!(normalize_endpoint(""), fallback);
        assert_eq!(normalize_endpoint("api.example.com"), fallback);
        assert_eq!(normalize_endpoint("ftp://files.example.com"), fallback);
        assert_eq!(normalize_endpoint("  not a url  "), fallback);
    }

    #[test]
    fn test_responses_prefix_is_not_a_full_path() {
        assert_eq!(
            normalize_endpoint("https://example.com/responses-proxy"),
            "https://example.com/responses-proxy/v1/chat/completions"
        );
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = request("Hello", &[]).prompt();
        assert_eq!(
            prompt,
            "Translate the following subtitle line into zh-CN. Provide translation only.\n\nSubtitle:\nHello"
        );
    }

    #[test]
    fn test_prompt_with_context_oldest_first() {
        let prompt = request("third", &["first", "second"]).prompt();
        assert!(prompt.contains("Context:\nfirst\nsecond\n\nSubtitle:\nthird"));
    }

    #[test]
    fn test_body_shape() {
        let req = request("Hello", &[]);
        let body = serde_json::to_value(req.body()).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 200);
    }

    #[test]
    fn test_blank_model_uses_default() {
        let mut req = request("Hello", &[]);
        req.model = "  ".to_string();
        assert_eq!(req.model_name(), defaults::MODEL);
    }

    #[test]
    fn test_response_first_text() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  你好  "}}]}"#,
        )
        .unwrap();
        assert_eq!(response.first_text(), Some("你好"));

        let empty: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"   "}}]}"#).unwrap();
        assert_eq!(empty.first_text(), None);

        let missing: ChatResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(missing.first_text(), None);
    }

    #[test]
    fn test_sanitize_context() {
        let lines: Vec<String> = ["  a ", "", "b", "   ", "c", "d", "e", "f"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(sanitize_context(&lines, 5), vec!["b", "c", "d", "e", "f"]);
        assert_eq!(sanitize_context(&lines[..2], 5), vec!["a"]);
    }
}
