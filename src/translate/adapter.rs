use crate::defaults;
use crate::translate::error::TranslateError;
use crate::translate::request::{ChatResponse, ErrorPayload, TranslationRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for the external translation service.
///
/// Only the scheduler calls this. Implementations own their timeout.
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    /// Translate one fragment.
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError>;

    /// Name for logging/debugging.
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<T: Translator + ?Sized> Translator for Arc<T> {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
        (**self).translate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Translator backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiTranslator {
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiTranslator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: defaults::REQUEST_TIMEOUT,
        }
    }

    /// Override the hard request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
        let body = serde_json::to_vec(&request.body()).map_err(|e| TranslateError::Transport {
            message: format!("Failed to encode request: {e}"),
        })?;

        let response = self
            .client
            .post(request.endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(&request.api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| TranslateError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TranslateError::Transport {
                message: format!("Failed to read response: {e}"),
            })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorPayload>(&text)
                .ok()
                .and_then(|payload| payload.error)
                .and_then(|detail| detail.message)
                .filter(|message| !message.trim().is_empty())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "REQUEST_FAILED".to_string());
            return Err(match status.as_u16() {
                401 | 403 => TranslateError::Auth { message },
                code => TranslateError::Http {
                    status: code,
                    message,
                },
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| TranslateError::Transport {
                message: format!("Malformed response body: {e}"),
            })?;

        parsed
            .first_text()
            .map(str::to_string)
            .ok_or(TranslateError::EmptyResult)
    }
}

impl Default for OpenAiTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
        // Dropping the send future on expiry aborts the HTTP call.
        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TranslateError::Timeout),
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, Default)]
struct MockConfig {
    replies: HashMap<String, Result<String, TranslateError>>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
}

#[derive(Debug, Default)]
struct MockState {
    config: Mutex<MockConfig>,
    calls: Mutex<Vec<TranslationRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Mock translator for testing.
///
/// Unknown text translates to `"[<target language>] <text>"`. Clones share
/// call history and configuration.
#[derive(Debug, Clone, Default)]
pub struct MockTranslator {
    state: Arc<MockState>,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    fn configure(self, f: impl FnOnce(&mut MockConfig)) -> Self {
        {
            let mut config = self
                .state
                .config
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut *config);
        }
        self
    }

    /// Return `translation` for requests whose text is `text`.
    pub fn with_reply(self, text: &str, translation: &str) -> Self {
        let (text, translation) = (text.to_string(), translation.to_string());
        self.configure(|c| {
            c.replies.insert(text, Ok(translation));
        })
    }

    /// Fail requests whose text is `text`.
    pub fn with_failure(self, text: &str, error: TranslateError) -> Self {
        let text = text.to_string();
        self.configure(|c| {
            c.replies.insert(text, Err(error));
        })
    }

    /// Simulated latency for one text.
    pub fn with_delay(self, text: &str, delay: Duration) -> Self {
        let text = text.to_string();
        self.configure(|c| {
            c.delays.insert(text, delay);
        })
    }

    /// Simulated latency for every text without its own delay.
    pub fn with_default_delay(self, delay: Duration) -> Self {
        self.configure(|c| c.default_delay = delay)
    }

    /// Every request received so far, in call order.
    pub fn calls(&self) -> Vec<TranslationRequest> {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    /// Number of calls made for a specific text.
    pub fn calls_for(&self, text: &str) -> usize {
        self.calls().iter().filter(|r| r.text == text).count()
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslateError> {
        let (delay, outcome) = {
            let config = self
                .state
                .config
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let delay = config
                .delays
                .get(&request.text)
                .copied()
                .unwrap_or(config.default_delay);
            let outcome = config
                .replies
                .get(&request.text)
                .cloned()
                .unwrap_or_else(|| Ok(format!("[{}] {}", request.target_language, request.text)));
            (delay, outcome)
        };

        self.state
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.state.in_flight);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    fn name(&self) -> &str {
        "mock"
    }
}
