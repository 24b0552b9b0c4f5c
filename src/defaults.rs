//! Default configuration constants for captrans.
//!
//! Shared by the settings layer, the cache and the pipeline so that every
//! component agrees on limits and timings.

use std::time::Duration;

/// Default translation target language.
pub const TARGET_LANGUAGE: &str = "zh-CN";

/// Default chat model used for translation.
pub const MODEL: &str = "gpt-4o-mini";

/// Default translation service base URL.
///
/// Also the fallback when a configured URL is not an absolute http(s) URL.
pub const API_BASE_URL: &str = "https://api.openai.com";

/// Default number of concurrent translation requests.
pub const CONCURRENCY_LIMIT: usize = 3;

/// Lowest accepted concurrency limit.
pub const MIN_CONCURRENCY: usize = 1;

/// Highest accepted concurrency limit. Larger values are clamped to this.
pub const MAX_CONCURRENCY: usize = 8;

/// Default caption font size handed to the presentation sink.
pub const CAPTION_FONT_SIZE: &str = "2.4rem";

/// Default caption color handed to the presentation sink.
pub const CAPTION_COLOR: &str = "#b5e3ff";

/// Time-to-live for cached translations.
///
/// Entries older than this are never served and are dropped on the next
/// lookup or snapshot save.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Quiet period before the cache snapshot is written to the store.
///
/// Every write restarts the window, so a burst of translations results in
/// a single snapshot.
pub const CACHE_SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Store key holding the persisted cache snapshot.
pub const CACHE_STORAGE_KEY: &str = "captrans.cache";

/// Hard timeout for a single translation request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Number of preceding fragments sent along as context for a live source.
pub const CONTEXT_WINDOW: usize = 3;

/// Maximum number of context lines accepted by the translation request API.
pub const MAX_REQUEST_CONTEXT: usize = 5;

/// Number of fragments remembered per source class.
pub const HISTORY_LIMIT: usize = 80;

/// Delay a transcript job holds its slot after completing.
///
/// Keeps a freshly loaded transcript from flooding the scheduler.
pub const TRANSCRIPT_THROTTLE: Duration = Duration::from_millis(80);

/// Sampling temperature for chat completions.
pub const TEMPERATURE: f32 = 0.2;

/// Upper bound on generated tokens per translation.
pub const MAX_TOKENS: u32 = 200;
