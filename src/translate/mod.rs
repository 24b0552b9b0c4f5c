//! Translation service adapter: request shaping, the HTTP call and its
//! failure taxonomy.

pub mod adapter;
pub mod error;
pub mod request;

pub use adapter::{MockTranslator, OpenAiTranslator, Translator};
pub use error::TranslateError;
pub use request::{TranslationRequest, normalize_endpoint, sanitize_context};
