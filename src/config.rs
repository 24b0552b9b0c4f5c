use crate::defaults;
use crate::store::Values;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub daemon: DaemonConfig,
}

/// Translation and presentation settings.
///
/// The same field names are used as keys in the store, where they override
/// the values from the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub target_language: String,
    pub model: String,
    pub api_base_url: String,
    pub api_key: String,
    #[serde(deserialize_with = "deserialize_concurrency")]
    pub concurrency_limit: usize,
    pub show_original: bool,
    pub translate_transcript: bool,
    pub display_mode: String,
    pub caption_font_size: String,
    pub caption_color: String,
}

/// Daemon process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket path (default: $XDG_RUNTIME_DIR/captrans.sock)
    pub socket: Option<PathBuf>,
    /// Store file path (default: $XDG_DATA_HOME/captrans/store.json)
    pub store_path: Option<PathBuf>,
}

/// Presentation-only subset of [`Settings`] handed to sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOptions {
    pub show_original: bool,
    pub display_mode: String,
    pub caption_font_size: String,
    pub caption_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_language: defaults::TARGET_LANGUAGE.to_string(),
            model: defaults::MODEL.to_string(),
            api_base_url: defaults::API_BASE_URL.to_string(),
            api_key: String::new(),
            concurrency_limit: defaults::CONCURRENCY_LIMIT,
            show_original: true,
            translate_transcript: true,
            display_mode: "stacked".to_string(),
            caption_font_size: defaults::CAPTION_FONT_SIZE.to_string(),
            caption_color: defaults::CAPTION_COLOR.to_string(),
        }
    }
}

/// Clamp a user-supplied concurrency limit into the accepted range.
///
/// Numbers (or numeric strings) are rounded; values below the minimum and
/// anything non-numeric fall back to the default, values above the maximum
/// are clamped to it.
pub fn sanitize_concurrency(value: &serde_json::Value) -> usize {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => {
            let rounded = n.round();
            if rounded < defaults::MIN_CONCURRENCY as f64 {
                defaults::CONCURRENCY_LIMIT
            } else if rounded > defaults::MAX_CONCURRENCY as f64 {
                defaults::MAX_CONCURRENCY
            } else {
                rounded as usize
            }
        }
        _ => defaults::CONCURRENCY_LIMIT,
    }
}

/// Clamp an already-numeric limit the same way as [`sanitize_concurrency`].
pub fn clamp_concurrency(limit: usize) -> usize {
    sanitize_concurrency(&serde_json::Value::from(limit))
}

fn deserialize_concurrency<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(sanitize_concurrency(&value))
}

impl Settings {
    /// Keys this struct reads from the store.
    pub const KEYS: [&'static str; 10] = [
        "target_language",
        "model",
        "api_base_url",
        "api_key",
        "concurrency_limit",
        "show_original",
        "translate_transcript",
        "display_mode",
        "caption_font_size",
        "caption_color",
    ];

    /// Serialize into store values.
    pub fn to_values(&self) -> Values {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Values::new(),
        }
    }

    /// Apply one stored value. Unknown keys and values of the wrong type are
    /// rejected and leave the settings untouched.
    pub fn apply(&mut self, key: &str, value: &serde_json::Value) -> crate::error::Result<()> {
        if !Self::KEYS.contains(&key) {
            return Err(crate::error::CaptransError::ConfigInvalidValue {
                key: key.to_string(),
                message: "unknown setting".to_string(),
            });
        }
        let mut merged = self.to_values();
        merged.insert(key.to_string(), value.clone());
        let updated: Settings = serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(|e| crate::error::CaptransError::ConfigInvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        *self = updated;
        Ok(())
    }

    /// Overlay every valid value from `values`; invalid ones are skipped.
    pub fn merged_with(mut self, values: &Values) -> Self {
        for (key, value) in values {
            if let Err(e) = self.apply(key, value) {
                tracing::warn!(%key, error = %e, "ignoring stored setting");
            }
        }
        self
    }

    /// Whether requests can be sent at all.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            show_original: self.show_original,
            display_mode: self.display_mode.clone(),
            caption_font_size: self.caption_font_size.clone(),
            caption_color: self.caption_color.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, returning defaults if the file doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CAPTRANS_API_KEY → settings.api_key
    /// - CAPTRANS_MODEL → settings.model
    /// - CAPTRANS_TARGET_LANGUAGE → settings.target_language
    /// - CAPTRANS_API_BASE_URL → settings.api_base_url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("CAPTRANS_API_KEY")
            && !key.is_empty()
        {
            self.settings.api_key = key;
        }

        if let Ok(model) = std::env::var("CAPTRANS_MODEL")
            && !model.is_empty()
        {
            self.settings.model = model;
        }

        if let Ok(language) = std::env::var("CAPTRANS_TARGET_LANGUAGE")
            && !language.is_empty()
        {
            self.settings.target_language = language;
        }

        if let Ok(url) = std::env::var("CAPTRANS_API_BASE_URL")
            && !url.is_empty()
        {
            self.settings.api_base_url = url;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/captrans/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("captrans")
            .join("config.toml")
    }
}
