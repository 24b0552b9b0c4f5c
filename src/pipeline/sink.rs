use crate::config::DisplayOptions;
use crate::pipeline::source::SourceId;
use std::sync::{Arc, Mutex};

/// Pluggable presentation target for translated lines.
///
/// The pipeline calls `render` with `None` as soon as a new line is
/// accepted, then again with the translation once it is known.
pub trait PresentationSink: Send + 'static {
    /// Show `original` for `source`, with its translation when available.
    fn render(
        &mut self,
        source: &SourceId,
        original: &str,
        translation: Option<&str>,
    ) -> crate::error::Result<()>;

    /// Remove everything shown for `source`.
    fn clear(&mut self, source: &SourceId) -> crate::error::Result<()>;

    /// Presentation settings changed.
    fn configure(&mut self, _options: &DisplayOptions) -> crate::error::Result<()> {
        Ok(())
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

impl PresentationSink for Box<dyn PresentationSink> {
    fn render(
        &mut self,
        source: &SourceId,
        original: &str,
        translation: Option<&str>,
    ) -> crate::error::Result<()> {
        (**self).render(source, original, translation)
    }

    fn clear(&mut self, source: &SourceId) -> crate::error::Result<()> {
        (**self).clear(source)
    }

    fn configure(&mut self, options: &DisplayOptions) -> crate::error::Result<()> {
        (**self).configure(options)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// One call received by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Render {
        source: SourceId,
        original: String,
        translation: Option<String>,
    },
    Clear {
        source: SourceId,
    },
    Configure(DisplayOptions),
}

/// Sink that records every call. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every translation rendered for `source`, in order.
    pub fn translations_for(&self, source: &SourceId) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Render {
                    source: s,
                    translation: Some(t),
                    ..
                } if &s == source => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Translation currently shown for `source`, following clears.
    pub fn current(&self, source: &SourceId) -> Option<String> {
        let mut current = None;
        for event in self.events() {
            match event {
                SinkEvent::Render {
                    source: s,
                    translation,
                    ..
                } if &s == source => current = translation,
                SinkEvent::Clear { source: s } if &s == source => current = None,
                _ => {}
            }
        }
        current
    }
}

impl PresentationSink for RecordingSink {
    fn render(
        &mut self,
        source: &SourceId,
        original: &str,
        translation: Option<&str>,
    ) -> crate::error::Result<()> {
        self.push(SinkEvent::Render {
            source: source.clone(),
            original: original.to_string(),
            translation: translation.map(str::to_string),
        });
        Ok(())
    }

    fn clear(&mut self, source: &SourceId) -> crate::error::Result<()> {
        self.push(SinkEvent::Clear {
            source: source.clone(),
        });
        Ok(())
    }

    fn configure(&mut self, options: &DisplayOptions) -> crate::error::Result<()> {
        self.push(SinkEvent::Configure(options.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Sink that discards everything. Used when only the request API matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn render(&mut self, _: &SourceId, _: &str, _: Option<&str>) -> crate::error::Result<()> {
        Ok(())
    }

    fn clear(&mut self, _: &SourceId) -> crate::error::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Prints translated lines to stdout.
#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct StdoutSink {
    options: DisplayOptions,
    color: bool,
}

#[cfg(feature = "cli")]
impl StdoutSink {
    pub fn new(options: DisplayOptions) -> Self {
        use std::io::IsTerminal;
        Self {
            options,
            color: std::io::stdout().is_terminal(),
        }
    }

    fn paint(&self, text: &str) -> String {
        use owo_colors::OwoColorize;
        if !self.color {
            return text.to_string();
        }
        match parse_hex_color(&self.options.caption_color) {
            Some((r, g, b)) => text.truecolor(r, g, b).to_string(),
            None => text.cyan().to_string(),
        }
    }
}

#[cfg(feature = "cli")]
impl PresentationSink for StdoutSink {
    fn render(
        &mut self,
        _source: &SourceId,
        original: &str,
        translation: Option<&str>,
    ) -> crate::error::Result<()> {
        use owo_colors::OwoColorize;
        // Nothing to print until the translation arrives.
        let Some(translation) = translation else {
            return Ok(());
        };
        if self.options.show_original {
            if self.color {
                println!("{}", original.dimmed());
            } else {
                println!("{}", original);
            }
        }
        println!("{}", self.paint(translation));
        Ok(())
    }

    fn clear(&mut self, _source: &SourceId) -> crate::error::Result<()> {
        Ok(())
    }

    fn configure(&mut self, options: &DisplayOptions) -> crate::error::Result<()> {
        self.options = options.clone();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Parse `#rrggbb` or `#rgb`.
pub fn parse_hex_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some((channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some((expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}
