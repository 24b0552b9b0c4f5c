//! Per-source synchronization state.
//!
//! Every live text source (the caption line, the overlay, each transcript
//! line) has a [`SourceState`]. Accepting a new line takes a fresh epoch
//! from the pipeline's [`Epochs`] counter; a result is only applied when it
//! carries the epoch that is still current, so a slow answer for an older
//! line can never overwrite a newer one. Epochs are never reused, even when
//! a source is removed and later seen again.

use crate::pipeline::history::HistoryClass;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The active caption line of the player.
    Caption,
    /// Caption text rendered by our own overlay (track-based captions).
    Overlay,
    /// One line of the scrolling transcript.
    Transcript,
}

impl SourceKind {
    pub fn history_class(self) -> HistoryClass {
        match self {
            SourceKind::Caption | SourceKind::Overlay => HistoryClass::Caption,
            SourceKind::Transcript => HistoryClass::Transcript,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Caption => "caption",
            SourceKind::Overlay => "overlay",
            SourceKind::Transcript => "transcript",
        }
    }
}

/// Identity of one live source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    pub kind: SourceKind,
    pub name: String,
}

impl SourceId {
    pub fn new(kind: SourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// The main caption line.
    pub fn caption() -> Self {
        Self::new(SourceKind::Caption, "main")
    }

    pub fn overlay() -> Self {
        Self::new(SourceKind::Overlay, "main")
    }

    pub fn transcript(name: impl Into<String>) -> Self {
        Self::new(SourceKind::Transcript, name)
    }

    pub fn is_transcript(&self) -> bool {
        self.kind == SourceKind::Transcript
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing accepted, or the last request failed.
    #[default]
    Idle,
    /// Waiting for the translation of the current line.
    Pending,
    /// The current line's translation is rendered.
    Displayed,
}

/// What [`SourceState::observe`] decided about a new notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Same text as the accepted line; nothing to do.
    Unchanged,
    /// Text became empty; the source was cleared.
    Cleared,
    /// A new line was accepted under `epoch`.
    Accepted { text: String, epoch: u64 },
}

/// What applying a result did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The result was for an older line and was dropped.
    Stale,
    Rendered,
    /// The current line failed; it may be retried on the next notification.
    Failed,
}

/// Epoch allocator shared by all sources of one pipeline.
#[derive(Debug, Default)]
pub struct Epochs {
    last: u64,
}

impl Epochs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceState {
    last_accepted: String,
    epoch: u64,
    rendered: Option<String>,
    phase: Phase,
}

impl SourceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted(&self) -> &str {
        &self.last_accepted
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Process a change notification carrying the source's current text.
    pub fn observe(&mut self, text: &str, epochs: &mut Epochs) -> Transition {
        let text = text.trim();
        if text.is_empty() {
            // Invalidate anything in flight for the previous line.
            if !self.last_accepted.is_empty() {
                self.epoch = epochs.next();
            }
            self.last_accepted.clear();
            self.rendered = None;
            self.phase = Phase::Idle;
            return Transition::Cleared;
        }
        if text == self.last_accepted {
            return Transition::Unchanged;
        }

        self.last_accepted = text.to_string();
        self.epoch = epochs.next();
        self.rendered = None;
        self.phase = Phase::Pending;
        Transition::Accepted {
            text: self.last_accepted.clone(),
            epoch: self.epoch,
        }
    }

    /// Apply the outcome of the request made under `epoch`; `None` means the
    /// request failed.
    pub fn apply(&mut self, epoch: u64, translation: Option<&str>) -> Applied {
        if !self.is_current(epoch) {
            return Applied::Stale;
        }
        match translation {
            Some(translation) => {
                self.rendered = Some(translation.to_string());
                self.phase = Phase::Displayed;
                Applied::Rendered
            }
            None => {
                self.last_accepted.clear();
                self.rendered = None;
                self.phase = Phase::Idle;
                Applied::Failed
            }
        }
    }
}
