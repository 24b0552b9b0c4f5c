//! Recent-line history used to build request context.

use crate::defaults;
use std::collections::VecDeque;

/// Which history a source contributes to.
///
/// The live caption and the overlay share one history so context follows
/// the spoken line regardless of where it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryClass {
    Caption,
    Transcript,
}

/// Bounded, append-only list of accepted lines.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    lines: VecDeque<String>,
    limit: usize,
}

impl HistoryRing {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit.min(defaults::HISTORY_LIMIT)),
            limit: limit.max(1),
        }
    }

    /// Append a line, dropping the oldest ones past the limit. Empty lines
    /// are not recorded.
    pub fn push(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.lines.push_back(line.to_string());
        while self.lines.len() > self.limit {
            self.lines.pop_front();
        }
    }

    /// The last `window` lines, oldest first.
    pub fn context(&self, window: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(window);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(defaults::HISTORY_LIMIT)
    }
}

/// One ring per [`HistoryClass`].
#[derive(Debug, Clone, Default)]
pub struct Histories {
    caption: HistoryRing,
    transcript: HistoryRing,
}

impl Histories {
    pub fn get(&self, class: HistoryClass) -> &HistoryRing {
        match class {
            HistoryClass::Caption => &self.caption,
            HistoryClass::Transcript => &self.transcript,
        }
    }

    pub fn get_mut(&mut self, class: HistoryClass) -> &mut HistoryRing {
        match class {
            HistoryClass::Caption => &mut self.caption,
            HistoryClass::Transcript => &mut self.transcript,
        }
    }

    /// Context for the next line of `class`, then record `line`.
    ///
    /// The returned context never includes `line` itself.
    pub fn advance(&mut self, class: HistoryClass, line: &str) -> Vec<String> {
        let ring = self.get_mut(class);
        let context = ring.context(defaults::CONTEXT_WINDOW);
        ring.push(line);
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_oldest_first() {
        let mut ring = HistoryRing::new(10);
        for line in ["a", "b", "c", "d"] {
            ring.push(line);
        }
        assert_eq!(ring.context(3), vec!["b", "c", "d"]);
        assert_eq!(ring.context(10), vec!["a", "b", "c", "d"]);
        assert!(ring.context(0).is_empty());
    }

    #[test]
    fn test_ring_truncates_from_front() {
        let mut ring = HistoryRing::new(80);
        for i in 0..100 {
            ring.push(&format!("line {i}"));
        }
        assert_eq!(ring.len(), 80);
        assert_eq!(ring.context(1), vec!["line 99"]);
        assert_eq!(ring.context(80)[0], "line 20");
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let mut ring = HistoryRing::default();
        ring.push("");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_advance_returns_previous_lines_only() {
        let mut histories = Histories::default();
        assert!(histories.advance(HistoryClass::Caption, "one").is_empty());
        assert_eq!(histories.advance(HistoryClass::Caption, "two"), vec!["one"]);
        assert_eq!(
            histories.advance(HistoryClass::Caption, "three"),
            vec!["one", "two"]
        );
        assert_eq!(
            histories.advance(HistoryClass::Caption, "four"),
            vec!["one", "two", "three"]
        );
        assert_eq!(
            histories.advance(HistoryClass::Caption, "five"),
            vec!["two", "three", "four"]
        );
    }

    #[test]
    fn test_classes_are_independent() {
        let mut histories = Histories::default();
        histories.advance(HistoryClass::Caption, "caption");
        assert!(
            histories
                .advance(HistoryClass::Transcript, "transcript")
                .is_empty()
        );
        assert_eq!(histories.get(HistoryClass::Transcript).len(), 1);
    }
}
