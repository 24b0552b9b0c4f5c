//! Throttled queue for transcript lines.
//!
//! A transcript can reveal dozens of lines at once. They are admitted at
//! most `limit` at a time and each admitted job keeps its slot for a short
//! throttle after it finishes, so a burst of lines is spread out instead of
//! saturating the scheduler.

use crate::pipeline::source::SourceId;
use std::collections::VecDeque;

/// A transcript line waiting for translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptJob {
    pub source: SourceId,
    pub epoch: u64,
    pub text: String,
    pub context: Vec<String>,
}

/// Slot accounting for transcript jobs.
///
/// Every clear starts a new generation. A slot released with an older
/// generation belongs to jobs that were dropped and is ignored.
#[derive(Debug, Default)]
pub struct TranscriptQueue {
    queue: VecDeque<TranscriptJob>,
    active: usize,
    generation: u64,
}

impl TranscriptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: TranscriptJob) {
        self.queue.push_back(job);
    }

    /// Take the next job if fewer than `limit` slots are in use.
    pub fn admit(&mut self, limit: usize) -> Option<TranscriptJob> {
        if self.active >= limit {
            return None;
        }
        let job = self.queue.pop_front()?;
        self.active += 1;
        Some(job)
    }

    /// Return a slot taken during `generation`.
    pub fn release(&mut self, generation: u64) {
        if generation == self.generation {
            self.active = self.active.saturating_sub(1);
        }
    }

    /// Drop queued jobs and forget running ones.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.active = 0;
        self.generation += 1;
    }

    /// Drop queued jobs for one source.
    pub fn forget(&mut self, source: &SourceId) {
        self.queue.retain(|job| &job.source != source);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active(&self) -> usize {
        self.active
    }
}
