//! Bounded-concurrency job runner with request coalescing.
//!
//! The scheduler is the only caller of the [`Translator`]. A job is keyed by
//! its [`CacheKey`]; while a job for a key is queued or running, further
//! submissions for the same key attach to it instead of creating work.
//!
//! Adapter calls run in spawned tasks and report back through the channel
//! returned by [`Scheduler::new`]. The owner feeds each [`JobDone`] to
//! [`Scheduler::complete`], which memoizes, resolves waiters and admits the
//! next queued job.

use crate::cache::{CacheKey, TranslationCache};
use crate::config::clamp_concurrency;
use crate::translate::{TranslateError, TranslationRequest, Translator};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

type Reply = oneshot::Sender<Result<String, TranslateError>>;

/// Resolves to the outcome of a submitted job.
///
/// Dropping a ticket does not cancel the job; other waiters and the cache
/// still receive its result.
#[derive(Debug)]
pub struct JobTicket {
    rx: oneshot::Receiver<Result<String, TranslateError>>,
}

impl Future for JobTicket {
    type Output = Result<String, TranslateError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TranslateError::Shutdown)))
    }
}

/// Completion report of one adapter call.
#[derive(Debug)]
pub struct JobDone {
    pub key: CacheKey,
    pub result: Result<String, TranslateError>,
}

#[derive(Debug)]
struct QueuedJob {
    key: CacheKey,
    request: TranslationRequest,
}

pub struct Scheduler {
    translator: Arc<dyn Translator>,
    limit: usize,
    active: usize,
    queue: VecDeque<QueuedJob>,
    pending: HashMap<CacheKey, Vec<Reply>>,
    done_tx: mpsc::UnboundedSender<JobDone>,
}

impl Scheduler {
    pub fn new(
        translator: Arc<dyn Translator>,
        limit: usize,
    ) -> (Self, mpsc::UnboundedReceiver<JobDone>) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            translator,
            limit: clamp_concurrency(limit),
            active: 0,
            queue: VecDeque::new(),
            pending: HashMap::new(),
            done_tx,
        };
        (scheduler, done_rx)
    }

    /// Submit a request, coalescing onto an existing job for `key`.
    pub fn submit(&mut self, key: CacheKey, request: TranslationRequest) -> JobTicket {
        let (tx, rx) = oneshot::channel();
        if let Some(waiters) = self.pending.get_mut(&key) {
            tracing::debug!(key = %key, waiters = waiters.len() + 1, "job_coalesced");
            waiters.push(tx);
            return JobTicket { rx };
        }

        self.pending.insert(key.clone(), vec![tx]);
        self.queue.push_back(QueuedJob { key, request });
        self.pump();
        JobTicket { rx }
    }

    /// Finish a job: memoize a success, resolve every waiter, free the slot
    /// and admit queued work.
    pub fn complete(&mut self, done: JobDone, cache: &mut TranslationCache) {
        let JobDone { key, result } = done;
        self.active = self.active.saturating_sub(1);

        match &result {
            Ok(translation) => {
                cache.put(key.clone(), translation);
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "job_failed");
            }
        }

        for waiter in self.pending.remove(&key).unwrap_or_default() {
            // A waiter that went away is fine; the cache already has the value.
            drop(waiter.send(result.clone()));
        }

        self.pump();
    }

    /// Change the concurrency limit and admit work under the new limit.
    ///
    /// Lowering the limit never interrupts running jobs; admission simply
    /// waits until enough of them finish.
    pub fn update_concurrency_limit(&mut self, limit: usize) {
        let limit = clamp_concurrency(limit);
        if limit != self.limit {
            tracing::debug!(from = self.limit, to = limit, "concurrency_limit_changed");
            self.limit = limit;
        }
        self.pump();
    }

    /// Reject every waiter with [`TranslateError::Shutdown`] and drop queued
    /// jobs. Running calls finish on their own; their results are ignored.
    pub fn shutdown(&mut self) {
        self.queue.clear();
        for (_, waiters) in self.pending.drain() {
            for waiter in waiters {
                drop(waiter.send(Err(TranslateError::Shutdown)));
            }
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Jobs running right now.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Jobs waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Distinct keys queued or running.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.pending.contains_key(key)
    }

    fn pump(&mut self) {
        while self.active < self.limit {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            self.active += 1;
            self.spawn(job);
        }
    }

    fn spawn(&self, job: QueuedJob) {
        let translator = Arc::clone(&self.translator);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let QueuedJob { key, request } = job;
            let result = translator.translate(&request).await;
            if done_tx.send(JobDone { key, result }).is_err() {
                tracing::debug!("scheduler gone before job finished");
            }
        });
    }
}
