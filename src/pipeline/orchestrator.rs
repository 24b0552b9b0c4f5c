//! The translation pipeline actor.
//!
//! One task owns the cache, the scheduler, every source state, the history
//! rings, the transcript queue and the current settings. Everything else
//! talks to it through a cloneable [`PipelineHandle`]; adapter calls and
//! timers report back over channels, so no lock guards the shared state.

use crate::cache::{CacheKey, CachePersistence, TranslationCache};
use crate::config::{Settings, clamp_concurrency};
use crate::defaults;
use crate::error::{CaptransError, Result};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::history::Histories;
use crate::pipeline::scheduler::{JobDone, Scheduler};
use crate::pipeline::sink::PresentationSink;
use crate::pipeline::source::{Applied, Epochs, Phase, SourceId, SourceState, Transition};
use crate::pipeline::transcript::{TranscriptJob, TranscriptQueue};
use crate::store::{Store, StoreChange, Values};
use crate::translate::{TranslateError, TranslationRequest, Translator, sanitize_context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const COMMAND_BUFFER: usize = 256;

/// Point-in-time view of the pipeline, reported by the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub queued: usize,
    pub active: usize,
    pub pending: usize,
    pub transcript_queued: usize,
    pub transcript_active: usize,
    pub cache_entries: usize,
    pub sources: usize,
    /// Sources whose accepted line is still waiting for its translation.
    pub awaiting: usize,
    pub concurrency_limit: usize,
    pub target_language: String,
    pub model: String,
    pub endpoint: String,
    pub has_api_key: bool,
    pub translate_transcript: bool,
}

enum Command {
    Changed {
        source: SourceId,
        text: String,
    },
    Remove {
        source: SourceId,
    },
    Reset,
    Translate {
        text: String,
        context: Vec<String>,
        reply: oneshot::Sender<std::result::Result<String, TranslateError>>,
    },
    ClearCache {
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<PipelineStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Completions reported back to the actor by spawned tasks.
enum Event {
    SourceDone {
        source: SourceId,
        epoch: u64,
        text: String,
        result: std::result::Result<String, TranslateError>,
    },
    TranscriptReleased {
        generation: u64,
    },
}

/// Handle to a running pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    commands: mpsc::Sender<Command>,
}

impl PipelineHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CaptransError::PipelineClosed)
    }

    /// Report the current text of a live source.
    ///
    /// Empty text clears the source; repeating the accepted text is a no-op.
    pub async fn on_change(&self, source: SourceId, text: impl Into<String>) -> Result<()> {
        self.send(Command::Changed {
            source,
            text: text.into(),
        })
        .await
    }

    /// Forget a source. Late results for it are dropped.
    pub async fn remove_source(&self, source: SourceId) -> Result<()> {
        self.send(Command::Remove { source }).await
    }

    /// Forget every source and queued transcript line. Histories and the
    /// cache are kept.
    pub async fn reset(&self) -> Result<()> {
        self.send(Command::Reset).await
    }

    /// Translate one line outside of any source.
    ///
    /// Context lines are trimmed, empty ones dropped and only the last few
    /// kept. Identical concurrent requests share one adapter call.
    pub async fn translate(
        &self,
        text: impl Into<String>,
        context: Vec<String>,
    ) -> std::result::Result<String, TranslateError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Translate {
            text: text.into(),
            context,
            reply,
        };
        if self.send(command).await.is_err() {
            return Err(TranslateError::Shutdown);
        }
        rx.await.unwrap_or(Err(TranslateError::Shutdown))
    }

    /// Empty the cache and delete its persisted snapshot.
    pub async fn clear_cache(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClearCache { reply }).await?;
        rx.await.map_err(|_| CaptransError::PipelineClosed)?
    }

    pub async fn status(&self) -> Result<PipelineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| CaptransError::PipelineClosed)
    }

    /// Stop the pipeline, rejecting outstanding requests and writing any
    /// pending cache snapshot. Stopping an already stopped pipeline is fine.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown { reply }).await.is_err() {
            return Ok(());
        }
        // The actor may already be gone if another handle stopped it.
        drop(rx.await);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Pipeline builder.
pub struct Pipeline {
    settings: Settings,
    reporter: Arc<dyn ErrorReporter>,
    save_debounce: Duration,
    transcript_throttle: Duration,
}

impl Pipeline {
    /// `settings` act as defaults; values in the store override them.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            reporter: Arc::new(LogReporter),
            save_debounce: defaults::CACHE_SAVE_DEBOUNCE,
            transcript_throttle: defaults::TRANSCRIPT_THROTTLE,
        }
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce = debounce;
        self
    }

    pub fn with_transcript_throttle(mut self, throttle: Duration) -> Self {
        self.transcript_throttle = throttle;
        self
    }

    /// Load settings and the cache snapshot, then start the actor task.
    pub async fn start(
        self,
        store: Arc<dyn Store>,
        translator: Arc<dyn Translator>,
        mut sink: Box<dyn PresentationSink>,
    ) -> Result<PipelineHandle> {
        // Subscribe first so nothing written during startup is missed.
        let changes = store.subscribe();
        let stored = store.get(&Settings::KEYS, &Values::new()).await?;
        let settings = self.settings.clone().merged_with(&stored);

        let mut cache = TranslationCache::new();
        let persistence = CachePersistence::new(Arc::clone(&store)).with_debounce(self.save_debounce);
        persistence.load(&mut cache).await;
        cache.take_dirty();

        if let Err(e) = sink.configure(&settings.display_options()) {
            tracing::warn!(sink = sink.name(), error = %e, "sink rejected display options");
        }

        let (scheduler, done_rx) = Scheduler::new(translator, settings.concurrency_limit);
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, event_rx) = mpsc::unbounded_channel();

        tracing::info!(
            target_language = %settings.target_language,
            model = %settings.model,
            concurrency = scheduler.limit(),
            cached = cache.len(),
            "pipeline_started"
        );

        let actor = Actor {
            store,
            base: self.settings,
            settings,
            cache,
            persistence,
            scheduler,
            sources: HashMap::new(),
            epochs: Epochs::new(),
            histories: Histories::default(),
            transcripts: TranscriptQueue::new(),
            sink,
            reporter: self.reporter,
            events,
            transcript_throttle: self.transcript_throttle,
        };
        tokio::spawn(actor.run(command_rx, done_rx, event_rx, changes));

        Ok(PipelineHandle { commands })
    }
}

struct Actor {
    store: Arc<dyn Store>,
    /// Settings from the configuration file; restored when a stored
    /// override is removed.
    base: Settings,
    settings: Settings,
    cache: TranslationCache,
    persistence: CachePersistence,
    scheduler: Scheduler,
    sources: HashMap<SourceId, SourceState>,
    /// Outlives any single source, so a re-created source never reuses an
    /// epoch that a request may still be carrying.
    epochs: Epochs,
    histories: Histories,
    transcripts: TranscriptQueue,
    sink: Box<dyn PresentationSink>,
    reporter: Arc<dyn ErrorReporter>,
    events: mpsc::UnboundedSender<Event>,
    transcript_throttle: Duration,
}

impl Actor {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<JobDone>,
        mut event_rx: mpsc::UnboundedReceiver<Event>,
        mut changes: broadcast::Receiver<StoreChange>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.stop().await;
                        drop(reply.send(()));
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.stop().await;
                        break;
                    }
                },
                Some(done) = done_rx.recv() => {
                    self.scheduler.complete(done, &mut self.cache);
                }
                Some(event) = event_rx.recv() => self.handle_event(event),
                change = changes.recv() => match change {
                    Ok(change) => self.apply_store_change(change),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "store notifications lagged, reloading settings");
                        self.reload_settings().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        changes = self.store.subscribe();
                    }
                },
                () = self.persistence.due() => self.save().await,
            }
            self.persistence.track(&mut self.cache);
        }
        tracing::info!("pipeline_stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Changed { source, text } => self.on_change(source, &text),
            Command::Remove { source } => {
                if self.sources.remove(&source).is_some() {
                    self.transcripts.forget(&source);
                    self.clear_sink(&source);
                }
            }
            Command::Reset => self.reset(),
            Command::Translate {
                text,
                context,
                reply,
            } => self.translate(text, context, reply),
            Command::ClearCache { reply } => {
                let result = self.persistence.clear(&mut self.cache).await;
                if result.is_ok() {
                    tracing::info!("cache_cleared");
                }
                drop(reply.send(result));
            }
            Command::Status { reply } => {
                drop(reply.send(self.status()));
            }
            Command::Shutdown { reply } => {
                // Handled by the run loop.
                drop(reply.send(()));
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::SourceDone {
                source,
                epoch,
                text,
                result,
            } => self.apply_result(&source, epoch, &text, result),
            Event::TranscriptReleased { generation } => {
                self.transcripts.release(generation);
                self.pump_transcripts();
            }
        }
    }

    fn on_change(&mut self, source: SourceId, text: &str) {
        if source.is_transcript() && !self.settings.translate_transcript {
            return;
        }

        if text.trim().is_empty() && !self.sources.contains_key(&source) {
            return;
        }

        let state = self.sources.entry(source.clone()).or_default();
        let (text, epoch) = match state.observe(text, &mut self.epochs) {
            Transition::Unchanged => return,
            Transition::Cleared => {
                self.transcripts.forget(&source);
                self.clear_sink(&source);
                return;
            }
            Transition::Accepted { text, epoch } => (text, epoch),
        };

        let context = self.histories.advance(source.kind.history_class(), &text);
        self.render(&source, &text, None);

        let key = CacheKey::for_settings(&self.settings, &text);
        if let Some(translation) = self.cache.get(&key) {
            tracing::debug!(source = %source, "cache_hit");
            self.apply_result(&source, epoch, &text, Ok(translation));
            return;
        }

        if source.is_transcript() {
            self.transcripts.push(TranscriptJob {
                source,
                epoch,
                text,
                context,
            });
            self.pump_transcripts();
        } else {
            self.submit(source, epoch, text, context, None);
        }
    }

    /// Hand a source's line to the scheduler. With `generation` set the
    /// job holds a transcript slot that is returned after the throttle.
    fn submit(
        &mut self,
        source: SourceId,
        epoch: u64,
        text: String,
        context: Vec<String>,
        generation: Option<u64>,
    ) {
        if !self.settings.has_api_key() {
            self.apply_result(&source, epoch, &text, Err(TranslateError::MissingApiKey));
            if let Some(generation) = generation {
                self.release_after_throttle(generation);
            }
            return;
        }

        let key = CacheKey::for_settings(&self.settings, &text);
        let request = self.request(&text, context);
        let ticket = self.scheduler.submit(key, request);
        let events = self.events.clone();
        let throttle = self.transcript_throttle;
        tokio::spawn(async move {
            let result = ticket.await;
            if events
                .send(Event::SourceDone {
                    source,
                    epoch,
                    text,
                    result,
                })
                .is_err()
            {
                return;
            }
            if let Some(generation) = generation {
                tokio::time::sleep(throttle).await;
                drop(events.send(Event::TranscriptReleased { generation }));
            }
        });
    }

    fn apply_result(
        &mut self,
        source: &SourceId,
        epoch: u64,
        text: &str,
        result: std::result::Result<String, TranslateError>,
    ) {
        let Some(state) = self.sources.get_mut(source) else {
            return;
        };
        match result {
            Ok(translation) => {
                if state.apply(epoch, Some(&translation)) == Applied::Rendered {
                    self.render(source, text, Some(&translation));
                }
            }
            Err(e) => match state.apply(epoch, None) {
                Applied::Failed => self.reporter.report(source, &e),
                _ => tracing::debug!(source = %source, error = %e, "stale_failure_dropped"),
            },
        }
    }

    fn pump_transcripts(&mut self) {
        let limit = clamp_concurrency(self.settings.concurrency_limit);
        while let Some(job) = self.transcripts.admit(limit) {
            let generation = self.transcripts.generation();
            let current = self
                .sources
                .get(&job.source)
                .is_some_and(|state| state.is_current(job.epoch));
            if !current {
                self.release_after_throttle(generation);
                continue;
            }

            let key = CacheKey::for_settings(&self.settings, &job.text);
            if let Some(translation) = self.cache.get(&key) {
                self.apply_result(&job.source, job.epoch, &job.text, Ok(translation));
                self.release_after_throttle(generation);
                continue;
            }

            self.submit(job.source, job.epoch, job.text, job.context, Some(generation));
        }
    }

    fn release_after_throttle(&self, generation: u64) {
        let events = self.events.clone();
        let throttle = self.transcript_throttle;
        tokio::spawn(async move {
            tokio::time::sleep(throttle).await;
            drop(events.send(Event::TranscriptReleased { generation }));
        });
    }

    fn translate(
        &mut self,
        text: String,
        context: Vec<String>,
        reply: oneshot::Sender<std::result::Result<String, TranslateError>>,
    ) {
        let text = text.trim();
        if text.is_empty() {
            drop(reply.send(Err(TranslateError::EmptyText)));
            return;
        }
        if !self.settings.has_api_key() {
            drop(reply.send(Err(TranslateError::MissingApiKey)));
            return;
        }

        let context = sanitize_context(&context, defaults::MAX_REQUEST_CONTEXT);
        let key = CacheKey::for_settings(&self.settings, text);
        if let Some(translation) = self.cache.get(&key) {
            drop(reply.send(Ok(translation)));
            return;
        }

        let request = self.request(text, context);
        let ticket = self.scheduler.submit(key, request);
        tokio::spawn(async move {
            drop(reply.send(ticket.await));
        });
    }

    fn request(&self, text: &str, context: Vec<String>) -> TranslationRequest {
        TranslationRequest {
            text: text.to_string(),
            context,
            api_key: self.settings.api_key.clone(),
            target_language: self.settings.target_language.clone(),
            model: self.settings.model.clone(),
            api_base_url: self.settings.api_base_url.clone(),
        }
    }

    fn reset(&mut self) {
        let sources: Vec<SourceId> = self.sources.drain().map(|(id, _)| id).collect();
        self.transcripts.clear();
        for source in &sources {
            self.clear_sink(source);
        }
        tracing::debug!(sources = sources.len(), "pipeline_reset");
    }

    fn drop_transcripts(&mut self) {
        let transcripts: Vec<SourceId> = self
            .sources
            .keys()
            .filter(|id| id.is_transcript())
            .cloned()
            .collect();
        for source in &transcripts {
            self.sources.remove(source);
            self.clear_sink(source);
        }
        self.transcripts.clear();
    }

    fn apply_store_change(&mut self, change: StoreChange) {
        if !Settings::KEYS.contains(&change.key.as_str()) {
            return;
        }
        let mut updated = self.settings.clone();
        let result = match &change.new_value {
            Some(value) => updated.apply(&change.key, value),
            None => match self.base.to_values().get(&change.key) {
                Some(value) => updated.apply(&change.key, value),
                None => Ok(()),
            },
        };
        match result {
            Ok(()) => self.update_settings(updated),
            Err(e) => tracing::warn!(key = %change.key, error = %e, "ignoring stored setting"),
        }
    }

    async fn reload_settings(&mut self) {
        match self.store.get(&Settings::KEYS, &Values::new()).await {
            Ok(stored) => {
                let updated = self.base.clone().merged_with(&stored);
                self.update_settings(updated);
            }
            Err(e) => tracing::warn!(error = %e, "failed to reload settings"),
        }
    }

    fn update_settings(&mut self, updated: Settings) {
        let previous = std::mem::replace(&mut self.settings, updated);

        if previous.concurrency_limit != self.settings.concurrency_limit {
            self.scheduler
                .update_concurrency_limit(self.settings.concurrency_limit);
            self.pump_transcripts();
        }

        if previous.translate_transcript && !self.settings.translate_transcript {
            self.drop_transcripts();
        }

        let display = self.settings.display_options();
        if previous.display_options() != display
            && let Err(e) = self.sink.configure(&display)
        {
            tracing::warn!(sink = self.sink.name(), error = %e, "sink rejected display options");
        }

        if previous.target_language != self.settings.target_language
            || previous.model != self.settings.model
            || previous.api_base_url != self.settings.api_base_url
        {
            tracing::info!(
                target_language = %self.settings.target_language,
                model = %self.settings.model,
                "translation_settings_changed"
            );
        }
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            queued: self.scheduler.queued(),
            active: self.scheduler.active(),
            pending: self.scheduler.pending(),
            transcript_queued: self.transcripts.queued(),
            transcript_active: self.transcripts.active(),
            cache_entries: self.cache.len(),
            sources: self.sources.len(),
            awaiting: self
                .sources
                .values()
                .filter(|state| state.phase() == Phase::Pending)
                .count(),
            concurrency_limit: self.scheduler.limit(),
            target_language: self.settings.target_language.clone(),
            model: self.settings.model.clone(),
            endpoint: crate::translate::normalize_endpoint(&self.settings.api_base_url),
            has_api_key: self.settings.has_api_key(),
            translate_transcript: self.settings.translate_transcript,
        }
    }

    fn render(&mut self, source: &SourceId, original: &str, translation: Option<&str>) {
        if let Err(e) = self.sink.render(source, original, translation) {
            tracing::warn!(sink = self.sink.name(), source = %source, error = %e, "render failed");
        }
    }

    fn clear_sink(&mut self, source: &SourceId) {
        if let Err(e) = self.sink.clear(source) {
            tracing::warn!(sink = self.sink.name(), source = %source, error = %e, "clear failed");
        }
    }

    async fn save(&mut self) {
        if let Err(e) = self.persistence.flush(&mut self.cache).await {
            tracing::warn!(error = %e, "failed to save cache snapshot");
        }
    }

    async fn stop(&mut self) {
        self.scheduler.shutdown();
        self.transcripts.clear();
        self.persistence.track(&mut self.cache);
        if self.persistence.is_scheduled() {
            self.save().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::CollectingReporter;
    use crate::pipeline::sink::RecordingSink;
    use crate::store::MemoryStore;
    use crate::translate::MockTranslator;
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            api_key: "sk-test".to_string(),
            ..Settings::default()
        }
    }

    async fn start(
        mock: &MockTranslator,
        store: Arc<MemoryStore>,
    ) -> (PipelineHandle, RecordingSink, CollectingReporter) {
        let sink = RecordingSink::new();
        let reporter = CollectingReporter::new();
        let handle = Pipeline::new(settings())
            .with_error_reporter(Arc::new(reporter.clone()))
            .start(store, Arc::new(mock.clone()), Box::new(sink.clone()))
            .await
            .unwrap();
        (handle, sink, reporter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_translate_request_api() {
        let mock = MockTranslator::new().with_reply("Hello", "你好");
        let (handle, _sink, _) = start(&mock, Arc::new(MemoryStore::new())).await;

        assert_eq!(
            handle.translate("  Hello ", vec![]).await,
            Ok("你好".to_string())
        );
        assert_eq!(
            handle.translate("   ", vec![]).await,
            Err(TranslateError::EmptyText)
        );

        // Served from the cache.
        assert_eq!(handle.translate("Hello", vec![]).await, Ok("你好".to_string()));
        assert_eq!(mock.call_count(), 1);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_context_is_sanitized() {
        let mock = MockTranslator::new();
        let (handle, _sink, _) = start(&mock, Arc::new(MemoryStore::new())).await;

        let context: Vec<String> = ["a", " ", "b", "c", "d", "e", " f "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        handle.translate("line", context).await.unwrap();

        assert_eq!(mock.calls()[0].context, vec!["b", "c", "d", "e", "f"]);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_api_key() {
        let mock = MockTranslator::new();
        let store = Arc::new(MemoryStore::new());
        let sink = RecordingSink::new();
        let reporter = CollectingReporter::new();
        let handle = Pipeline::new(Settings::default())
            .with_error_reporter(Arc::new(reporter.clone()))
            .start(store, Arc::new(mock.clone()), Box::new(sink.clone()))
            .await
            .unwrap();

        assert_eq!(
            handle.translate("Hello", vec![]).await,
            Err(TranslateError::MissingApiKey)
        );

        handle.on_change(SourceId::caption(), "Hello").await.unwrap();
        handle.status().await.unwrap();
        assert_eq!(
            reporter.reports(),
            vec![(SourceId::caption(), TranslateError::MissingApiKey)]
        );
        assert_eq!(mock.call_count(), 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_and_retried_on_next_notification() {
        let mock = MockTranslator::new().with_failure(
            "Hello",
            TranslateError::Http {
                status: 500,
                message: "boom".to_string(),
            },
        );
        let (handle, sink, reporter) = start(&mock, Arc::new(MemoryStore::new())).await;

        handle.on_change(SourceId::caption(), "Hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(reporter.reports().len(), 1);
        assert_eq!(sink.current(&SourceId::caption()), None);

        handle.on_change(SourceId::caption(), "Hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mock.calls_for("Hello"), 2);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_settings_override_file_settings() {
        let mut values = Values::new();
        values.insert("target_language".to_string(), json!("ja"));
        values.insert("concurrency_limit".to_string(), json!("abc"));
        let store = Arc::new(MemoryStore::with_values(values));
        let (handle, _sink, _) = start(&MockTranslator::new(), store).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.target_language, "ja");
        assert_eq!(status.concurrency_limit, 3);
        assert!(status.has_api_key);
        assert_eq!(status.endpoint, "https://api.openai.com/v1/chat/completions");
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_settings_changes() {
        let store = Arc::new(MemoryStore::new());
        let (handle, sink, _) = start(&MockTranslator::new(), store.clone()).await;

        let mut values = Values::new();
        values.insert("concurrency_limit".to_string(), json!(6));
        values.insert("show_original".to_string(), json!(false));
        store.set(values).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.concurrency_limit, 6);
        assert!(sink.events().iter().any(|event| matches!(
            event,
            crate::pipeline::sink::SinkEvent::Configure(options) if !options.show_original
        )));

        // Removing an override falls back to the configured value.
        store.remove("concurrency_limit").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(handle.status().await.unwrap().concurrency_limit, 3);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_source_drops_late_result() {
        let mock = MockTranslator::new().with_default_delay(Duration::from_millis(200));
        let (handle, sink, _) = start(&mock, Arc::new(MemoryStore::new())).await;

        handle.on_change(SourceId::caption(), "Hello").await.unwrap();
        handle.remove_source(SourceId::caption()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(sink.translations_for(&SourceId::caption()).is_empty());
        assert_eq!(handle.status().await.unwrap().cache_entries, 1);
        handle.shutdown().await.unwrap();
    }

    /// The old line answers after 300 ms, the new one after a second.
    fn old_then_new_line() -> MockTranslator {
        MockTranslator::new()
            .with_reply("Old line", "OLD")
            .with_reply("New line", "NEW")
            .with_delay("Old line", Duration::from_millis(300))
            .with_delay("New line", Duration::from_millis(1000))
    }

    async fn assert_only_new_line_rendered(
        handle: &PipelineHandle,
        sink: &RecordingSink,
        source: &SourceId,
    ) {
        // The old request has finished; the new one is still out.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(sink.current(source), None);
        assert!(sink.translations_for(source).is_empty());
        assert_eq!(handle.status().await.unwrap().awaiting, 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sink.current(source).as_deref(), Some("NEW"));
        assert_eq!(sink.translations_for(source), vec!["NEW".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_after_remove_skips_recreated_source() {
        let mock = old_then_new_line();
        let (handle, sink, _) = start(&mock, Arc::new(MemoryStore::new())).await;
        let caption = SourceId::caption();

        handle.on_change(caption.clone(), "Old line").await.unwrap();
        handle.remove_source(caption.clone()).await.unwrap();
        handle.on_change(caption.clone(), "New line").await.unwrap();

        assert_only_new_line_rendered(&handle, &sink, &caption).await;
        assert_eq!(mock.call_count(), 2);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_result_after_reset_skips_recreated_source() {
        let mock = old_then_new_line();
        let (handle, sink, _) = start(&mock, Arc::new(MemoryStore::new())).await;
        let caption = SourceId::caption();

        handle.on_change(caption.clone(), "Old line").await.unwrap();
        handle.reset().await.unwrap();
        handle.on_change(caption.clone(), "New line").await.unwrap();

        assert_only_new_line_rendered(&handle, &sink, &caption).await;
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_for_unknown_source_is_ignored() {
        let mock = MockTranslator::new();
        let (handle, sink, _) = start(&mock, Arc::new(MemoryStore::new())).await;

        for name in ["0", "1", "2"] {
            handle
                .on_change(SourceId::transcript(name), "   ")
                .await
                .unwrap();
        }
        handle.on_change(SourceId::caption(), "").await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.sources, 0);
        assert!(
            !sink
                .events()
                .iter()
                .any(|event| matches!(event, crate::pipeline::sink::SinkEvent::Clear { .. }))
        );
        assert_eq!(mock.call_count(), 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_cache_and_closes_handle() {
        let store = Arc::new(MemoryStore::new());
        let (handle, _sink, _) = start(&MockTranslator::new(), store.clone()).await;

        handle.translate("Hello", vec![]).await.unwrap();
        handle.shutdown().await.unwrap();

        let saved = store
            .get(&[defaults::CACHE_STORAGE_KEY], &Values::new())
            .await
            .unwrap();
        assert!(saved.contains_key(defaults::CACHE_STORAGE_KEY));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!handle.is_running());
        assert_eq!(
            handle.translate("Hello", vec![]).await,
            Err(TranslateError::Shutdown)
        );
        // Second shutdown is a no-op.
        handle.shutdown().await.unwrap();
    }
}
