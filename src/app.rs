//! Application composition root for the `watch` command.
//!
//! Every stdin line becomes the new text of one live source, the way a
//! caption track replaces its current cue. An empty line clears it.

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineHandle, SourceId, StdoutSink};
use crate::store::{JsonFileStore, MemoryStore, Store};
use crate::translate::OpenAiTranslator;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Options for [`run_watch_command`].
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Feed lines as this transcript entry instead of the main caption.
    pub transcript: Option<String>,
    /// Keep settings overrides and the cache in memory only.
    pub ephemeral: bool,
    pub quiet: bool,
}

impl WatchOptions {
    fn source(&self) -> SourceId {
        match &self.transcript {
            Some(name) => SourceId::transcript(name.clone()),
            None => SourceId::caption(),
        }
    }
}

/// Translate stdin line by line until EOF.
pub async fn run_watch_command(config: Config, options: WatchOptions) -> Result<()> {
    let store: Arc<dyn Store> = if options.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let path = config
            .daemon
            .store_path
            .clone()
            .unwrap_or_else(JsonFileStore::default_path);
        Arc::new(JsonFileStore::open(path).await?)
    };

    let sink = StdoutSink::new(config.settings.display_options());
    let handle = Pipeline::new(config.settings)
        .start(store, Arc::new(OpenAiTranslator::new()), Box::new(sink))
        .await?;

    if !options.quiet {
        eprintln!("Reading lines from stdin (Ctrl+D to finish)...");
    }

    let source = options.source();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => handle.on_change(source.clone(), line).await?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.shutdown().await?;
                return Ok(());
            }
        }
    }

    drain(&handle).await?;
    handle.shutdown().await
}

/// Wait until no translation is queued or running.
async fn drain(handle: &PipelineHandle) -> Result<()> {
    loop {
        let status = handle.status().await?;
        if status.awaiting == 0 && status.pending == 0 && status.transcript_queued == 0 {
            return Ok(());
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
