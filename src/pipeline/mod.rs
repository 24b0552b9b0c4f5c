//! Live translation pipeline.
//!
//! Sources report their current text; the pipeline decides which line is
//! current, serves it from the cache or schedules a translation, and renders
//! results only while they still match the line they were requested for.

pub mod error;
pub mod history;
pub mod orchestrator;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod transcript;

pub use error::{CollectingReporter, ErrorReporter, LogReporter};
pub use history::{Histories, HistoryClass, HistoryRing};
pub use orchestrator::{Pipeline, PipelineHandle, PipelineStatus};
pub use scheduler::{JobDone, JobTicket, Scheduler};
#[cfg(feature = "cli")]
pub use sink::StdoutSink;
pub use sink::{NullSink, PresentationSink, RecordingSink, SinkEvent};
pub use source::{Epochs, Phase, SourceId, SourceKind, SourceState};
pub use transcript::{TranscriptJob, TranscriptQueue};
