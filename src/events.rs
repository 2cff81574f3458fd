//! Named events emitted at each labeling decision point.
//!
//! Components receive an [`EventSink`] at construction and report through it;
//! they never format log lines themselves. [`LogSink`] forwards events to the
//! `log` facade, [`RecordingSink`] keeps them for inspection in tests.

use std::{
    fmt,
    path::PathBuf,
    sync::Mutex,
};

use log::{Level, log};

use crate::printable_delimiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelEvent {
    SourceResolved {
        target: String,
        reference: PathBuf,
    },
    ExceptionApplied {
        target: String,
        pattern: String,
        label: String,
    },
    AmbiguousSource {
        target: String,
        candidates: Vec<String>,
        chosen: String,
    },
    EncodingFallback {
        path: PathBuf,
        from: &'static str,
        to: &'static str,
        line: u64,
    },
    MalformedRowsSkipped {
        path: PathBuf,
        count: usize,
    },
    MissingKeyRows {
        path: PathBuf,
        count: usize,
    },
    IndexBuilt {
        path: PathBuf,
        keys: usize,
        rows: usize,
        skipped: usize,
    },
    ChunkLabeled {
        chunk: usize,
        rows: usize,
        matched: usize,
    },
    OutputWritten {
        path: PathBuf,
        rows: usize,
        delimiter: u8,
        compressed: bool,
    },
    TargetFailed {
        target: PathBuf,
        reason: String,
    },
}

impl LabelEvent {
    pub fn level(&self) -> Level {
        match self {
            LabelEvent::AmbiguousSource { .. }
            | LabelEvent::EncodingFallback { .. }
            | LabelEvent::MalformedRowsSkipped { .. } => Level::Warn,
            LabelEvent::TargetFailed { .. } => Level::Error,
            LabelEvent::ChunkLabeled { .. } | LabelEvent::MissingKeyRows { .. } => Level::Debug,
            LabelEvent::SourceResolved { .. }
            | LabelEvent::ExceptionApplied { .. }
            | LabelEvent::IndexBuilt { .. }
            | LabelEvent::OutputWritten { .. } => Level::Info,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LabelEvent::SourceResolved { .. } => "source_resolved",
            LabelEvent::ExceptionApplied { .. } => "exception_applied",
            LabelEvent::AmbiguousSource { .. } => "ambiguous_source",
            LabelEvent::EncodingFallback { .. } => "encoding_fallback",
            LabelEvent::MalformedRowsSkipped { .. } => "malformed_rows_skipped",
            LabelEvent::MissingKeyRows { .. } => "missing_key_rows",
            LabelEvent::IndexBuilt { .. } => "index_built",
            LabelEvent::ChunkLabeled { .. } => "chunk_labeled",
            LabelEvent::OutputWritten { .. } => "output_written",
            LabelEvent::TargetFailed { .. } => "target_failed",
        }
    }
}

impl fmt::Display for LabelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelEvent::SourceResolved { target, reference } => {
                write!(f, "Target '{target}' resolved to reference {reference:?}")
            }
            LabelEvent::ExceptionApplied {
                target,
                pattern,
                label,
            } => write!(
                f,
                "Exception '{pattern}' matched '{target}'; using label '{label}'"
            ),
            LabelEvent::AmbiguousSource {
                target,
                candidates,
                chosen,
            } => write!(
                f,
                "Multiple reference files match '{target}': [{}]; using '{chosen}'",
                candidates.join(", ")
            ),
            LabelEvent::EncodingFallback {
                path,
                from,
                to,
                line,
            } => write!(
                f,
                "{path:?} is not valid {from} at line {line}; decoding as {to}"
            ),
            LabelEvent::MalformedRowsSkipped { path, count } => {
                write!(f, "Skipped {count} malformed row(s) in {path:?}")
            }
            LabelEvent::MissingKeyRows { path, count } => write!(
                f,
                "{count} row(s) in {path:?} have an incomplete flow key"
            ),
            LabelEvent::IndexBuilt {
                path,
                keys,
                rows,
                skipped,
            } => write!(
                f,
                "Indexed {keys} distinct flow key(s) from {rows} row(s) of {path:?} ({skipped} without a complete key)"
            ),
            LabelEvent::ChunkLabeled {
                chunk,
                rows,
                matched,
            } => write!(f, "Chunk {chunk}: {matched}/{rows} row(s) matched"),
            LabelEvent::OutputWritten {
                path,
                rows,
                delimiter,
                compressed,
            } => write!(
                f,
                "Wrote {rows} row(s) to {path:?} (delimiter '{}'{})",
                printable_delimiter(*delimiter),
                if *compressed { ", gzip" } else { "" }
            ),
            LabelEvent::TargetFailed { target, reason } => {
                write!(f, "Labeling {target:?} failed: {reason}")
            }
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: LabelEvent);
}

/// Routes events to the `log` facade under the `flow_labeler::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: LabelEvent) {
        log!(target: "flow_labeler::events", event.level(), "[{}] {event}", event.name());
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LabelEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LabelEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LabelEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
