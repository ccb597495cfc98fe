//! # Run context
//!
//! [`RunContext`] is the run-scoped object handed to every component of the
//! pipeline. It replaces any ambient process state:
//!
//! - a [`tracing`] span (`run`, with the run identifier) under which every log line
//!   of the run is emitted, and one child span per chunk;
//! - a structured [`Diagnostics`] sink collecting [`DiagnosticEvent`]s (dropped rows,
//!   rows read and written, …) that callers and tests can inspect after the run.
//!
//! The context never installs a subscriber: where the log lines go is decided by the
//! binary (or by the test harness).
//!
//! ## Usage
//!
//! ```rust
//! use surveyjoin::prelude::*;
//!
//! let mut ctx = RunContext::new("unit-test");
//! ctx.record(Stage::Join, DiagnosticKind::UnmatchedJoinRows, 3, &["S1".to_string()]);
//! assert_eq!(ctx.diagnostics().total(DiagnosticKind::UnmatchedJoinRows), 3);
//! ```
use std::fmt;

use tracing::Span;

use crate::{chunk::ChunkCursor, constants::ObjId};

/// Largest number of identifiers kept in a single diagnostic event.
const MAX_SAMPLE_IDS: usize = 20;

/// Component that emitted a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadSources,
    Ephemeris,
    IntermediateDb,
    Join,
    Pointing,
    Writing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ReadSources => "read sources",
            Stage::Ephemeris => "ephemeris",
            Stage::IntermediateDb => "intermediate database",
            Stage::Join => "join",
            Stage::Pointing => "pointing match",
            Stage::Writing => "writing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Per-object rows read for a chunk.
    ObjectRowsRead,
    /// Ephemeris rows obtained for a chunk.
    EphemerisRowsRead,
    /// Rows inserted in the intermediate database.
    IntermediateRowsStored,
    /// Ephemeris rows without a matching per-object row (upstream invariant violation).
    UnmatchedJoinRows,
    /// Observations whose pointing is not part of the survey window.
    UnmatchedPointings,
    /// Observations taken in a filter that is not configured.
    FilteredOut,
    RowsWritten,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEvent {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub count: usize,
    /// Chunk being processed when the event was recorded, if any.
    pub chunk: Option<ChunkCursor>,
    /// At most 20 of the identifiers concerned by the event.
    pub sample_ids: Vec<ObjId>,
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    events: Vec<DiagnosticEvent>,
}

impl Diagnostics {
    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    /// Sum of the counts of every event of `kind`.
    pub fn total(&self, kind: DiagnosticKind) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.count)
            .sum()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &DiagnosticEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    span: Span,
    chunk: Option<ChunkCursor>,
    diagnostics: Diagnostics,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        let span = tracing::info_span!("run", run_id = %run_id);
        RunContext {
            run_id,
            span,
            chunk: None,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The run span; enter it around work done outside of a chunk.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Mark `cursor` as the current chunk and return its span (child of the run span).
    pub fn begin_chunk(&mut self, cursor: ChunkCursor) -> Span {
        self.chunk = Some(cursor);
        tracing::info_span!(
            parent: &self.span,
            "chunk",
            start_row = cursor.start_row,
            end_row = cursor.end_row()
        )
    }

    pub fn end_chunk(&mut self) {
        self.chunk = None;
    }

    pub fn current_chunk(&self) -> Option<ChunkCursor> {
        self.chunk
    }

    /// Push a diagnostic event for the current chunk.
    pub fn record(&mut self, stage: Stage, kind: DiagnosticKind, count: usize, ids: &[ObjId]) {
        self.diagnostics.events.push(DiagnosticEvent {
            stage,
            kind,
            count,
            chunk: self.chunk,
            sample_ids: ids.iter().take(MAX_SAMPLE_IDS).cloned().collect(),
        });
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
