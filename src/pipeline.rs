//! # Pipeline driver
//!
//! The chunk loop of a run. The driver owns the [`ChunkCursor`], invokes every stage in
//! order for each chunk and stops when the cursor passes the last orbit row.
//!
//! ```text
//! Idle → ReadingSources → Validating → Joining → Matching → Writing ─┐
//!              ▲                                                      │
//!              └──────────────── next chunk ─────────────────────────┤
//!                                                                     ▼
//!                                                                   Done
//! ```
//!
//! Any error moves the driver to [`PipelineState::Failed`] and is returned as a
//! [`PipelineError`] carrying the state and the chunk bounds at the time of failure.
//! Nothing is retried and no chunk is skipped: a cross-source inconsistency aborts the
//! run.
//!
//! Before the loop
//! -----------------
//! * The orbit catalog rows are counted to know when the cursor is exhausted.
//! * The pointing table is loaded once.
//! * The intermediate database is built (or reopened) when requested.
//!
//! Per chunk
//! -----------------
//! 1. Read orbits, physical parameters and (comets) cometary parameters.
//! 2. Check that their `ObjID` sets are identical.
//! 3. Fetch the ephemeris rows of these objects and check they reference known objects.
//! 4. Join, match against the pointings, write to the sink.
//!
//! After the last chunk, the physical and cometary catalogs must have no rows left
//! past the last orbit row.
use std::fmt;

use camino::Utf8PathBuf;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};
use thiserror::Error;
use tracing::info;

use crate::{
    chunk::ChunkCursor,
    config::{ObjectType, PipelineConfig},
    ephemeris::{interm_db::IntermediateDatabase, EphemerisSource},
    identity::{check_identical, check_subset},
    join::join_observations,
    pointing::{match_pointings, PointingTable},
    readers::{
        count_data_rows,
        object_reader::{read_cometary, read_orbits, read_physical_parameters},
    },
    run_context::{DiagnosticKind, RunContext, Stage},
    sinks::{OutputSink, SinkWriter},
    surveyjoin_errors::SurveyJoinError,
};

#[cfg(feature = "progress")]
use crate::progress_bar::{chunk_progress_bar, fmt_rate, ChunkThroughput};

/// Use of the intermediate ephemeris database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntermediateDbMode {
    /// Scan the ephemeris file for every chunk.
    Disabled,
    /// Build the database at this path before the loop (replacing any existing file).
    Build(Utf8PathBuf),
    /// Reuse a database built by an earlier run.
    Reuse(Utf8PathBuf),
}

/// Input files of a run.
#[derive(Debug, Clone)]
pub struct InputFiles {
    /// Physical parameters catalog.
    pub params: Utf8PathBuf,
    pub orbit: Utf8PathBuf,
    /// Ephemeris (detections) file.
    pub ephemeris: Utf8PathBuf,
    /// Cometary parameters catalog, comet runs only.
    pub comet: Option<Utf8PathBuf>,
    pub intermediate_db: IntermediateDbMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ReadingSources,
    Validating,
    Joining,
    Matching,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Idle => "idle",
            PipelineState::ReadingSources => "reading sources",
            PipelineState::Validating => "validating",
            PipelineState::Joining => "joining",
            PipelineState::Matching => "matching pointings",
            PipelineState::Writing => "writing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        })
    }
}

fn fmt_chunk(chunk: &Option<ChunkCursor>) -> String {
    chunk
        .map(|c| format!(" on rows {c}"))
        .unwrap_or_default()
}

/// A fatal run error, with the state and chunk in which it occurred.
#[derive(Error, Debug)]
#[error("run failed while {state}{}: {source}", fmt_chunk(.chunk))]
pub struct PipelineError {
    pub state: PipelineState,
    pub chunk: Option<ChunkCursor>,
    #[source]
    pub source: SurveyJoinError,
}

/// Counters of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks: usize,
    pub object_rows: usize,
    pub ephemeris_rows: usize,
    pub dropped_by_join: usize,
    pub dropped_by_pointing: usize,
    pub rows_written: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![Cell::new("Counter"), Cell::new("Value")]);
        for (label, value) in [
            ("Chunks processed", self.chunks),
            ("Object rows read", self.object_rows),
            ("Ephemeris rows read", self.ephemeris_rows),
            ("Rows dropped by join", self.dropped_by_join),
            ("Rows dropped by pointing match", self.dropped_by_pointing),
            ("Rows written", self.rows_written),
        ] {
            table.add_row(Row::from(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]));
        }
        write!(f, "{table}")
    }
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    inputs: &'a InputFiles,
    state: PipelineState,
}

struct ChunkResources<'r> {
    ephemeris: &'r EphemerisSource,
    pointing: &'r PointingTable,
    sink: &'r mut OutputSink,
}

impl<'a> Pipeline<'a> {
    /// Prepare a run; a comet run requires a cometary parameters file.
    pub fn new(config: &'a PipelineConfig, inputs: &'a InputFiles) -> Result<Self, PipelineError> {
        if config.object_type == ObjectType::Comet && inputs.comet.is_none() {
            return Err(PipelineError {
                state: PipelineState::Idle,
                chunk: None,
                source: SurveyJoinError::InvalidConfig(
                    "objecttype is comet but no cometary parameters file was given".into(),
                ),
            });
        }
        Ok(Pipeline {
            config,
            inputs,
            state: PipelineState::Idle,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn fail(&mut self, chunk: Option<ChunkCursor>, source: SurveyJoinError) -> PipelineError {
        let err = PipelineError {
            state: self.state,
            chunk,
            source,
        };
        self.state = PipelineState::Failed;
        err
    }

    /// Run the chunk loop to completion.
    ///
    /// Arguments
    /// -----------------
    /// * `ctx` – Run context: every log line of the run is emitted under its span and
    ///   the diagnostics of every stage are recorded in it.
    ///
    /// Return
    /// ----------
    /// * The [`RunSummary`] of the run, or the first [`PipelineError`].
    pub fn run(&mut self, ctx: &mut RunContext) -> Result<RunSummary, PipelineError> {
        let run_span = ctx.span().clone();
        let _run = run_span.enter();

        self.state = PipelineState::ReadingSources;
        let (total_rows, ephemeris, pointing) = self.prepare(ctx).map_err(|e| self.fail(None, e))?;
        let mut sink = OutputSink::from_config(&self.config.sink);
        info!(
            objects = total_rows,
            chunk_size = self.config.chunk_size,
            target = %sink.target(),
            "starting chunk loop"
        );

        #[cfg(feature = "progress")]
        let (pb, mut throughput) = (
            chunk_progress_bar(total_rows.div_ceil(self.config.chunk_size) as u64),
            ChunkThroughput::new(),
        );

        let mut summary = RunSummary::default();
        let mut cursor = ChunkCursor::new(0, self.config.chunk_size);
        while !cursor.is_exhausted(total_rows) {
            let chunk_span = ctx.begin_chunk(cursor);
            let _chunk = chunk_span.enter();

            #[cfg(feature = "progress")]
            let rows_before = summary.ephemeris_rows;
            let mut resources = ChunkResources {
                ephemeris: &ephemeris,
                pointing: &pointing,
                sink: &mut sink,
            };
            self.process_chunk(ctx, cursor, &mut resources, &mut summary)
                .map_err(|e| self.fail(Some(cursor), e))?;
            ctx.end_chunk();

            #[cfg(feature = "progress")]
            {
                let last = throughput.finish_chunk(summary.ephemeris_rows - rows_before);
                pb.set_message(format!("last: {}, run: {}", fmt_rate(last), fmt_rate(throughput.overall())));
                pb.inc(1);
            }

            cursor.advance();
        }

        #[cfg(feature = "progress")]
        pb.finish_and_clear();

        self.state = PipelineState::Validating;
        let tail = ChunkCursor::new(total_rows, self.config.chunk_size);
        self.check_no_trailing_objects(tail)
            .map_err(|e| self.fail(Some(tail), e))?;

        self.state = PipelineState::Done;
        info!(
            chunks = summary.chunks,
            rows_written = summary.rows_written,
            "post processing completed"
        );
        Ok(summary)
    }

    /// Count the objects, load the pointings and set up the ephemeris source.
    fn prepare(
        &self,
        ctx: &mut RunContext,
    ) -> Result<(usize, EphemerisSource, PointingTable), SurveyJoinError> {
        let config = self.config;
        let total_rows = count_data_rows(&self.inputs.orbit, config.aux_separator)?;

        let pointing = PointingTable::load(
            &config.pointing_database,
            &config.pointing_query,
            &config.observing_filters,
        )?;

        let ephemeris = match &self.inputs.intermediate_db {
            IntermediateDbMode::Disabled => {
                EphemerisSource::direct_file(self.inputs.ephemeris.clone(), config.pointing_separator)
            }
            IntermediateDbMode::Build(path) => {
                info!(path = %path, "building intermediate ephemeris database");
                EphemerisSource::IntermediateDatabase(IntermediateDatabase::build(
                    ctx,
                    &self.inputs.ephemeris,
                    path,
                    config.pointing_separator,
                )?)
            }
            IntermediateDbMode::Reuse(path) => {
                info!(path = %path, "reusing intermediate ephemeris database");
                EphemerisSource::IntermediateDatabase(IntermediateDatabase::open(path)?)
            }
        };
        Ok((total_rows, ephemeris, pointing))
    }

    /// Per-object catalogs longer than the orbit catalog would otherwise be silently cut
    /// at the last orbit row.
    fn check_no_trailing_objects(&self, tail: ChunkCursor) -> Result<(), SurveyJoinError> {
        let config = self.config;
        let inputs = self.inputs;
        let physical = read_physical_parameters(&inputs.params, tail, config.aux_separator, &config.other_colours)?;
        let mut trailing = vec![("physical parameters", physical)];
        if let (ObjectType::Comet, Some(path)) = (config.object_type, &inputs.comet) {
            trailing.push(("cometary parameters", read_cometary(path, tail, config.aux_separator)?));
        }

        for (label, table) in trailing {
            if !table.is_empty() {
                return Err(SurveyJoinError::IdentityMismatch {
                    left: "orbit".into(),
                    right: label.into(),
                    only_left: Vec::new(),
                    only_right: table.obj_ids()?.into_iter().collect(),
                });
            }
        }
        Ok(())
    }

    fn process_chunk(
        &mut self,
        ctx: &mut RunContext,
        cursor: ChunkCursor,
        resources: &mut ChunkResources<'_>,
        summary: &mut RunSummary,
    ) -> Result<(), SurveyJoinError> {
        let config = self.config;
        let inputs = self.inputs;

        self.state = PipelineState::ReadingSources;
        info!("reading per-object catalogs");
        let orbit = read_orbits(&inputs.orbit, cursor, config.aux_separator)?;
        let physical = read_physical_parameters(&inputs.params, cursor, config.aux_separator, &config.other_colours)?;
        let cometary = match (config.object_type, &inputs.comet) {
            (ObjectType::Comet, Some(path)) => Some(read_cometary(path, cursor, config.aux_separator)?),
            _ => None,
        };
        ctx.record(Stage::ReadSources, DiagnosticKind::ObjectRowsRead, orbit.len(), &[]);

        self.state = PipelineState::Validating;
        let mut sources = vec![("orbit", &orbit), ("physical parameters", &physical)];
        if let Some(cometary) = &cometary {
            sources.push(("cometary parameters", cometary));
        }
        let objects = check_identical(&sources)?;
        let ephemeris = resources.ephemeris.fetch(ctx, &objects, cursor)?;
        check_subset(&ephemeris, &objects)?;
        let ephemeris_rows = ephemeris.len();

        self.state = PipelineState::Joining;
        let joined = join_observations(ctx, ephemeris, &physical, &orbit, cometary.as_ref())?;
        let joined_rows = joined.len();

        self.state = PipelineState::Matching;
        let observations = match_pointings(ctx, joined, resources.pointing, &config.observing_filters)?;

        self.state = PipelineState::Writing;
        let written = resources.sink.write(ctx, &observations, cursor.index())?;
        info!(
            objects = objects.len(),
            ephemeris_rows,
            written,
            "chunk processed"
        );

        summary.chunks += 1;
        summary.object_rows += orbit.len();
        summary.ephemeris_rows += ephemeris_rows;
        summary.dropped_by_join += ephemeris_rows - joined_rows;
        summary.dropped_by_pointing += joined_rows - observations.len();
        summary.rows_written += written;
        Ok(())
    }
}
