//! # surveyjoin
//!
//! Chunked post-processing of survey-simulation output: per-object catalogs
//! (orbits, physical parameters, cometary activity) are read one chunk at a
//! time, cross-validated on `ObjID`, joined with the simulated detections
//! (read from the flat ephemeris file or from an intermediate SQLite store),
//! matched against the survey pointing database and streamed to a sink.
//!
//! Modules
//! -----------------
//! * [`readers`] – chunked delimited-text readers for the per-object sources.
//! * [`identity`] – `ObjID` set consistency checks between sources.
//! * [`ephemeris`] – ephemeris acquisition (direct file or intermediate database).
//! * [`join`] – `ObjID` inner joins of detections with per-object tables.
//! * [`pointing`] – pointing-database load and observation/pointing matching.
//! * [`sinks`] – output sinks (CSV, per-object CSV, SQLite, Parquet dataset).
//! * [`pipeline`] – the chunk-loop driver and its state machine.
//! * [`config`] – typed, validated configuration.
//! * [`run_context`] – run-scoped tracing span and structured diagnostics.
//!
//! Quick-Start
//! -----------------
//! ```rust,no_run
//! use camino::Utf8PathBuf;
//! use surveyjoin::prelude::*;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let raw = RawConfig::from_json_file("config.json")?;
//! let config = PipelineConfig::from_raw(&raw, "LSST")?;
//! let inputs = InputFiles {
//!     params: Utf8PathBuf::from("params.txt"),
//!     orbit: Utf8PathBuf::from("orbits.des"),
//!     ephemeris: Utf8PathBuf::from("oif.txt"),
//!     comet: None,
//!     intermediate_db: IntermediateDbMode::Disabled,
//! };
//!
//! let mut ctx = RunContext::new("example");
//! let summary = Pipeline::new(&config, &inputs)?.run(&mut ctx)?;
//! println!("{summary}");
//! # Ok(()) }
//! ```
pub mod chunk;
pub mod config;
pub mod constants;
pub mod ephemeris;
pub mod identity;
pub mod join;
pub mod pipeline;
pub mod pointing;
pub mod readers;
pub mod run_context;
pub mod sinks;
pub(crate) mod sql;
pub mod surveyjoin_errors;
pub mod table;

#[cfg(feature = "progress")]
pub(crate) mod progress_bar;

pub use crate::chunk::ChunkCursor;
pub use crate::constants::{ObjId, ObjIdSet};
pub use crate::surveyjoin_errors::SurveyJoinError;
pub use crate::table::{Row, Table, Value};

pub mod prelude {
    pub use crate::chunk::ChunkCursor;
    pub use crate::config::{
        CameraModel, ObjectType, PipelineConfig, PipelineConfigBuilder, RawConfig, SspParams,
    };
    pub use crate::ephemeris::{
        get_ephemeris_for, interm_db::IntermediateDatabase, EphemerisSource,
    };
    pub use crate::identity::{check_consistency, check_identical, check_subset};
    pub use crate::join::join_observations;
    pub use crate::pipeline::{
        InputFiles, IntermediateDbMode, Pipeline, PipelineError, PipelineState, RunSummary,
    };
    pub use crate::pointing::{match_pointings, PointingTable};
    pub use crate::readers::{read_rows, FieldSeparator};
    pub use crate::run_context::{DiagnosticKind, RunContext, Stage};
    pub use crate::sinks::{OutputFormat, OutputSink, SinkConfig, SinkWriter};
    pub use crate::surveyjoin_errors::SurveyJoinError;
    pub use crate::table::{Table, Value};
}
