//! # Output sinks
//!
//! The finished observations of each chunk are handed to one [`OutputSink`], chosen
//! once from the configuration. Callers only build the sink
//! ([`OutputSink::from_config`]) and call [`SinkWriter::write`] once per chunk; adding a
//! format means adding a variant here, never touching the pipeline.
//!
//! | Format tag | Variant | Target |
//! |---|---|---|
//! | `csv` | [`OutputSink::Csv`] | `<out>/<stem>.csv`, header written once |
//! | `separatelyCSV` | [`OutputSink::PerObjectCsv`] | `<out>/<ObjID>_<stem>.csv`, one file per object |
//! | `sqlite3` | [`OutputSink::Sqlite`] | `<out>/<stem>.db`, table `pp_results` |
//! | `parquet` (`hdf5`, `h5`) | [`OutputSink::Columnar`] | `<out>/<stem>.parquet/chunk_<index>.parquet` |
//!
//! Contract
//! -----------------
//! * Every sink appends: no chunk ever truncates the output of a previous chunk.
//! * An empty chunk writes nothing and creates no file.
//! * Every failure is a [`SurveyJoinError::SinkWrite`] naming the target path.
use std::{fmt, str::FromStr};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::{
    run_context::{DiagnosticKind, RunContext, Stage},
    surveyjoin_errors::SurveyJoinError,
    table::Table,
};

pub mod csv_sink;
pub mod parquet_sink;
pub mod sqlite_sink;

pub use csv_sink::{CsvSink, PerObjectCsvSink};
pub use parquet_sink::ParquetSink;
pub use sqlite_sink::SqliteSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    SeparatelyCsv,
    Sqlite,
    /// Chunk-indexed Parquet dataset; also selected by the legacy HDF5 tags.
    Parquet,
}

impl FromStr for OutputFormat {
    type Err = SurveyJoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "csv" => Ok(OutputFormat::Csv),
            "separatelyCSV" | "separatelyCsv" | "separatelycsv" => Ok(OutputFormat::SeparatelyCsv),
            "sqlite3" => Ok(OutputFormat::Sqlite),
            "parquet" | "hdf5" | "HDF5" | "h5" => Ok(OutputFormat::Parquet),
            other => Err(SurveyJoinError::InvalidConfig(format!(
                "output format '{other}' is not recognised, expected csv, separatelyCSV, sqlite3, parquet or hdf5"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::SeparatelyCsv => "separatelyCSV",
            OutputFormat::Sqlite => "sqlite3",
            OutputFormat::Parquet => "parquet",
        })
    }
}

/// Where and how the observations are written.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub out_dir: Utf8PathBuf,
    pub file_stem: String,
    pub format: OutputFormat,
}

/// Uniform write capability of every sink.
pub trait SinkWriter {
    /// Append the observations of chunk `chunk_index`, returning the number of rows written.
    fn write(
        &mut self,
        ctx: &mut RunContext,
        observations: &Table,
        chunk_index: usize,
    ) -> Result<usize, SurveyJoinError>;
}

#[derive(Debug)]
pub enum OutputSink {
    Csv(CsvSink),
    PerObjectCsv(PerObjectCsvSink),
    Sqlite(SqliteSink),
    Columnar(ParquetSink),
}

impl OutputSink {
    pub fn from_config(config: &SinkConfig) -> Self {
        let dir = config.out_dir.as_path();
        let stem = config.file_stem.as_str();
        match config.format {
            OutputFormat::Csv => OutputSink::Csv(CsvSink::new(dir, stem)),
            OutputFormat::SeparatelyCsv => OutputSink::PerObjectCsv(PerObjectCsvSink::new(dir, stem)),
            OutputFormat::Sqlite => OutputSink::Sqlite(SqliteSink::new(dir, stem)),
            OutputFormat::Parquet => OutputSink::Columnar(ParquetSink::new(dir, stem)),
        }
    }

    /// File or directory receiving the output.
    pub fn target(&self) -> &Utf8Path {
        match self {
            OutputSink::Csv(s) => s.path(),
            OutputSink::PerObjectCsv(s) => s.dir(),
            OutputSink::Sqlite(s) => s.path(),
            OutputSink::Columnar(s) => s.dir(),
        }
    }
}

impl SinkWriter for OutputSink {
    fn write(
        &mut self,
        ctx: &mut RunContext,
        observations: &Table,
        chunk_index: usize,
    ) -> Result<usize, SurveyJoinError> {
        if observations.is_empty() {
            debug!(chunk_index, "empty chunk, nothing written");
            return Ok(0);
        }
        let written = match self {
            OutputSink::Csv(s) => s.write(ctx, observations, chunk_index)?,
            OutputSink::PerObjectCsv(s) => s.write(ctx, observations, chunk_index)?,
            OutputSink::Sqlite(s) => s.write(ctx, observations, chunk_index)?,
            OutputSink::Columnar(s) => s.write(ctx, observations, chunk_index)?,
        };
        debug!(chunk_index, rows = written, target = %self.target(), "chunk written");
        ctx.record(Stage::Writing, DiagnosticKind::RowsWritten, written, &[]);
        Ok(written)
    }
}

#[cfg(test)]
mod sinks_test {
    use super::*;

    #[test]
    fn test_format_tags() {
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        for tag in ["separatelyCSV", "separatelyCsv", "separatelycsv"] {
            assert_eq!(tag.parse::<OutputFormat>().unwrap(), OutputFormat::SeparatelyCsv);
        }
        assert_eq!("sqlite3".parse::<OutputFormat>().unwrap(), OutputFormat::Sqlite);
        for tag in ["parquet", "hdf5", "HDF5", "h5"] {
            assert_eq!(tag.parse::<OutputFormat>().unwrap(), OutputFormat::Parquet);
        }
        assert!("xlsx".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_empty_chunk_creates_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let out_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut ctx = RunContext::new("test");

        for format in [
            OutputFormat::Csv,
            OutputFormat::SeparatelyCsv,
            OutputFormat::Sqlite,
            OutputFormat::Parquet,
        ] {
            let mut sink = OutputSink::from_config(&SinkConfig {
                out_dir: out_dir.clone(),
                file_stem: "out".into(),
                format,
            });
            let empty = Table::new(vec!["ObjID".into()]);
            assert_eq!(sink.write(&mut ctx, &empty, 0).unwrap(), 0);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
