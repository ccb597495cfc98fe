//! # Ephemeris acquisition
//!
//! Obtain the simulated detections (ephemeris rows) of the objects of the current
//! chunk. Two sources are supported, selected once per run:
//!
//! * [`EphemerisSource::DirectFile`] – stream the flat ephemeris file and keep the
//!   rows whose `ObjID` is requested. Only the kept rows are materialized, so memory
//!   tracks the chunk, but the file is rescanned for every chunk.
//! * [`EphemerisSource::IntermediateDatabase`] – query the indexed SQLite copy of the
//!   file built once before the chunk loop (see [`interm_db`]).
//!
//! Both sources return the same [`Table`] for the same objects: same columns, same
//! values, file order.
//!
//! Memory
//! -----------------
//! Row buffers grow with [`Vec::try_reserve`]. An allocation failure is reported as
//! [`SurveyJoinError::ResourceExhaustion`] with the chunk bounds and a remediation
//! hint instead of aborting the process.
//!
//! Required columns
//! -----------------
//! `ObjID` and the pointing identifier `FieldID`; both must be non-null.
use std::{fmt, str::FromStr};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::{
    chunk::ChunkCursor,
    constants::{ObjIdSet, FIELD_ID},
    readers::{
        check_nulls, parse_record, required_indices, DelimitedReader, FieldSeparator, NullPolicy,
        SourceSchema,
    },
    run_context::{DiagnosticKind, RunContext, Stage},
    surveyjoin_errors::SurveyJoinError,
    table::{Row, Table},
};

pub mod interm_db;

use interm_db::IntermediateDatabase;

pub(crate) const EPHEMERIS_SCHEMA: SourceSchema<'static> = SourceSchema {
    label: "ephemeris",
    required_columns: &[FIELD_ID],
    null_policy: NullPolicy::RequiredColumns,
    unique_obj_ids: false,
};

const DIRECT_FILE_HINT: &str = "run with the intermediate database (-d) or reduce sizeSerialChunk";
const DATABASE_HINT: &str = "reduce sizeSerialChunk";

/// Format of the ephemeris file produced by the survey simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeridesType {
    /// Objects-in-field output.
    Oif,
}

impl FromStr for EphemeridesType {
    type Err = SurveyJoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "oif" | "OIF" => Ok(EphemeridesType::Oif),
            other => Err(SurveyJoinError::InvalidConfig(format!(
                "ephemerides_type '{other}' is not supported, expected oif"
            ))),
        }
    }
}

impl fmt::Display for EphemeridesType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EphemeridesType::Oif => f.write_str("oif"),
        }
    }
}

#[derive(Debug)]
pub enum EphemerisSource {
    DirectFile {
        path: Utf8PathBuf,
        separator: FieldSeparator,
    },
    IntermediateDatabase(IntermediateDatabase),
}

impl EphemerisSource {
    pub fn direct_file(path: impl Into<Utf8PathBuf>, separator: FieldSeparator) -> Self {
        EphemerisSource::DirectFile {
            path: path.into(),
            separator,
        }
    }

    /// Ephemeris rows of `object_ids`, in file order.
    ///
    /// Arguments
    /// -----------------
    /// * `ctx` – Run context receiving the row count diagnostic.
    /// * `object_ids` – Objects of the current chunk.
    /// * `chunk` – Bounds of the current chunk, reported on failure.
    ///
    /// Return
    /// ----------
    /// * The ephemeris [`Table`], possibly empty when no object was detected.
    pub fn fetch(
        &self,
        ctx: &mut RunContext,
        object_ids: &ObjIdSet,
        chunk: ChunkCursor,
    ) -> Result<Table, SurveyJoinError> {
        let table = match self {
            EphemerisSource::DirectFile { path, separator } => {
                read_filtered(path, *separator, Some(object_ids), chunk)?
            }
            EphemerisSource::IntermediateDatabase(db) => db.fetch(object_ids, chunk)?,
        };
        debug!(
            rows = table.len(),
            objects = object_ids.len(),
            source = self.label(),
            "ephemeris rows fetched"
        );
        ctx.record(Stage::Ephemeris, DiagnosticKind::EphemerisRowsRead, table.len(), &[]);
        Ok(table)
    }

    fn label(&self) -> &'static str {
        match self {
            EphemerisSource::DirectFile { .. } => "file",
            EphemerisSource::IntermediateDatabase(_) => "intermediate database",
        }
    }
}

/// Free-function form of [`EphemerisSource::fetch`].
pub fn get_ephemeris_for(
    ctx: &mut RunContext,
    object_ids: &ObjIdSet,
    chunk: ChunkCursor,
    source: &EphemerisSource,
) -> Result<Table, SurveyJoinError> {
    source.fetch(ctx, object_ids, chunk)
}

/// Read the whole ephemeris file.
pub fn read_ephemeris_file(path: &Utf8Path, separator: FieldSeparator) -> Result<Table, SurveyJoinError> {
    read_filtered(path, separator, None, ChunkCursor::new(0, 0))
}

fn read_filtered(
    path: &Utf8Path,
    separator: FieldSeparator,
    object_ids: Option<&ObjIdSet>,
    chunk: ChunkCursor,
) -> Result<Table, SurveyJoinError> {
    let mut reader = DelimitedReader::open(path, separator)?;
    let mut table = Table::new(reader.header().to_vec());
    let required = required_indices(&table, path, &EPHEMERIS_SCHEMA)?;
    let obj_idx = required[0];

    for (data_row, record) in reader.by_ref().enumerate() {
        let record = record?;
        if let Some(ids) = object_ids {
            match record.get(obj_idx) {
                Some(id) if ids.contains(id.trim()) => {}
                _ => continue,
            }
        }
        let row: Row = parse_record(&record, table.columns(), obj_idx, path, data_row)?;
        table.rows_mut().try_reserve(1).map_err(|_| SurveyJoinError::ResourceExhaustion {
            start_row: chunk.start_row,
            chunk_size: chunk.chunk_size,
            hint: DIRECT_FILE_HINT.into(),
        })?;
        table.push_row(row);
    }

    check_nulls(&table, path, &EPHEMERIS_SCHEMA, &required)?;
    Ok(table)
}

#[cfg(test)]
mod ephemeris_test {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::table::Value;

    const OIF: &str = "ObjID FieldID FieldMJD AstRange(km) V\n\
                       S1 894816 59853.98 1.2e8 19.6\n\
                       S2 894816 59853.98 2.3e8 20.1\n\
                       S1 894838 59853.99 1.2e8 19.7\n\
                       S3 897478 59855.02 3.1e8 21.0\n";

    fn write_oif(dir: &TempDir, content: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("oif.txt")).unwrap();
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        path
    }

    fn ids(v: &[&str]) -> ObjIdSet {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_direct_file_keeps_requested_objects_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write_oif(&dir, OIF);
        let source = EphemerisSource::direct_file(path, FieldSeparator::Whitespace);
        let mut ctx = RunContext::new("test");

        let t = source
            .fetch(&mut ctx, &ids(&["S1", "S3"]), ChunkCursor::new(0, 2))
            .unwrap();
        assert_eq!(t.len(), 3);
        let fields: Vec<_> = t.column_values("FieldID").unwrap().cloned().collect();
        assert_eq!(fields, vec![Value::Int(894816), Value::Int(894838), Value::Int(897478)]);
        assert_eq!(ctx.diagnostics().total(DiagnosticKind::EphemerisRowsRead), 3);

        let none = source
            .fetch(&mut ctx, &ids(&["S9"]), ChunkCursor::new(2, 2))
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(none.columns().len(), 5);
    }

    #[test]
    fn test_field_id_is_required() {
        let dir = TempDir::new().unwrap();
        let path = write_oif(&dir, "ObjID FieldMJD\nS1 59853.98\n");
        let err = read_ephemeris_file(&path, FieldSeparator::Whitespace).unwrap_err();
        assert!(err.to_string().contains("FieldID"));
    }

    #[test]
    fn test_null_pointing_reports_object() {
        let dir = TempDir::new().unwrap();
        let path = write_oif(&dir, "ObjID,FieldID,V\nS1,1,19.0\nS2,,20.0\nS3,3,\n");
        // a null magnitude is allowed, a null pointing id is not
        let err = read_ephemeris_file(&path, FieldSeparator::Comma).unwrap_err();
        assert_eq!(err.obj_ids(), vec!["S2"]);
    }

    #[test]
    fn test_ephemerides_type_tags() {
        assert_eq!("oif".parse::<EphemeridesType>().unwrap(), EphemeridesType::Oif);
        assert!("sso".parse::<EphemeridesType>().is_err());
    }
}
