//! # Chunked tabular readers
//!
//! Read a bounded slice of rows ("chunk") from a whitespace- or comma-delimited text
//! source into a [`Table`]. The same reader backs the orbit, physical-parameter and
//! cometary catalogs (see [`object_reader`]) and the flat ephemeris file (see
//! [`crate::ephemeris`]).
//!
//! Chunk semantics
//! -----------------
//! `start_row` is the number of **data** rows skipped after the header, so
//! `read_rows(path, 0, 10, sep)` returns the first ten data rows and
//! `read_rows(path, 10, 10, sep)` the next ten. At end of file the chunk is shorter
//! (possibly empty).
//!
//! Validation
//! -----------------
//! * Required columns (`ObjID` at least) must appear in the header, otherwise
//!   [`SurveyJoinError::MalformedInput`] names the missing column and the file.
//! * Rows with more fields than the header are rejected.
//! * Mandatory cells must not be null; the error lists the `ObjID`s of the offending
//!   rows so that the source catalog can be fixed.
//! * `ObjID` is always stored as text, whatever its spelling in the file.
//!
//! Modules
//! -----------------
//! * [`object_reader`] – per-object catalogs (orbits, physical parameters, comets).
//! * *(crate-private)* `delimited` – streaming record iterator shared by all readers.
use std::str::FromStr;

use camino::Utf8Path;

use crate::{
    constants::{ObjIdSet, OBJ_ID},
    surveyjoin_errors::SurveyJoinError,
    table::{Row, Table, Value},
};

pub(crate) mod delimited;
pub mod object_reader;

pub(crate) use delimited::DelimitedReader;

/// Field delimiting of a text source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSeparator {
    Whitespace,
    Comma,
}

impl FromStr for FieldSeparator {
    type Err = SurveyJoinError;

    /// Parse the configuration tags `whitespace`, `comma` and `csv`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "whitespace" => Ok(FieldSeparator::Whitespace),
            "comma" | "csv" => Ok(FieldSeparator::Comma),
            other => Err(SurveyJoinError::InvalidConfig(format!(
                "unknown field separator '{other}', expected whitespace, comma or csv"
            ))),
        }
    }
}

/// Which cells must be non-null in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Every cell of every row (per-object catalogs).
    AnyColumn,
    /// Only the required columns (ephemerides).
    RequiredColumns,
}

/// Description of a source used to validate what is read from it.
#[derive(Debug, Clone, Copy)]
pub struct SourceSchema<'a> {
    /// Human readable name of the source, used in error messages.
    pub label: &'a str,
    /// Columns that must be present in the header (in addition to `ObjID`).
    pub required_columns: &'a [&'a str],
    pub null_policy: NullPolicy,
    /// Reject a chunk in which the same `ObjID` appears twice.
    pub unique_obj_ids: bool,
}

impl SourceSchema<'_> {
    /// Generic source: `ObjID` required, every cell mandatory.
    pub const GENERIC: SourceSchema<'static> = SourceSchema {
        label: "table",
        required_columns: &[],
        null_policy: NullPolicy::AnyColumn,
        unique_obj_ids: false,
    };
}

/// Read rows `[start_row, start_row + chunk_size)` of a delimited source.
///
/// Arguments
/// -----------------
/// * `source` – Path to the delimited text file (header line first).
/// * `start_row` – Number of data rows to skip after the header.
/// * `chunk_size` – Maximum number of rows to return.
/// * `separator` – Field delimiting of the file.
///
/// Return
/// ----------
/// * The chunk as a [`Table`] with `ObjID` normalized to text, or a
///   [`SurveyJoinError::MalformedInput`] when `ObjID` is missing or a cell is null.
///
/// See also
/// ------------
/// * [`read_chunk`] – Same read with an explicit [`SourceSchema`].
/// * [`object_reader`] – Source-specific wrappers.
pub fn read_rows(
    source: &Utf8Path,
    start_row: usize,
    chunk_size: usize,
    separator: FieldSeparator,
) -> Result<Table, SurveyJoinError> {
    read_chunk(source, start_row, chunk_size, separator, &SourceSchema::GENERIC)
}

/// Read a chunk and validate it against `schema`.
pub fn read_chunk(
    source: &Utf8Path,
    start_row: usize,
    chunk_size: usize,
    separator: FieldSeparator,
    schema: &SourceSchema<'_>,
) -> Result<Table, SurveyJoinError> {
    let mut reader = DelimitedReader::open(source, separator)?;
    let mut table = Table::new(reader.header().to_vec());
    let required = required_indices(&table, source, schema)?;
    let obj_idx = required[0];

    let mut data_row = 0usize;
    for record in reader.by_ref().skip(start_row).take(chunk_size) {
        let row = parse_record(&record?, table.columns(), obj_idx, source, start_row + data_row)?;
        table.push_row(row);
        data_row += 1;
    }

    check_nulls(&table, source, schema, &required)?;
    if schema.unique_obj_ids {
        check_unique_ids(&table, source, obj_idx)?;
    }
    Ok(table)
}

/// Count the data rows (header excluded) of a delimited source.
pub fn count_data_rows(source: &Utf8Path, separator: FieldSeparator) -> Result<usize, SurveyJoinError> {
    let reader = DelimitedReader::open(source, separator)?;
    let mut n = 0usize;
    for record in reader {
        record?;
        n += 1;
    }
    Ok(n)
}

/// Resolve `ObjID` plus the schema's required columns, `ObjID` first.
pub(crate) fn required_indices(
    table: &Table,
    source: &Utf8Path,
    schema: &SourceSchema<'_>,
) -> Result<Vec<usize>, SurveyJoinError> {
    std::iter::once(OBJ_ID)
        .chain(schema.required_columns.iter().copied())
        .map(|name| {
            table.column_index(name).ok_or_else(|| {
                SurveyJoinError::malformed(
                    source.as_str(),
                    format!(
                        "cannot find {name} in the column headings of the {} file, check input and input format",
                        schema.label
                    ),
                )
            })
        })
        .collect()
}

/// Turn one raw record into a row aligned with `columns`.
///
/// Missing trailing fields become [`Value::Null`] (caught by the null check), extra
/// fields are an error.
pub(crate) fn parse_record(
    record: &[String],
    columns: &[String],
    obj_idx: usize,
    source: &Utf8Path,
    data_row: usize,
) -> Result<Row, SurveyJoinError> {
    if record.len() > columns.len() {
        return Err(SurveyJoinError::MalformedInput {
            path: source.to_string(),
            reason: format!(
                "data row {data_row} has {} fields but the header has {}",
                record.len(),
                columns.len()
            ),
            obj_ids: record.get(obj_idx).cloned().into_iter().collect(),
        });
    }
    Ok((0..columns.len())
        .map(|i| match record.get(i) {
            Some(token) if i == obj_idx => Value::parse_id(token),
            Some(token) => Value::parse(token),
            None => Value::Null,
        })
        .collect())
}

pub(crate) fn check_nulls(
    table: &Table,
    source: &Utf8Path,
    schema: &SourceSchema<'_>,
    required: &[usize],
) -> Result<(), SurveyJoinError> {
    let obj_idx = required[0];
    let offending: Vec<String> = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| match schema.null_policy {
            NullPolicy::AnyColumn => row.iter().any(Value::is_null),
            NullPolicy::RequiredColumns => required.iter().any(|&i| row[i].is_null()),
        })
        .map(|(i, row)| match &row[obj_idx] {
            Value::Null => format!("<missing ObjID in chunk row {i}>"),
            id => id.to_string(),
        })
        .collect();

    if offending.is_empty() {
        Ok(())
    } else {
        Err(SurveyJoinError::MalformedInput {
            path: source.to_string(),
            reason: format!("uninitialised values when reading the {} file", schema.label),
            obj_ids: offending,
        })
    }
}

fn check_unique_ids(table: &Table, source: &Utf8Path, obj_idx: usize) -> Result<(), SurveyJoinError> {
    let mut seen = ObjIdSet::new();
    let mut duplicates = ObjIdSet::new();
    for row in table.rows() {
        if let Some(id) = row[obj_idx].as_str() {
            if !seen.insert(id.to_string()) {
                duplicates.insert(id.to_string());
            }
        }
    }
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(SurveyJoinError::MalformedInput {
            path: source.to_string(),
            reason: "duplicate ObjID values within the chunk".into(),
            obj_ids: duplicates.into_iter().collect(),
        })
    }
}
