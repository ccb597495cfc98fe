//! # Per-object catalog readers
//!
//! Thin wrappers over [`read_chunk`](super::read_chunk) for the three per-object sources
//! of a run. Each one carries its own [`SourceSchema`]: the required columns, the label
//! used in error messages, and the rule that an `ObjID` appears at most once per chunk.
//!
//! | Source | Required columns |
//! |---|---|
//! | orbits | `ObjID` |
//! | physical parameters | `ObjID`, `H`, every configured colour offset (`u-r`, …) |
//! | cometary parameters | `ObjID` |
use camino::Utf8Path;

use crate::{
    chunk::ChunkCursor,
    constants::ABSOLUTE_MAGNITUDE,
    readers::{read_chunk, FieldSeparator, NullPolicy, SourceSchema},
    surveyjoin_errors::SurveyJoinError,
    table::Table,
};

fn per_object_schema<'a>(label: &'a str, required: &'a [&'a str]) -> SourceSchema<'a> {
    SourceSchema {
        label,
        required_columns: required,
        null_policy: NullPolicy::AnyColumn,
        unique_obj_ids: true,
    }
}

/// Read one chunk of the orbit catalog.
pub fn read_orbits(
    path: &Utf8Path,
    chunk: ChunkCursor,
    separator: FieldSeparator,
) -> Result<Table, SurveyJoinError> {
    read_chunk(
        path,
        chunk.start_row,
        chunk.chunk_size,
        separator,
        &per_object_schema("orbit", &[]),
    )
}

/// Read one chunk of the physical-parameter catalog.
///
/// Arguments
/// -----------------
/// * `other_colours` – Colour offsets declared in the configuration (e.g. `u-r`, `g-r`);
///   each must be a column of the file.
pub fn read_physical_parameters(
    path: &Utf8Path,
    chunk: ChunkCursor,
    separator: FieldSeparator,
    other_colours: &[String],
) -> Result<Table, SurveyJoinError> {
    let required: Vec<&str> = std::iter::once(ABSOLUTE_MAGNITUDE)
        .chain(other_colours.iter().map(String::as_str))
        .collect();
    read_chunk(
        path,
        chunk.start_row,
        chunk.chunk_size,
        separator,
        &per_object_schema("physical parameters", &required),
    )
}

/// Read one chunk of the cometary-activity catalog.
pub fn read_cometary(
    path: &Utf8Path,
    chunk: ChunkCursor,
    separator: FieldSeparator,
) -> Result<Table, SurveyJoinError> {
    read_chunk(
        path,
        chunk.start_row,
        chunk.chunk_size,
        separator,
        &per_object_schema("cometary parameters", &[]),
    )
}

#[cfg(test)]
mod object_reader_test {
    use std::io::Write;

    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    use super::*;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn test_physical_parameters_require_colours() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "colour.txt", "ObjID H u-r g-r\nA 7.2 1.7 0.5\n");

        let colours = vec!["u-r".to_string(), "g-r".to_string()];
        let t = read_physical_parameters(&path, ChunkCursor::new(0, 10), FieldSeparator::Whitespace, &colours)
            .unwrap();
        assert_eq!(t.len(), 1);

        let missing = vec!["i-r".to_string()];
        let err = read_physical_parameters(&path, ChunkCursor::new(0, 10), FieldSeparator::Whitespace, &missing)
            .unwrap_err();
        assert!(err.to_string().contains("i-r"));
        assert!(err.to_string().contains("physical parameters"));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "orb.des", "ObjID q e\nA 1.0 0.1\nB 2.0 0.2\nA 1.5 0.3\n");

        let err = read_orbits(&path, ChunkCursor::new(0, 10), FieldSeparator::Whitespace).unwrap_err();
        assert_eq!(err.obj_ids(), vec!["A"]);

        // the duplicate falls outside the first chunk
        assert_eq!(
            read_orbits(&path, ChunkCursor::new(0, 2), FieldSeparator::Whitespace)
                .unwrap()
                .len(),
            2
        );
    }
}
