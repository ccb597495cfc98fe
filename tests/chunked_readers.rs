mod common;

use common::data;
use surveyjoin::{
    ephemeris::read_ephemeris_file,
    readers::{
        count_data_rows,
        object_reader::{read_cometary, read_orbits, read_physical_parameters},
    },
    prelude::*,
};

fn colours() -> Vec<String> {
    vec!["g-r".into(), "i-r".into(), "z-r".into()]
}

#[test]
fn test_chunks_cover_the_catalog_once() {
    let orbit = data("testorb.des");
    let total = count_data_rows(&orbit, FieldSeparator::Whitespace).unwrap();
    assert_eq!(total, 10);

    let mut ids = Vec::new();
    let mut cursor = ChunkCursor::new(0, 4);
    while !cursor.is_exhausted(total) {
        let chunk = read_orbits(&orbit, cursor, FieldSeparator::Whitespace).unwrap();
        assert!(chunk.len() <= 4);
        ids.extend(chunk.distinct_obj_ids().unwrap());
        cursor.advance();
    }
    let expected: Vec<String> = (0..10).map(|i| format!("S100000{i}a")).collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_input_object_ids_are_consistent() {
    let cursor = ChunkCursor::new(0, 10);
    let orbit = read_orbits(&data("testorb.des"), cursor, FieldSeparator::Whitespace).unwrap();
    let physical =
        read_physical_parameters(&data("testcolour.txt"), cursor, FieldSeparator::Whitespace, &colours())
            .unwrap();
    let cometary = read_cometary(&data("testcomet.txt"), cursor, FieldSeparator::Whitespace).unwrap();
    let ephemeris = read_ephemeris_file(&data("oiftestoutput.txt"), FieldSeparator::Whitespace).unwrap();

    let objects = check_consistency(&orbit, &physical, Some(&cometary), &ephemeris).unwrap();
    assert_eq!(objects.len(), 10);
}

#[test]
fn test_missing_colour_column() {
    let cursor = ChunkCursor::new(0, 10);
    let err = read_physical_parameters(
        &data("testcolour.txt"),
        cursor,
        FieldSeparator::Whitespace,
        &["u-r".to_string()],
    )
    .unwrap_err();
    assert!(err.to_string().contains("u-r"));
}

#[test]
fn test_generic_rows_keep_file_values() {
    let table = read_rows(&data("testcolour.txt"), 2, 2, FieldSeparator::Whitespace).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows()[0][0], Value::from("S1000002a"));
    assert_eq!(table.rows()[1][1], Value::Float(15.9));
}

#[test]
fn test_unknown_ephemeris_object_is_rejected() {
    let cursor = ChunkCursor::new(0, 10);
    let orbit = read_orbits(&data("testorb.des"), cursor, FieldSeparator::Whitespace).unwrap();
    let physical =
        read_physical_parameters(&data("testcolour.txt"), cursor, FieldSeparator::Whitespace, &colours())
            .unwrap();
    let mut ephemeris = read_ephemeris_file(&data("oiftestoutput.txt"), FieldSeparator::Whitespace).unwrap();
    let mut intruder = ephemeris.rows()[0].clone();
    intruder[0] = Value::from("S9999999a");
    ephemeris.push_row(intruder);

    let err = check_consistency(&orbit, &physical, None, &ephemeris).unwrap_err();
    assert!(matches!(err, SurveyJoinError::IdentityMismatch { .. }));
    assert_eq!(err.obj_ids(), ["S9999999a"]);
}
