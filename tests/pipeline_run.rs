mod common;

use std::fs::{self, File};

use common::{asteroid_inputs, data, RunDir};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rusqlite::Connection;
use surveyjoin::prelude::*;

fn run(config: &PipelineConfig, inputs: &InputFiles) -> (Result<RunSummary, PipelineError>, RunContext) {
    let mut ctx = RunContext::new("test");
    let mut pipeline = Pipeline::new(config, inputs).unwrap();
    let outcome = pipeline.run(&mut ctx);
    match &outcome {
        Ok(_) => assert_eq!(pipeline.state(), PipelineState::Done),
        Err(_) => assert_eq!(pipeline.state(), PipelineState::Failed),
    }
    (outcome, ctx)
}

fn read_csv(path: &camino::Utf8Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

fn stored_results(db: &camino::Utf8Path) -> Vec<(String, i64, f64)> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare("SELECT ObjID, FieldID, V FROM pp_results ORDER BY ObjID, FieldID, V")
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .map(Result::unwrap)
        .collect()
}

#[test]
fn test_ten_objects_csv_run() {
    let layout = RunDir::new();
    let config = layout.config(OutputFormat::Csv, 3).build().unwrap();
    let (outcome, ctx) = run(&config, &asteroid_inputs(IntermediateDbMode::Disabled));

    assert_eq!(
        outcome.unwrap(),
        RunSummary {
            chunks: 4,
            object_rows: 10,
            ephemeris_rows: 47,
            dropped_by_join: 0,
            dropped_by_pointing: 13,
            rows_written: 34,
        }
    );

    let diagnostics = ctx.diagnostics();
    assert_eq!(diagnostics.total(DiagnosticKind::ObjectRowsRead), 10);
    assert_eq!(diagnostics.total(DiagnosticKind::EphemerisRowsRead), 47);
    assert_eq!(diagnostics.total(DiagnosticKind::UnmatchedPointings), 4);
    assert_eq!(diagnostics.total(DiagnosticKind::FilteredOut), 9);
    assert_eq!(diagnostics.total(DiagnosticKind::UnmatchedJoinRows), 0);
    assert_eq!(diagnostics.total(DiagnosticKind::RowsWritten), 34);

    let (header, rows) = read_csv(&layout.out.join("testout.csv"));
    assert_eq!(header.len(), 26);
    assert_eq!(&header[..2], ["ObjID", "FieldID"]);
    assert!(header.contains(&"fiveSigmaDepth".to_string()));
    assert!(header.contains(&"H".to_string()));
    assert!(header.contains(&"argperi".to_string()));
    assert!(!header.contains(&"observationId".to_string()));
    assert_eq!(rows.len(), 34);

    let filter_col = header.iter().position(|c| c == "filter").unwrap();
    assert!(rows
        .iter()
        .all(|r| ["r", "g", "i", "z"].contains(&r[filter_col].as_str())));
    assert!(rows.iter().all(|r| r[1] != "999999"));
}

#[test]
fn test_output_does_not_depend_on_chunk_size() {
    let small = RunDir::new();
    let large = RunDir::new();
    let inputs = asteroid_inputs(IntermediateDbMode::Disabled);

    let config = small.config(OutputFormat::Sqlite, 3).build().unwrap();
    assert_eq!(run(&config, &inputs).0.unwrap().chunks, 4);
    let config = large.config(OutputFormat::Sqlite, 100).build().unwrap();
    assert_eq!(run(&config, &inputs).0.unwrap().chunks, 1);

    let a = stored_results(&small.out.join("testout.db"));
    let b = stored_results(&large.out.join("testout.db"));
    assert_eq!(a.len(), 34);
    assert_eq!(a, b);
}

#[test]
fn test_intermediate_database_matches_direct_read() {
    let direct = RunDir::new();
    let config = direct.config(OutputFormat::Csv, 4).build().unwrap();
    run(&config, &asteroid_inputs(IntermediateDbMode::Disabled))
        .0
        .unwrap();

    let stored = RunDir::new();
    let db = stored.root().join("data").join("interm.db");
    let config = stored.config(OutputFormat::Csv, 4).build().unwrap();
    run(&config, &asteroid_inputs(IntermediateDbMode::Build(db.clone())))
        .0
        .unwrap();
    assert!(db.is_file());

    let expected = fs::read_to_string(direct.out.join("testout.csv")).unwrap();
    assert_eq!(fs::read_to_string(stored.out.join("testout.csv")).unwrap(), expected);

    // Second run over the same database.
    fs::remove_file(stored.out.join("testout.csv")).unwrap();
    let (outcome, ctx) = run(&config, &asteroid_inputs(IntermediateDbMode::Reuse(db)));
    assert_eq!(outcome.unwrap().rows_written, 34);
    assert_eq!(ctx.diagnostics().total(DiagnosticKind::IntermediateRowsStored), 0);
    assert_eq!(fs::read_to_string(stored.out.join("testout.csv")).unwrap(), expected);
}

#[test]
fn test_per_object_files() {
    let layout = RunDir::new();
    let config = layout.config(OutputFormat::SeparatelyCsv, 3).build().unwrap();
    run(&config, &asteroid_inputs(IntermediateDbMode::Disabled))
        .0
        .unwrap();

    let expected = [
        ("S1000000a", 2),
        ("S1000001a", 3),
        ("S1000002a", 4),
        ("S1000003a", 5),
        ("S1000004a", 2),
        ("S1000005a", 3),
        ("S1000006a", 4),
        ("S1000007a", 5),
        ("S1000008a", 3),
        ("S1000009a", 3),
    ];
    for (id, count) in expected {
        let (_, rows) = read_csv(&layout.out.join(format!("{id}_testout.csv")));
        assert_eq!(rows.len(), count, "rows of {id}");
        assert!(rows.iter().all(|r| r[0] == id));
    }
}

#[test]
fn test_parquet_dataset_has_one_file_per_chunk() {
    let layout = RunDir::new();
    let config = layout.config(OutputFormat::Parquet, 3).build().unwrap();
    run(&config, &asteroid_inputs(IntermediateDbMode::Disabled))
        .0
        .unwrap();

    let dataset = layout.out.join("testout.parquet");
    let mut total = 0;
    for chunk in 0..4 {
        let file = File::open(dataset.join(format!("chunk_{chunk}.parquet"))).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        total += reader.map(|b| b.unwrap().num_rows()).sum::<usize>();
    }
    assert_eq!(total, 34);
}

#[test]
fn test_comet_run_adds_cometary_columns() {
    let layout = RunDir::new();
    let config = layout
        .config(OutputFormat::Csv, 10)
        .object_type(ObjectType::Comet)
        .build()
        .unwrap();

    let mut inputs = asteroid_inputs(IntermediateDbMode::Disabled);
    let err = Pipeline::new(&config, &inputs).err().unwrap();
    assert_eq!(err.state, PipelineState::Idle);
    assert!(matches!(err.source, SurveyJoinError::InvalidConfig(_)));

    inputs.comet = Some(data("testcomet.txt"));
    let summary = run(&config, &inputs).0.unwrap();
    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.rows_written, 34);

    let (header, _) = read_csv(&layout.out.join("testout.csv"));
    assert_eq!(header.len(), 28);
    assert!(header.contains(&"afrho1".to_string()));
    assert!(header.contains(&"k".to_string()));
}

#[test]
fn test_missing_object_id_aborts_the_run() {
    let layout = RunDir::new();
    let config = layout.config(OutputFormat::Csv, 3).build().unwrap();
    let mut inputs = asteroid_inputs(IntermediateDbMode::Disabled);
    inputs.params = data("testcolour_missing_id.txt");

    let err = run(&config, &inputs).0.unwrap_err();
    assert_eq!(err.state, PipelineState::ReadingSources);
    assert_eq!(err.chunk, Some(ChunkCursor::new(3, 3)));
    assert!(matches!(
        err.source,
        SurveyJoinError::MalformedInput { ref path, .. } if path.ends_with("testcolour_missing_id.txt")
    ));
}

#[test]
fn test_object_sets_must_agree() {
    let layout = RunDir::new();
    let config = layout.config(OutputFormat::Csv, 3).build().unwrap();
    let mut inputs = asteroid_inputs(IntermediateDbMode::Disabled);
    inputs.params = data("testcolour_subset.txt");

    let err = run(&config, &inputs).0.unwrap_err();
    assert_eq!(err.state, PipelineState::Validating);
    assert_eq!(err.chunk, Some(ChunkCursor::new(6, 3)));
    assert!(matches!(err.source, SurveyJoinError::IdentityMismatch { .. }));
    let ids = err.source.obj_ids();
    assert!(ids.contains(&"S1000007a"));
    assert!(ids.contains(&"S1000009a"));

    // The first two chunks were written before the failure.
    let (_, rows) = read_csv(&layout.out.join("testout.csv"));
    assert!(!rows.is_empty());
}

#[test]
fn test_renamed_object_id_column() {
    let layout = RunDir::new();
    let orbit = layout.root().join("renamed.des");
    let content = fs::read_to_string(data("testorb.des")).unwrap();
    fs::write(&orbit, content.replacen("ObjID", "ObjId", 1)).unwrap();

    let config = layout.config(OutputFormat::Csv, 10).build().unwrap();
    let mut inputs = asteroid_inputs(IntermediateDbMode::Disabled);
    inputs.orbit = orbit;

    let err = run(&config, &inputs).0.unwrap_err();
    assert_eq!(err.state, PipelineState::ReadingSources);
    assert!(matches!(err.source, SurveyJoinError::MalformedInput { .. }));
    let message = err.source.to_string();
    assert!(message.contains("ObjID"));
    assert!(message.contains("renamed.des"));
}

#[test]
fn test_extra_catalog_rows_past_the_orbit_file_abort_the_run() {
    let layout = RunDir::new();
    let params = layout.root().join("longer_colour.txt");
    let mut content = fs::read_to_string(data("testcolour.txt")).unwrap();
    content.push_str("S9999999a 18.00 0.55 -0.12 -0.18 0.15\n");
    fs::write(&params, content).unwrap();

    let mut inputs = asteroid_inputs(IntermediateDbMode::Disabled);
    inputs.params = params;

    // A full last chunk of orbits must not hide the extra object.
    for chunk_size in [10, 5] {
        let out = RunDir::new();
        let config = out.config(OutputFormat::Csv, chunk_size).build().unwrap();
        let err = run(&config, &inputs).0.unwrap_err();
        assert_eq!(err.state, PipelineState::Validating);
        assert_eq!(err.chunk, Some(ChunkCursor::new(10, chunk_size as usize)));
        assert!(matches!(err.source, SurveyJoinError::IdentityMismatch { .. }));
        assert_eq!(err.source.obj_ids(), vec!["S9999999a"]);
    }
}

#[test]
fn test_extra_cometary_rows_abort_the_run() {
    let layout = RunDir::new();
    let comet = layout.root().join("longer_comet.txt");
    let mut content = fs::read_to_string(data("testcomet.txt")).unwrap();
    content.push_str("S9999999a 1500 -3.35\n");
    fs::write(&comet, content).unwrap();

    let config = layout
        .config(OutputFormat::Csv, 10)
        .object_type(ObjectType::Comet)
        .build()
        .unwrap();
    let mut inputs = asteroid_inputs(IntermediateDbMode::Disabled);
    inputs.comet = Some(comet);

    let err = run(&config, &inputs).0.unwrap_err();
    assert_eq!(err.state, PipelineState::Validating);
    assert_eq!(err.source.obj_ids(), vec!["S9999999a"]);
}
