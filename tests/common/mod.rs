#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{params, Connection};
use surveyjoin::prelude::*;
use tempfile::TempDir;

pub const POINTING_QUERY: &str = "SELECT observationId, observationStartMJD, filter, seeingFwhmGeom, \
     fiveSigmaDepth, fieldRA, fieldDec FROM SummaryAllProps ORDER BY observationId";

/// Filter of each test pointing, `894816 + i`.
pub const FIELD_FILTERS: [&str; 10] = ["r", "g", "i", "z", "u", "y", "r", "g", "i", "z"];
pub const FIRST_FIELD: i64 = 894816;

pub fn data(name: &str) -> Utf8PathBuf {
    Utf8Path::new("tests/data").join(name)
}

pub fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

/// Pointing database with one pointing per `(observationId, filter)`.
pub fn make_pointing_db(path: &Utf8Path, pointings: &[(i64, &str)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE SummaryAllProps (observationId INTEGER, observationStartMJD REAL, \
         filter TEXT, seeingFwhmGeom REAL, fiveSigmaDepth REAL, fieldRA REAL, fieldDec REAL)",
    )
    .unwrap();
    let mut stmt = conn
        .prepare("INSERT INTO SummaryAllProps VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)")
        .unwrap();
    for (k, (id, filter)) in pointings.iter().enumerate() {
        stmt.execute(params![
            id,
            60000.0 + 0.01 * k as f64,
            filter,
            0.8,
            24.2,
            150.0 + k as f64,
            -10.0
        ])
        .unwrap();
    }
}

pub fn survey_pointings() -> Vec<(i64, &'static str)> {
    FIELD_FILTERS
        .iter()
        .enumerate()
        .map(|(i, f)| (FIRST_FIELD + i as i64, *f))
        .collect()
}

/// A temporary run layout: pointing database and output directory.
pub struct RunDir {
    pub dir: TempDir,
    pub pointing_db: Utf8PathBuf,
    pub out: Utf8PathBuf,
}

impl RunDir {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = utf8_dir(&dir);
        let pointing_db = root.join("pointings.db");
        make_pointing_db(&pointing_db, &survey_pointings());
        let out = root.join("out");
        std::fs::create_dir_all(&out).unwrap();
        RunDir {
            dir,
            pointing_db,
            out,
        }
    }

    pub fn root(&self) -> Utf8PathBuf {
        utf8_dir(&self.dir)
    }

    pub fn config(&self, format: OutputFormat, chunk_size: i64) -> PipelineConfigBuilder {
        PipelineConfig::builder()
            .survey("LSST")
            .object_type(ObjectType::Asteroid)
            .pointing_separator(FieldSeparator::Whitespace)
            .aux_separator(FieldSeparator::Whitespace)
            .ephemerides_type("oif".parse().unwrap())
            .pointing_database(self.pointing_db.clone())
            .pointing_query(POINTING_QUERY)
            .observing_filters(vec!["r".into(), "g".into(), "i".into(), "z".into()])
            .other_colours(vec!["g-r".into(), "i-r".into(), "z-r".into()])
            .phase_function("HG")
            .camera_model(CameraModel::Circle)
            .fill_factor(0.9)
            .out_dir(self.out.clone())
            .file_stem("testout")
            .output_format(format)
            .chunk_size(chunk_size)
    }
}

pub fn asteroid_inputs(intermediate_db: IntermediateDbMode) -> InputFiles {
    InputFiles {
        params: data("testcolour.txt"),
        orbit: data("testorb.des"),
        ephemeris: data("oiftestoutput.txt"),
        comet: None,
        intermediate_db,
    }
}
