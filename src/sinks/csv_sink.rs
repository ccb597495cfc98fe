//! Delimited-text sinks: one CSV for the whole run, or one CSV per object.
//!
//! Files are opened in append mode for every chunk; the header line is written only
//! when the file is new or empty, so several chunks (or several runs) accumulate in
//! the same file.
use std::fs::{self, OpenOptions};

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;

use crate::{
    constants::{FastHashMap, OBJ_ID},
    run_context::RunContext,
    sinks::SinkWriter,
    surveyjoin_errors::SurveyJoinError,
    table::{Row, Table},
};

/// Append `rows` to the CSV file at `path`, writing `columns` first if the file is empty.
fn append_csv<'a>(
    path: &Utf8Path,
    columns: &[String],
    rows: impl Iterator<Item = &'a Row>,
) -> Result<usize, SurveyJoinError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SurveyJoinError::sink(path.as_str(), e))?;
    let needs_header = file
        .metadata()
        .map_err(|e| SurveyJoinError::sink(path.as_str(), e))?
        .len()
        == 0;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer
            .write_record(columns)
            .map_err(|e| SurveyJoinError::sink(path.as_str(), e))?;
    }
    let mut written = 0usize;
    for row in rows {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| SurveyJoinError::sink(path.as_str(), e))?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|e| SurveyJoinError::sink(path.as_str(), e))?;
    Ok(written)
}

fn ensure_dir(dir: &Utf8Path) -> Result<(), SurveyJoinError> {
    fs::create_dir_all(dir).map_err(|e| SurveyJoinError::sink(dir.as_str(), e))
}

/// Single CSV file `<out>/<stem>.csv`.
#[derive(Debug)]
pub struct CsvSink {
    path: Utf8PathBuf,
    columns: Option<Vec<String>>,
}

impl CsvSink {
    pub fn new(out_dir: &Utf8Path, stem: &str) -> Self {
        CsvSink {
            path: out_dir.join(format!("{stem}.csv")),
            columns: None,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl SinkWriter for CsvSink {
    fn write(
        &mut self,
        _ctx: &mut RunContext,
        observations: &Table,
        _chunk_index: usize,
    ) -> Result<usize, SurveyJoinError> {
        if observations.is_empty() {
            return Ok(0);
        }
        match &self.columns {
            Some(columns) if columns.as_slice() != observations.columns() => {
                return Err(SurveyJoinError::sink(
                    self.path.as_str(),
                    "column layout differs from the previous chunks",
                ));
            }
            Some(_) => {}
            None => self.columns = Some(observations.columns().to_vec()),
        }
        if let Some(dir) = self.path.parent() {
            ensure_dir(dir)?;
        }
        append_csv(&self.path, observations.columns(), observations.rows().iter())
    }
}

/// One CSV file per object, `<out>/<ObjID>_<stem>.csv`.
#[derive(Debug)]
pub struct PerObjectCsvSink {
    dir: Utf8PathBuf,
    stem: String,
}

impl PerObjectCsvSink {
    pub fn new(out_dir: &Utf8Path, stem: &str) -> Self {
        PerObjectCsvSink {
            dir: out_dir.to_path_buf(),
            stem: stem.to_string(),
        }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// File receiving the rows of `obj_id`.
    ///
    /// Identifiers holding a path separator or a NUL byte would name a file outside the
    /// output directory and are rejected with [`SurveyJoinError::SinkWrite`].
    pub fn object_path(&self, obj_id: &str) -> Result<Utf8PathBuf, SurveyJoinError> {
        if obj_id.is_empty() || obj_id.contains(['/', '\\', '\0']) {
            return Err(SurveyJoinError::sink(
                self.dir.as_str(),
                format!("ObjID {obj_id:?} cannot be used in a file name"),
            ));
        }
        Ok(self.dir.join(format!("{obj_id}_{}.csv", self.stem)))
    }
}

impl SinkWriter for PerObjectCsvSink {
    fn write(
        &mut self,
        _ctx: &mut RunContext,
        observations: &Table,
        _chunk_index: usize,
    ) -> Result<usize, SurveyJoinError> {
        if observations.is_empty() {
            return Ok(0);
        }
        let obj_col = observations
            .column_index(OBJ_ID)
            .ok_or_else(|| SurveyJoinError::sink(self.dir.as_str(), "observations have no ObjID column"))?;
        ensure_dir(&self.dir)?;

        let mut groups: FastHashMap<String, Vec<&Row>> = FastHashMap::default();
        for row in observations.rows() {
            let id = row[obj_col].to_string();
            groups.entry(id).or_default().push(row);
        }

        let targets = groups
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(id, rows)| Ok((self.object_path(&id)?, rows)))
            .collect::<Result<Vec<_>, SurveyJoinError>>()?;

        let mut written = 0usize;
        for (path, rows) in targets {
            written += append_csv(&path, observations.columns(), rows.into_iter())?;
        }
        Ok(written)
    }
}
