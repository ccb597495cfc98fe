//! SQLite sink: every chunk is appended to the `pp_results` table of `<out>/<stem>.db`.
//!
//! The database is opened on the first non-empty chunk. The table is created with the
//! columns of that chunk when missing; if it already exists its columns must match the
//! observations exactly, otherwise the write is refused.
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{params_from_iter, Connection};

use crate::{
    constants::RESULTS_TABLE,
    run_context::RunContext,
    sinks::SinkWriter,
    sql::{column_list, placeholders, quote_ident, table_columns},
    surveyjoin_errors::SurveyJoinError,
    table::Table,
};

#[derive(Debug)]
pub struct SqliteSink {
    path: Utf8PathBuf,
    conn: Option<Connection>,
}

impl SqliteSink {
    pub fn new(out_dir: &Utf8Path, stem: &str) -> Self {
        SqliteSink {
            path: out_dir.join(format!("{stem}.db")),
            conn: None,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn err(&self, e: impl ToString) -> SurveyJoinError {
        SurveyJoinError::sink(self.path.as_str(), e)
    }

    fn connection(&mut self, columns: &[String]) -> Result<&mut Connection, SurveyJoinError> {
        if self.conn.is_none() {
            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir).map_err(|e| self.err(e))?;
            }
            let conn = Connection::open(&self.path).map_err(|e| self.err(e))?;
            self.conn = Some(conn);
        }
        let conn = self.conn.as_mut().ok_or_else(|| {
            SurveyJoinError::sink(self.path.as_str(), "database connection unavailable")
        })?;

        let existing = table_columns(conn, RESULTS_TABLE)
            .map_err(|e| SurveyJoinError::sink(self.path.as_str(), e))?;
        if existing.is_empty() {
            conn.execute_batch(&format!(
                "CREATE TABLE {} ({});",
                quote_ident(RESULTS_TABLE),
                column_list(columns)
            ))
            .map_err(|e| SurveyJoinError::sink(self.path.as_str(), e))?;
        } else if existing != columns {
            return Err(SurveyJoinError::sink(
                self.path.as_str(),
                format!(
                    "{RESULTS_TABLE} has columns {existing:?}, the observations have {columns:?}"
                ),
            ));
        }
        Ok(conn)
    }
}

impl SinkWriter for SqliteSink {
    fn write(
        &mut self,
        _ctx: &mut RunContext,
        observations: &Table,
        _chunk_index: usize,
    ) -> Result<usize, SurveyJoinError> {
        if observations.is_empty() {
            return Ok(0);
        }
        let path = self.path.clone();
        let sink_err = |e: rusqlite::Error| SurveyJoinError::sink(path.as_str(), e);

        let conn = self.connection(observations.columns())?;
        let tx = conn.transaction().map_err(sink_err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote_ident(RESULTS_TABLE),
                    column_list(observations.columns()),
                    placeholders(observations.columns().len())
                ))
                .map_err(sink_err)?;
            for row in observations.rows() {
                stmt.execute(params_from_iter(row.iter())).map_err(sink_err)?;
            }
        }
        tx.commit().map_err(sink_err)?;
        Ok(observations.len())
    }
}
