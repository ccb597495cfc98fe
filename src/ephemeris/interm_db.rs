//! # Intermediate ephemeris database
//!
//! Materialize the flat ephemeris file as a single SQLite table (`interm`) indexed on
//! `ObjID`, so that every chunk of a run is served by an indexed lookup instead of a
//! full rescan of the file.
//!
//! Layout
//! -----------------
//! * One table named `interm` with exactly the columns of the file, in file order.
//! * Columns are declared without a type, so each cell keeps the storage class of the
//!   parsed value (`INTEGER`, `REAL`, `TEXT`, `NULL`) and reads back to the same
//!   [`Value`](crate::table::Value).
//! * Index `interm_objid` on `ObjID`, created after the bulk insert. Its presence marks
//!   a complete store.
//! * Rows are inserted in transactions of 10 000 rows; `rowid` keeps the file order.
//!
//! Round trip
//! -----------------
//! Reading every object back ([`IntermediateDatabase::read_all`]) yields the same
//! columns and rows as [`read_ephemeris_file`](super::read_ephemeris_file).
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use tracing::{info, warn};

use crate::{
    chunk::ChunkCursor,
    constants::{ObjIdSet, INTERM_INSERT_BATCH, INTERM_OBJID_INDEX, INTERM_TABLE, OBJ_ID, SQLITE_MAX_PARAMS},
    ephemeris::{DATABASE_HINT, EPHEMERIS_SCHEMA},
    readers::{parse_record, required_indices, DelimitedReader, FieldSeparator},
    run_context::{DiagnosticKind, RunContext, Stage},
    sql::{column_list, placeholders, quote_ident, query_table, table_columns},
    surveyjoin_errors::SurveyJoinError,
    table::{Row, Table, Value},
};

#[derive(Debug)]
pub struct IntermediateDatabase {
    path: Utf8PathBuf,
    conn: Connection,
    columns: Vec<String>,
}

impl IntermediateDatabase {
    /// Build the database at `db_path` from the flat ephemeris file.
    ///
    /// The table is filled in `<db_path>.tmp` and renamed over `db_path` only once the
    /// `ObjID` index exists, so a failed build never leaves a partial store behind
    /// (an existing database at `db_path` is kept as is). Missing parent directories
    /// are created.
    ///
    /// Arguments
    /// -----------------
    /// * `ctx` – Run context receiving the stored row count.
    /// * `ephemeris` – Flat ephemeris file.
    /// * `db_path` – Location of the SQLite file to create.
    /// * `separator` – Field delimiting of the ephemeris file.
    ///
    /// Return
    /// ----------
    /// * The opened database, or a [`SurveyJoinError::MalformedInput`] when the file
    ///   lacks `ObjID`/`FieldID` or holds a null identifier.
    pub fn build(
        ctx: &mut RunContext,
        ephemeris: &Utf8Path,
        db_path: &Utf8Path,
        separator: FieldSeparator,
    ) -> Result<Self, SurveyJoinError> {
        let mut reader = DelimitedReader::open(ephemeris, separator)?;
        let columns = reader.header().to_vec();
        let required = required_indices(&Table::new(columns.clone()), ephemeris, &EPHEMERIS_SCHEMA)?;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = Utf8PathBuf::from(format!("{db_path}.tmp"));
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let stored = match fill_store(&tmp_path, &mut reader, &columns, &required, ephemeris) {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&tmp_path) {
                    warn!(path = %tmp_path, "cannot remove the partial intermediate database: {rm}");
                }
                return Err(e);
            }
        };
        if db_path.exists() {
            info!(path = %db_path, "replacing stale intermediate database");
        }
        fs::rename(&tmp_path, db_path)?;

        info!(path = %db_path, rows = stored, "intermediate database built");
        ctx.record(Stage::IntermediateDb, DiagnosticKind::IntermediateRowsStored, stored, &[]);
        Self::open(db_path)
    }

    /// Reuse a pre-existing database built by an earlier run.
    ///
    /// The `interm` table must hold an `ObjID` column and carry the `interm_objid`
    /// index, which is only created at the end of a successful build.
    pub fn open(db_path: &Utf8Path) -> Result<Self, SurveyJoinError> {
        if !db_path.is_file() {
            return Err(SurveyJoinError::malformed(
                db_path.as_str(),
                "intermediate database not found",
            ));
        }
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let columns = table_columns(&conn, INTERM_TABLE)?;
        if columns.is_empty() {
            return Err(SurveyJoinError::malformed(
                db_path.as_str(),
                format!("no {INTERM_TABLE} table in the intermediate database"),
            ));
        }
        if !columns.iter().any(|c| c == OBJ_ID) {
            return Err(SurveyJoinError::malformed(
                db_path.as_str(),
                format!("cannot find {OBJ_ID} in the {INTERM_TABLE} table"),
            ));
        }
        let indexed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1 AND tbl_name = ?2",
            [INTERM_OBJID_INDEX, INTERM_TABLE],
            |r| r.get(0),
        )?;
        if indexed == 0 {
            return Err(SurveyJoinError::malformed(
                db_path.as_str(),
                format!("no {INTERM_OBJID_INDEX} index, the intermediate database is incomplete"),
            ));
        }
        Ok(IntermediateDatabase {
            path: db_path.to_path_buf(),
            conn,
            columns,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows of `object_ids`, in insertion (file) order.
    ///
    /// Identifiers are bound in batches of at most 900 parameters per query.
    pub fn fetch(&self, object_ids: &ObjIdSet, chunk: ChunkCursor) -> Result<Table, SurveyJoinError> {
        let ids: Vec<&String> = object_ids.iter().collect();
        let mut keyed: Vec<(i64, Row)> = Vec::new();

        for batch in ids.chunks(SQLITE_MAX_PARAMS) {
            let sql = format!(
                "SELECT rowid, {} FROM {} WHERE {} IN ({})",
                column_list(&self.columns),
                quote_ident(INTERM_TABLE),
                quote_ident(OBJ_ID),
                placeholders(batch.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(batch.iter()))?;
            while let Some(r) = rows.next()? {
                let rowid: i64 = r.get(0)?;
                let row = (1..=self.columns.len())
                    .map(|i| r.get::<_, Value>(i))
                    .collect::<Result<Row, _>>()?;
                keyed.try_reserve(1).map_err(|_| SurveyJoinError::ResourceExhaustion {
                    start_row: chunk.start_row,
                    chunk_size: chunk.chunk_size,
                    hint: DATABASE_HINT.into(),
                })?;
                keyed.push((rowid, row));
            }
        }

        keyed.sort_unstable_by_key(|(rowid, _)| *rowid);
        Table::with_rows(
            self.columns.clone(),
            keyed.into_iter().map(|(_, row)| row).collect(),
        )
    }

    /// Every stored row, in insertion order.
    pub fn read_all(&self) -> Result<Table, SurveyJoinError> {
        query_table(
            &self.conn,
            &format!(
                "SELECT {} FROM {} ORDER BY rowid",
                column_list(&self.columns),
                quote_ident(INTERM_TABLE)
            ),
            [],
        )
    }

    pub fn row_count(&self) -> Result<usize, SurveyJoinError> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(INTERM_TABLE)),
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

/// Create the `interm` table at `path`, insert every record of `reader` and index it.
fn fill_store(
    path: &Utf8Path,
    reader: &mut DelimitedReader,
    columns: &[String],
    required: &[usize],
    ephemeris: &Utf8Path,
) -> Result<usize, SurveyJoinError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({});",
        quote_ident(INTERM_TABLE),
        column_list(columns)
    ))?;
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(INTERM_TABLE),
        column_list(columns),
        placeholders(columns.len())
    );

    let mut stored = 0usize;
    loop {
        let tx = conn.transaction()?;
        let mut batch = 0usize;
        {
            let mut stmt = tx.prepare_cached(&insert_sql)?;
            while batch < INTERM_INSERT_BATCH {
                let Some(record) = reader.next() else { break };
                let row = parse_record(&record?, columns, required[0], ephemeris, stored + batch)?;
                if let Some(&missing) = required.iter().find(|&&i| row[i].is_null()) {
                    return Err(SurveyJoinError::MalformedInput {
                        path: ephemeris.to_string(),
                        reason: format!("null {} at data row {}", columns[missing], stored + batch),
                        obj_ids: row[required[0]].key().map(|k| k.into_owned()).into_iter().collect(),
                    });
                }
                stmt.execute(params_from_iter(row.iter()))?;
                batch += 1;
            }
        }
        tx.commit()?;
        stored += batch;
        if batch < INTERM_INSERT_BATCH {
            break;
        }
    }

    conn.execute_batch(&format!(
        "CREATE INDEX {} ON {} ({});",
        quote_ident(INTERM_OBJID_INDEX),
        quote_ident(INTERM_TABLE),
        quote_ident(OBJ_ID)
    ))?;
    Ok(stored)
}
