//! # Pointing matching
//!
//! Attach the survey bookkeeping of each exposure (epoch, filter, field centre,
//! seeing, depth, …) to the observations, and restrict them to the configured
//! filters.
//!
//! The pointing table is loaded once per run from the pointing-metadata SQLite
//! database with the configured query (e.g.
//! `SELECT observationId, observationStartMJD, filter, seeingFwhmGeom, seeingFwhmEff,
//! fiveSigmaDepth, fieldRA, fieldDec, rotSkyPos FROM SummaryAllProps`). Its result set
//! must contain `observationId`, `observationStartMJD`, `filter`, `fieldRA` and
//! `fieldDec`.
//!
//! Matching
//! -----------------
//! Observations are joined on `FieldID = observationId`. Identifiers are compared
//! through their canonical string form, so an integer id read from text matches the
//! same id stored as an SQLite integer or real. Observations whose pointing is
//! unknown (not part of the survey window) or taken in an unconfigured filter are
//! dropped; both drops are expected and logged at `info`.
use camino::Utf8Path;
use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::{
    constants::{FastHashMap, FIELD_ID, FILTER, OBSERVATION_ID, REQUIRED_POINTING_COLUMNS},
    run_context::{DiagnosticKind, RunContext, Stage},
    sql::query_table,
    surveyjoin_errors::SurveyJoinError,
    table::Table,
};

/// Pointings of the survey, indexed by `observationId`.
#[derive(Debug, Clone)]
pub struct PointingTable {
    table: Table,
    id_col: usize,
    filter_col: usize,
    index: FastHashMap<String, usize>,
}

impl PointingTable {
    /// Run `query` against the pointing database and keep the pointings taken in one
    /// of `observing_filters`.
    pub fn load(
        db_path: &Utf8Path,
        query: &str,
        observing_filters: &[String],
    ) -> Result<Self, SurveyJoinError> {
        if !db_path.is_file() {
            return Err(SurveyJoinError::malformed(
                db_path.as_str(),
                "pointing database not found",
            ));
        }
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let table = query_table(&conn, query, [])?;
        let pointing = PointingTable::from_table(table, observing_filters, db_path.as_str())?;
        info!(
            path = %db_path,
            pointings = pointing.len(),
            filters = %observing_filters.join(" "),
            "pointing database loaded"
        );
        Ok(pointing)
    }

    /// Validate and index an already loaded pointing table.
    pub fn from_table(
        mut table: Table,
        observing_filters: &[String],
        source: &str,
    ) -> Result<Self, SurveyJoinError> {
        for column in REQUIRED_POINTING_COLUMNS {
            table.require_column(column, source)?;
        }
        let id_col = table.require_column(OBSERVATION_ID, source)?;
        let filter_col = table.require_column(FILTER, source)?;

        table.retain_rows(|row| in_filters(&row[filter_col], observing_filters));

        let mut index = FastHashMap::default();
        for (i, row) in table.rows().iter().enumerate() {
            let Some(key) = row[id_col].key() else {
                return Err(SurveyJoinError::malformed(
                    source,
                    format!("null {OBSERVATION_ID} in pointing row {i}"),
                ));
            };
            if index.insert(key.to_string(), i).is_some() {
                return Err(SurveyJoinError::malformed(
                    source,
                    format!("duplicate {OBSERVATION_ID} {key} in the pointing table"),
                ));
            }
        }

        Ok(PointingTable {
            table,
            id_col,
            filter_col,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }
}

fn in_filters(value: &crate::table::Value, observing_filters: &[String]) -> bool {
    value
        .key()
        .is_some_and(|f| observing_filters.iter().any(|o| o.as_str() == f.as_ref()))
}

/// Join observations with their pointing and drop those outside the configured filters.
///
/// Arguments
/// -----------------
/// * `ctx` – Run context receiving the drop diagnostics.
/// * `observations` – Joined observations of the chunk (consumed), with a `FieldID` column.
/// * `pointing` – Pointing table of the run.
/// * `observing_filters` – Filters kept in the output.
///
/// Return
/// ----------
/// * The observations followed by the pointing columns (without `observationId`),
///   never more rows than the input.
pub fn match_pointings(
    ctx: &mut RunContext,
    observations: Table,
    pointing: &PointingTable,
    observing_filters: &[String],
) -> Result<Table, SurveyJoinError> {
    let field_col = observations.require_column(FIELD_ID, "observations")?;
    let pointing_cols: Vec<usize> = (0..pointing.table.columns().len())
        .filter(|&i| i != pointing.id_col)
        .collect();

    if let Some(&dup) = pointing_cols
        .iter()
        .find(|&&i| observations.columns().contains(&pointing.table.columns()[i]))
    {
        return Err(SurveyJoinError::JoinIntegrity(format!(
            "pointing column '{}' already exists in the observations",
            pointing.table.columns()[dup]
        )));
    }

    let columns: Vec<String> = observations
        .columns()
        .iter()
        .cloned()
        .chain(pointing_cols.iter().map(|&i| pointing.table.columns()[i].clone()))
        .collect();

    let (_, rows) = observations.into_parts();
    let input_rows = rows.len();
    let mut matched = Vec::with_capacity(input_rows);
    let mut unmatched = 0usize;
    let mut filtered = 0usize;

    for mut row in rows {
        let Some(&p) = row[field_col].key().and_then(|k| pointing.index.get(k.as_ref())) else {
            unmatched += 1;
            continue;
        };
        let prow = &pointing.table.rows()[p];
        if !in_filters(&prow[pointing.filter_col], observing_filters) {
            filtered += 1;
            continue;
        }
        row.extend(pointing_cols.iter().map(|&i| prow[i].clone()));
        matched.push(row);
    }

    if unmatched > 0 {
        info!(dropped = unmatched, "observations outside the survey pointings were dropped");
        ctx.record(Stage::Pointing, DiagnosticKind::UnmatchedPointings, unmatched, &[]);
    }
    if filtered > 0 {
        info!(dropped = filtered, "observations in non-requested filters were dropped");
        ctx.record(Stage::Pointing, DiagnosticKind::FilteredOut, filtered, &[]);
    }
    if matched.len() > input_rows {
        return Err(SurveyJoinError::JoinIntegrity(format!(
            "pointing match produced {} rows from {input_rows} observations",
            matched.len()
        )));
    }

    Table::with_rows(columns, matched)
}
