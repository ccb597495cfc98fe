//! # Observation join
//!
//! Combine the ephemeris chunk with the per-object tables into one observation
//! table:
//!
//! ```text
//! ephemeris ⋈ physical parameters ⋈ orbits [⋈ cometary parameters]   (on ObjID)
//! ```
//!
//! Ephemeris rows are the *many* side, per-object tables the *one* side (indexed by
//! `ObjID` in a hash map). The output keeps the left columns, followed by the right
//! columns minus `ObjID`.
//!
//! Integrity
//! -----------------
//! * A non-key column present on both sides is a [`SurveyJoinError::JoinIntegrity`]
//!   error: columns are never silently renamed or overwritten.
//! * An `ObjID` appearing twice in a per-object table is a join integrity error.
//! * Ephemeris rows without a per-object match are dropped, logged at `warn` and
//!   recorded as [`DiagnosticKind::UnmatchedJoinRows`]. After identity validation this
//!   should never happen, so the event is the trace of an upstream invariant breach.
//! * The output has exactly as many rows as matched ephemeris rows.
use itertools::Itertools;
use tracing::warn;

use crate::{
    constants::{FastHashMap, ObjId, OBJ_ID},
    run_context::{DiagnosticKind, RunContext, Stage},
    surveyjoin_errors::SurveyJoinError,
    table::{Row, Table},
};

/// Join the ephemeris chunk with the per-object tables of the same chunk.
///
/// Arguments
/// -----------------
/// * `ctx` – Run context receiving the unmatched-row diagnostics.
/// * `ephemeris` – Detections of the chunk (consumed).
/// * `physical` – Physical parameters (`H`, colours, …).
/// * `orbit` – Orbital elements.
/// * `cometary` – Cometary activity parameters, for comet runs only.
///
/// Return
/// ----------
/// * One row per matched ephemeris row, carrying every column of every source once.
pub fn join_observations(
    ctx: &mut RunContext,
    ephemeris: Table,
    physical: &Table,
    orbit: &Table,
    cometary: Option<&Table>,
) -> Result<Table, SurveyJoinError> {
    let mut joined = inner_join(ctx, ephemeris, physical, "physical parameters")?;
    joined = inner_join(ctx, joined, orbit, "orbit")?;
    if let Some(cometary) = cometary {
        joined = inner_join(ctx, joined, cometary, "cometary parameters")?;
    }
    Ok(joined)
}

/// Many-to-one inner join of `left` with `right` on `ObjID`.
pub(crate) fn inner_join(
    ctx: &mut RunContext,
    left: Table,
    right: &Table,
    right_label: &str,
) -> Result<Table, SurveyJoinError> {
    let left_key = left.require_column(OBJ_ID, "observations")?;
    let right_key = right.require_column(OBJ_ID, right_label)?;

    if let Some(dup) = right
        .columns()
        .iter()
        .filter(|c| c.as_str() != OBJ_ID)
        .find(|c| left.columns().contains(*c))
    {
        return Err(SurveyJoinError::JoinIntegrity(format!(
            "column '{dup}' of the {right_label} table already exists in the observations"
        )));
    }

    let mut index: FastHashMap<&str, &Row> = FastHashMap::default();
    for row in right.rows() {
        if let Some(key) = row[right_key].as_str() {
            if index.insert(key, row).is_some() {
                return Err(SurveyJoinError::JoinIntegrity(format!(
                    "ObjID '{key}' appears more than once in the {right_label} table"
                )));
            }
        }
    }

    let right_cols: Vec<usize> = (0..right.columns().len()).filter(|&i| i != right_key).collect();
    let columns: Vec<String> = left
        .columns()
        .iter()
        .cloned()
        .chain(right_cols.iter().map(|&i| right.columns()[i].clone()))
        .collect();

    let (_, left_rows) = left.into_parts();
    let input_rows = left_rows.len();
    let mut rows = Vec::with_capacity(input_rows);
    let mut unmatched: Vec<ObjId> = Vec::new();

    for mut row in left_rows {
        let matched = row[left_key].key().and_then(|k| index.get(k.as_ref()).copied());
        match matched {
            Some(other) => {
                row.extend(right_cols.iter().map(|&i| other[i].clone()));
                rows.push(row);
            }
            None => unmatched.push(row[left_key].to_string()),
        }
    }

    if rows.len() + unmatched.len() != input_rows || rows.len() > input_rows {
        return Err(SurveyJoinError::JoinIntegrity(format!(
            "join with {right_label} produced {} rows from {input_rows} input rows",
            rows.len()
        )));
    }

    if !unmatched.is_empty() {
        let ids: Vec<ObjId> = unmatched.iter().unique().cloned().collect();
        warn!(
            table = right_label,
            dropped = unmatched.len(),
            ids = %ids.iter().take(20).join(", "),
            "ephemeris rows without a matching object were dropped"
        );
        ctx.record(Stage::Join, DiagnosticKind::UnmatchedJoinRows, unmatched.len(), &ids);
    }

    Table::with_rows(columns, rows)
}

#[cfg(test)]
mod join_test {
    use super::*;
    use crate::table::Value;

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::with_rows(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    fn ephemeris() -> Table {
        table(
            &["ObjID", "FieldID", "V"],
            vec![
                vec!["A".into(), 1i64.into(), 19.5.into()],
                vec!["B".into(), 1i64.into(), 20.5.into()],
                vec!["A".into(), 2i64.into(), 19.6.into()],
            ],
        )
    }

    fn physical() -> Table {
        table(
            &["ObjID", "H", "u-r"],
            vec![vec!["A".into(), 7.2.into(), 1.7.into()], vec!["B".into(), 15.1.into(), 1.6.into()]],
        )
    }

    fn orbit() -> Table {
        table(
            &["ObjID", "q", "e"],
            vec![vec!["B".into(), 2.0.into(), 0.2.into()], vec!["A".into(), 1.0.into(), 0.1.into()]],
        )
    }

    #[test]
    fn test_join_columns_and_rows() {
        let mut ctx = RunContext::new("test");
        let joined = join_observations(&mut ctx, ephemeris(), &physical(), &orbit(), None).unwrap();

        assert_eq!(joined.columns(), ["ObjID", "FieldID", "V", "H", "u-r", "q", "e"]);
        assert_eq!(joined.len(), 3);
        assert_eq!(
            joined.rows()[2],
            vec![
                Value::from("A"),
                Value::Int(2),
                Value::Float(19.6),
                Value::Float(7.2),
                Value::Float(1.7),
                Value::Float(1.0),
                Value::Float(0.1)
            ]
        );
        assert_eq!(ctx.diagnostics().total(DiagnosticKind::UnmatchedJoinRows), 0);
    }

    #[test]
    fn test_unmatched_rows_are_counted() {
        let mut ctx = RunContext::new("test");
        let orbit_a = table(&["ObjID", "q"], vec![vec!["A".into(), 1.0.into()]]);
        let joined = join_observations(&mut ctx, ephemeris(), &physical(), &orbit_a, None).unwrap();

        assert_eq!(joined.len(), 2);
        assert_eq!(ctx.diagnostics().total(DiagnosticKind::UnmatchedJoinRows), 1);
        let event = ctx.diagnostics().of_kind(DiagnosticKind::UnmatchedJoinRows).next().unwrap();
        assert_eq!(event.sample_ids, vec!["B"]);
    }

    #[test]
    fn test_comet_join_adds_cometary_columns() {
        let mut ctx = RunContext::new("test");
        let comet = table(
            &["ObjID", "afrho1", "k"],
            vec![vec!["A".into(), 1552.0.into(), (-3.35).into()], vec!["B".into(), 10.0.into(), (-4.0).into()]],
        );
        let joined = join_observations(&mut ctx, ephemeris(), &physical(), &orbit(), Some(&comet)).unwrap();
        assert_eq!(joined.columns().len(), 9);
        assert_eq!(joined.len(), 3);
    }

    #[test]
    fn test_column_collision_is_an_error() {
        let mut ctx = RunContext::new("test");
        let bad = table(&["ObjID", "V"], vec![vec!["A".into(), 1.0.into()], vec!["B".into(), 2.0.into()]]);
        let err = join_observations(&mut ctx, ephemeris(), &bad, &orbit(), None).unwrap_err();
        assert!(matches!(err, SurveyJoinError::JoinIntegrity(ref m) if m.contains("'V'")));
    }

    #[test]
    fn test_duplicate_object_rows_are_an_error() {
        let mut ctx = RunContext::new("test");
        let dup = table(&["ObjID", "q"], vec![vec!["A".into(), 1.0.into()], vec!["A".into(), 2.0.into()]]);
        assert!(join_observations(&mut ctx, ephemeris(), &physical(), &dup, None).is_err());
    }
}
