//! # In-memory tables
//!
//! Every source handled by the pipeline (orbits, physical parameters, cometary
//! parameters, ephemerides, pointings) and every joined result is a [`Table`]: a
//! header plus row-major [`Value`] rows. Tables live for one chunk iteration and are
//! owned by the stage that produced them.
//!
//! Invariants
//! -----------------
//! * Every row has exactly `columns.len()` cells.
//! * When present, the `ObjID` column only holds [`Value::Text`] (or [`Value::Null`]
//!   before validation), whatever the storage type in the source file.
pub mod value;

use std::cmp::Ordering;

pub use value::Value;

use crate::{
    constants::{ObjId, ObjIdSet, OBJ_ID},
    surveyjoin_errors::SurveyJoinError,
};

/// One table row, aligned with [`Table::columns`].
pub type Row = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from a header and rows, checking the row widths.
    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, SurveyJoinError> {
        if let Some(pos) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(SurveyJoinError::JoinIntegrity(format!(
                "row {pos} has {} cells, expected {}",
                rows[pos].len(),
                columns.len()
            )));
        }
        Ok(Table { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Index of a column that must exist, reported against `source` otherwise.
    pub fn require_column(&self, name: &str, source: &str) -> Result<usize, SurveyJoinError> {
        self.column_index(name).ok_or_else(|| {
            SurveyJoinError::malformed(
                source,
                format!("cannot find {name} in column headings, check input and input format"),
            )
        })
    }

    /// Values of one column, in row order.
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Set of distinct object identifiers of the table.
    pub fn obj_ids(&self) -> Result<ObjIdSet, SurveyJoinError> {
        let idx = self.require_column(OBJ_ID, "table")?;
        Ok(self
            .rows
            .iter()
            .filter_map(|r| r[idx].key().map(|k| k.into_owned()))
            .collect())
    }

    /// Distinct object identifiers in first-seen order.
    pub fn distinct_obj_ids(&self) -> Result<Vec<ObjId>, SurveyJoinError> {
        let idx = self.require_column(OBJ_ID, "table")?;
        let mut seen = ObjIdSet::new();
        let mut ordered = Vec::new();
        for row in &self.rows {
            if let Some(key) = row[idx].key() {
                if seen.insert(key.to_string()) {
                    ordered.push(key.into_owned());
                }
            }
        }
        Ok(ordered)
    }

    /// Keep only the rows matching `keep`.
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(keep);
    }

    /// Rows sorted under [`Value::total_cmp`], for order-independent comparisons.
    pub fn sorted_rows(&self) -> Vec<Row> {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| cmp_rows(a, b));
        rows
    }

    /// Append the rows of `other`, which must share the same header.
    pub fn extend(&mut self, other: Table) -> Result<(), SurveyJoinError> {
        if other.columns != self.columns {
            return Err(SurveyJoinError::JoinIntegrity(format!(
                "cannot concatenate tables with different columns ({:?} vs {:?})",
                self.columns, other.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

fn cmp_rows(a: &Row, b: &Row) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}
