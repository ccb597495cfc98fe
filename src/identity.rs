//! # Object identity validation
//!
//! Before any join, the `ObjID` sets of the sources read for a chunk must agree:
//!
//! * the per-object catalogs (orbits, physical parameters and, for comets, cometary
//!   parameters) read for the same chunk carry **identical** sets;
//! * the ephemeris chunk only references **known** objects (subset of the per-object
//!   set). Objects without detections are fine.
//!
//! Violations are [`SurveyJoinError::IdentityMismatch`] errors listing the offending
//! identifiers on each side, sorted, so that misaligned input files can be fixed.
use crate::{
    constants::{ObjIdSet, OBJ_ID},
    surveyjoin_errors::SurveyJoinError,
    table::Table,
};

fn id_set(label: &str, table: &Table) -> Result<ObjIdSet, SurveyJoinError> {
    table.require_column(OBJ_ID, label)?;
    table.obj_ids()
}

/// Check that every labelled table carries the same `ObjID` set.
///
/// Arguments
/// -----------------
/// * `sources` – `(label, table)` pairs; the first one is the reference.
///
/// Return
/// ----------
/// * The common identifier set, or an [`SurveyJoinError::IdentityMismatch`] for the
///   first source that differs from the reference.
pub fn check_identical(sources: &[(&str, &Table)]) -> Result<ObjIdSet, SurveyJoinError> {
    let Some(((ref_label, ref_table), others)) = sources.split_first() else {
        return Ok(ObjIdSet::new());
    };
    let reference = id_set(ref_label, ref_table)?;

    for (label, table) in others {
        let ids = id_set(label, table)?;
        if ids != reference {
            return Err(SurveyJoinError::IdentityMismatch {
                left: ref_label.to_string(),
                right: label.to_string(),
                only_left: reference.difference(&ids).cloned().collect(),
                only_right: ids.difference(&reference).cloned().collect(),
            });
        }
    }
    Ok(reference)
}

/// Check that the ephemeris chunk only references objects of `objects`.
pub fn check_subset(ephemeris: &Table, objects: &ObjIdSet) -> Result<(), SurveyJoinError> {
    let ids = id_set("ephemeris", ephemeris)?;
    let unknown: Vec<_> = ids.difference(objects).cloned().collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(SurveyJoinError::IdentityMismatch {
            left: "ephemeris".into(),
            right: "per-object catalogs".into(),
            only_left: unknown,
            only_right: Vec::new(),
        })
    }
}

/// Run both identity rules over the tables of one chunk.
///
/// See also
/// ------------
/// * [`check_identical`] – Per-object sources.
/// * [`check_subset`] – Ephemeris against the per-object set.
pub fn check_consistency(
    orbit: &Table,
    physical: &Table,
    cometary: Option<&Table>,
    ephemeris: &Table,
) -> Result<ObjIdSet, SurveyJoinError> {
    let mut sources = vec![("orbit", orbit), ("physical parameters", physical)];
    if let Some(cometary) = cometary {
        sources.push(("cometary parameters", cometary));
    }
    let objects = check_identical(&sources)?;
    check_subset(ephemeris, &objects)?;
    Ok(objects)
}
