//! # Column names, table names and type aliases
//!
//! This module centralizes the **well-known column names** shared by the survey
//! simulation products, the names of the SQLite tables created by the crate, and
//! the **common type aliases** used across readers, joins and sinks.
//!
//! ## Overview
//!
//! - Column names of the per-object catalogs, the ephemeris file and the pointing database
//! - Table names of the intermediate database and of the SQLite output sink
//! - Survey filter sets used during configuration validation
//! - Identifier and hash container aliases

use std::collections::{BTreeSet, HashMap};

use ahash::RandomState;

// -------------------------------------------------------------------------------------------------
// Column names
// -------------------------------------------------------------------------------------------------

/// Object identifier, present in every per-object and per-detection source
pub const OBJ_ID: &str = "ObjID";

/// Pointing identifier carried by every ephemeris (detection) row
pub const FIELD_ID: &str = "FieldID";

/// Absolute magnitude column of the physical-parameter catalog
pub const ABSOLUTE_MAGNITUDE: &str = "H";

/// Pointing identifier in the pointing database
pub const OBSERVATION_ID: &str = "observationId";

/// Exposure start epoch in the pointing database (MJD)
pub const OBSERVATION_START_MJD: &str = "observationStartMJD";

/// Filter name of the exposure in the pointing database
pub const FILTER: &str = "filter";

/// Field centre right ascension in the pointing database (degrees)
pub const FIELD_RA: &str = "fieldRA";

/// Field centre declination in the pointing database (degrees)
pub const FIELD_DEC: &str = "fieldDec";

/// Columns every pointing query must return
pub const REQUIRED_POINTING_COLUMNS: [&str; 5] = [
    OBSERVATION_ID,
    OBSERVATION_START_MJD,
    FILTER,
    FIELD_RA,
    FIELD_DEC,
];

// -------------------------------------------------------------------------------------------------
// Storage names
// -------------------------------------------------------------------------------------------------

/// Table holding the flat ephemeris file inside the intermediate database
pub const INTERM_TABLE: &str = "interm";

/// Index created on the `ObjID` column of [`INTERM_TABLE`]
pub const INTERM_OBJID_INDEX: &str = "interm_objid";

/// Table receiving the joined observations in the SQLite output sink
pub const RESULTS_TABLE: &str = "pp_results";

/// Largest number of bound parameters used in a single `IN (...)` query.
/// Stays under the historical SQLite limit of 999 host parameters.
pub const SQLITE_MAX_PARAMS: usize = 900;

/// Rows inserted per transaction when building the intermediate database
pub const INTERM_INSERT_BATCH: usize = 10_000;

/// Default intermediate database location
pub const DEFAULT_INTERM_DB: &str = "./data/interm.db";

// -------------------------------------------------------------------------------------------------
// Survey definitions
// -------------------------------------------------------------------------------------------------

/// Filters available to the LSST survey
pub const LSST_FILTERS: [&str; 6] = ["u", "g", "r", "i", "z", "y"];

/// SNR limit applied when the configuration does not provide one (2σ)
pub const DEFAULT_SNR_LIMIT: f64 = 2.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Object identifier, always normalized to a string on read
pub type ObjId = String;

/// Ordered set of object identifiers (deterministic error reports)
pub type ObjIdSet = BTreeSet<ObjId>;

/// Hash map using [`ahash`](https://docs.rs/ahash) for the join hot paths
pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;
