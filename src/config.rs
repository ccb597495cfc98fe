//! # Run configuration
//!
//! Configuration is handled in two layers:
//!
//! 1. [`RawConfig`] – the configuration file as written by the user (JSON), with one
//!    object per section (`INPUTFILES`, `OBJECTS`, `FILTERS`, `PHASE`, `PERFORMANCE`,
//!    `FILTERINGPARAMETERS`, `OUTPUTFORMAT`, `GENERAL`). Values may be given as JSON
//!    scalars or as strings (`"0.9"`, `"True"`, `"r, g, i"`).
//! 2. [`PipelineConfig`] – the typed, validated configuration consumed by the pipeline.
//!    It is produced by a single validation pass ([`PipelineConfig::from_raw`] or
//!    [`PipelineConfigBuilder::build`]); components never see the raw layer.
//!
//! ## Validation rules
//!
//! - `objecttype` is `asteroid` or `comet`; `ephemerides_type` is `oif`.
//! - `pointingdatabase` must exist; `ppsqldbquery` is mandatory.
//! - `othercolours` has exactly one entry less than `observing_filters`; for the LSST
//!   survey every filter is one of `u g r i z y`.
//! - `cameraModel` is `circle` (requires `fillfactor`) or `footprint` (requires an
//!   existing `footprintPath`, forbids `fillfactor`, which is then 1.0).
//! - `SNRLimit` defaults to 2.0 and must be non-negative; `magLimit` must be
//!   non-negative when given.
//! - The five SSP parameters (`inSepThreshold`, `minTracklet`, `noTracklets`,
//!   `trackletInterval`, `SSPDetectionEfficiency`) are all-or-nothing. Supplying only
//!   some of them is an error.
//! - `outpath` must be an existing directory; `sizeSerialChunk` is at least 1.
//!
//! ## Example
//!
//! ```rust
//! use surveyjoin::prelude::*;
//!
//! let err = PipelineConfig::builder()
//!     .observing_filters(vec!["r".into(), "g".into()])
//!     .other_colours(vec![])
//!     .build()
//!     .unwrap_err();
//! assert!(matches!(err, SurveyJoinError::InvalidConfig(_)));
//! ```
use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::info;

use crate::{
    constants::{DEFAULT_SNR_LIMIT, LSST_FILTERS},
    ephemeris::EphemeridesType,
    readers::FieldSeparator,
    run_context::RunContext,
    sinks::{OutputFormat, SinkConfig},
    surveyjoin_errors::SurveyJoinError,
};

// -------------------------------------------------------------------------------------------------
// Raw layer
// -------------------------------------------------------------------------------------------------

/// A loosely typed configuration value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl ConfigValue {
    fn as_f64(&self, key: &str) -> Result<f64, SurveyJoinError> {
        match self {
            ConfigValue::Int(i) => Ok(*i as f64),
            ConfigValue::Float(f) => Ok(*f),
            ConfigValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| invalid(format!("{key} is not a number: '{s}'"))),
            other => Err(invalid(format!("{key} is not a number: {other:?}"))),
        }
    }

    fn as_i64(&self, key: &str) -> Result<i64, SurveyJoinError> {
        match self {
            ConfigValue::Int(i) => Ok(*i),
            ConfigValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| invalid(format!("{key} is not an integer: '{s}'"))),
            other => Err(invalid(format!("{key} is not an integer: {other:?}"))),
        }
    }

    /// Accepts `true/t/1` and `false/f/0` in any case.
    fn as_bool(&self, key: &str) -> Result<bool, SurveyJoinError> {
        match self {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::Int(1) => Ok(true),
            ConfigValue::Int(0) => Ok(false),
            ConfigValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(invalid(format!("invalid literal for boolean {key}: '{s}'"))),
            },
            other => Err(invalid(format!("invalid literal for boolean {key}: {other:?}"))),
        }
    }

    /// A JSON array, or a comma separated string.
    fn as_list(&self, key: &str) -> Result<Vec<String>, SurveyJoinError> {
        let items: Vec<String> = match self {
            ConfigValue::List(items) => items.iter().map(|s| s.trim().to_string()).collect(),
            ConfigValue::Text(s) => s.split(',').map(|e| e.trim().to_string()).collect(),
            other => return Err(invalid(format!("{key} is not a list: {other:?}"))),
        };
        Ok(items.into_iter().filter(|s| !s.is_empty()).collect())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputFilesSection {
    #[serde(rename = "pointingFormat")]
    pub pointing_format: Option<String>,
    #[serde(rename = "auxFormat")]
    pub aux_format: Option<String>,
    pub ephemerides_type: Option<String>,
    #[serde(rename = "pointingdatabase")]
    pub pointing_database: Option<Utf8PathBuf>,
    #[serde(rename = "ppsqldbquery")]
    pub pointing_query: Option<String>,
    #[serde(rename = "footprintPath")]
    pub footprint_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectsSection {
    pub objecttype: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiltersSection {
    pub othercolours: Option<ConfigValue>,
    pub observing_filters: Option<ConfigValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseSection {
    pub phasefunction: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceSection {
    #[serde(rename = "trailingLossesOn")]
    pub trailing_losses_on: Option<ConfigValue>,
    #[serde(rename = "cameraModel")]
    pub camera_model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilteringSection {
    pub fillfactor: Option<ConfigValue>,
    #[serde(rename = "brightLimit")]
    pub bright_limit: Option<ConfigValue>,
    #[serde(rename = "SNRLimit")]
    pub snr_limit: Option<ConfigValue>,
    #[serde(rename = "magLimit")]
    pub mag_limit: Option<ConfigValue>,
    #[serde(rename = "inSepThreshold")]
    pub in_sep_threshold: Option<ConfigValue>,
    #[serde(rename = "minTracklet")]
    pub min_tracklet: Option<ConfigValue>,
    #[serde(rename = "noTracklets")]
    pub no_tracklets: Option<ConfigValue>,
    #[serde(rename = "trackletInterval")]
    pub tracklet_interval: Option<ConfigValue>,
    #[serde(rename = "SSPDetectionEfficiency")]
    pub ssp_detection_efficiency: Option<ConfigValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub outpath: Option<Utf8PathBuf>,
    pub outfilestem: Option<String>,
    pub outputformat: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralSection {
    #[serde(rename = "sizeSerialChunk")]
    pub size_serial_chunk: Option<ConfigValue>,
}

/// The configuration file as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    #[serde(rename = "INPUTFILES")]
    pub input_files: InputFilesSection,
    #[serde(rename = "OBJECTS")]
    pub objects: ObjectsSection,
    #[serde(rename = "FILTERS")]
    pub filters: FiltersSection,
    #[serde(rename = "PHASE")]
    pub phase: PhaseSection,
    #[serde(rename = "PERFORMANCE")]
    pub performance: PerformanceSection,
    #[serde(rename = "FILTERINGPARAMETERS")]
    pub filtering: FilteringSection,
    #[serde(rename = "OUTPUTFORMAT")]
    pub output: OutputSection,
    #[serde(rename = "GENERAL")]
    pub general: GeneralSection,
}

impl RawConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SurveyJoinError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Utf8Path>) -> Result<Self, SurveyJoinError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SurveyJoinError::InvalidConfig(format!("cannot read configuration file {path}: {e}"))
        })?;
        Self::from_json_str(&content)
    }
}

// -------------------------------------------------------------------------------------------------
// Typed layer
// -------------------------------------------------------------------------------------------------

fn invalid(msg: impl Into<String>) -> SurveyJoinError {
    SurveyJoinError::InvalidConfig(msg.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Asteroid,
    Comet,
}

impl FromStr for ObjectType {
    type Err = SurveyJoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "asteroid" => Ok(ObjectType::Asteroid),
            "comet" => Ok(ObjectType::Comet),
            _ => Err(invalid("objecttype is neither an asteroid or a comet")),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectType::Asteroid => "asteroid",
            ObjectType::Comet => "comet",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraModel {
    Circle,
    Footprint,
}

impl FromStr for CameraModel {
    type Err = SurveyJoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "circle" => Ok(CameraModel::Circle),
            "footprint" => Ok(CameraModel::Footprint),
            _ => Err(invalid("cameraModel should be either circle or footprint")),
        }
    }
}

/// Solar System Processing (linking) filter parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SspParams {
    /// Minimum angular separation between observations of a tracklet (arcsec).
    pub in_sep_threshold: f64,
    pub min_tracklet: u32,
    pub no_tracklets: u32,
    /// Maximum time span of the tracklets (days).
    pub tracklet_interval: f64,
    /// Fractional detection efficiency, in `[0, 1]`.
    pub detection_efficiency: f64,
}

/// Typed configuration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub object_type: ObjectType,
    /// Separator of the ephemeris file.
    pub pointing_separator: FieldSeparator,
    /// Separator of the per-object catalogs.
    pub aux_separator: FieldSeparator,
    pub ephemerides_type: EphemeridesType,
    pub pointing_database: Utf8PathBuf,
    pub pointing_query: String,
    /// Filters kept in the output; the first one is the main filter.
    pub observing_filters: Vec<String>,
    /// Colour offsets of the other filters relative to the main one (`g-r`, …).
    pub other_colours: Vec<String>,
    pub phase_function: String,
    pub trailing_losses: bool,
    pub camera_model: CameraModel,
    pub footprint_path: Option<Utf8PathBuf>,
    pub fill_factor: f64,
    pub bright_limit: Option<f64>,
    pub snr_limit: f64,
    pub mag_limit: Option<f64>,
    pub ssp: Option<SspParams>,
    pub sink: SinkConfig,
    pub chunk_size: usize,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate a raw configuration for the given survey.
    ///
    /// Arguments
    /// -----------------
    /// * `raw` – Parsed configuration file.
    /// * `survey` – Survey name from the command line (e.g. `LSST`).
    ///
    /// Return
    /// ----------
    /// * The typed configuration, or the first [`SurveyJoinError::InvalidConfig`] found.
    pub fn from_raw(raw: &RawConfig, survey: &str) -> Result<Self, SurveyJoinError> {
        let f = &raw.filtering;
        let opt_f64 = |v: &Option<ConfigValue>, key: &str| v.as_ref().map(|v| v.as_f64(key)).transpose();
        let opt_i64 = |v: &Option<ConfigValue>, key: &str| v.as_ref().map(|v| v.as_i64(key)).transpose();

        let mut b = PipelineConfig::builder().survey(survey);
        b.object_type = raw.objects.objecttype.as_deref().map(str::parse::<ObjectType>).transpose()?;
        b.pointing_separator = raw.input_files.pointing_format.as_deref().map(str::parse::<FieldSeparator>).transpose()?;
        b.aux_separator = raw.input_files.aux_format.as_deref().map(str::parse::<FieldSeparator>).transpose()?;
        b.ephemerides_type = raw.input_files.ephemerides_type.as_deref().map(str::parse::<EphemeridesType>).transpose()?;
        b.pointing_database = raw.input_files.pointing_database.clone();
        b.pointing_query = raw.input_files.pointing_query.clone();
        b.footprint_path = raw.input_files.footprint_path.clone();

        b.other_colours = raw
            .filters
            .othercolours
            .as_ref()
            .map(|v| v.as_list("othercolours"))
            .transpose()?;
        b.observing_filters = raw
            .filters
            .observing_filters
            .as_ref()
            .map(|v| v.as_list("observing_filters"))
            .transpose()?;

        b.phase_function = raw.phase.phasefunction.clone();
        b.trailing_losses = raw
            .performance
            .trailing_losses_on
            .as_ref()
            .map(|v| v.as_bool("trailingLossesOn"))
            .transpose()?;
        b.camera_model = raw.performance.camera_model.as_deref().map(str::parse::<CameraModel>).transpose()?;

        b.fill_factor = opt_f64(&f.fillfactor, "fillfactor")?;
        b.bright_limit = opt_f64(&f.bright_limit, "brightLimit")?;
        b.snr_limit = opt_f64(&f.snr_limit, "SNRLimit")?;
        b.mag_limit = opt_f64(&f.mag_limit, "magLimit")?;
        b.in_sep_threshold = opt_f64(&f.in_sep_threshold, "inSepThreshold")?;
        b.min_tracklet = opt_i64(&f.min_tracklet, "minTracklet")?;
        b.no_tracklets = opt_i64(&f.no_tracklets, "noTracklets")?;
        b.tracklet_interval = opt_f64(&f.tracklet_interval, "trackletInterval")?;
        b.ssp_detection_efficiency = opt_f64(&f.ssp_detection_efficiency, "SSPDetectionEfficiency")?;

        b.out_dir = raw.output.outpath.clone();
        b.file_stem = raw.output.outfilestem.clone();
        b.output_format = raw.output.outputformat.as_deref().map(str::parse::<OutputFormat>).transpose()?;
        b.chunk_size = opt_i64(&raw.general.size_serial_chunk, "sizeSerialChunk")?;

        b.build()
    }

    /// Log the configuration of the run, one line per setting.
    pub fn log_summary(&self, ctx: &RunContext) {
        let _span = ctx.span().enter();

        info!("Object type is {}", self.object_type);
        info!("Pointing simulation result format is: {:?}", self.pointing_separator);
        info!("Pointing database path is: {}", self.pointing_database);
        info!("Pointing database required query is: {}", self.pointing_query);
        if let Some(main) = self.observing_filters.first() {
            info!("The main filter in which brightness is defined is {main}");
        }
        info!("The colour indices included in the simulation are {}", self.other_colours.join(" "));
        info!(
            "Hence, the filters included in the post-processing results are {}",
            self.observing_filters.join(" ")
        );
        info!(
            "The apparent brightness is calculated using the following phase function model: {}",
            self.phase_function
        );
        info!(
            "Computation of trailing losses is switched {}.",
            if self.trailing_losses { "ON" } else { "OFF" }
        );
        match (&self.camera_model, &self.footprint_path) {
            (CameraModel::Footprint, Some(path)) => {
                info!("Footprint is modelled after the actual camera footprint.");
                info!("Loading camera footprint from {path}");
                info!("The filling factor has been set to {}", self.fill_factor);
            }
            _ => {
                info!("Footprint is circular");
                info!("The filling factor for the circular footprint is {}", self.fill_factor);
            }
        }
        match self.bright_limit {
            Some(limit) => info!("The upper brightness limit is {limit}"),
            None => info!("Brightness limit is turned off."),
        }
        info!("The lower SNR limit is {}", self.snr_limit);
        if let Some(limit) = self.mag_limit {
            info!("The magnitude limit is {limit}");
        }
        match &self.ssp {
            Some(ssp) => {
                info!("Solar System Processing filtering is turned on.");
                info!("SSP fractional detection efficiency: {}", ssp.detection_efficiency);
                info!("SSP minimum number of observations in a tracklet: {}", ssp.min_tracklet);
                info!("SSP minimum number of tracklets: {}", ssp.no_tracklets);
                info!("SSP maximum tracklet interval (days): {}", ssp.tracklet_interval);
                info!("SSP minimum separation between observations (arcsec): {}", ssp.in_sep_threshold);
            }
            None => info!("Solar System Processing filtering is turned off."),
        }
        info!(
            "Output format is {}, written to {} with stem {}",
            self.sink.format, self.sink.out_dir, self.sink.file_stem
        );
        info!("Objects are processed in chunks of {}", self.chunk_size);
    }
}

/// Builder for [`PipelineConfig`], with validation.
///
/// Every setting starts unset; [`build`](PipelineConfigBuilder::build) reports the
/// first missing or invalid one.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    survey: String,
    object_type: Option<ObjectType>,
    pointing_separator: Option<FieldSeparator>,
    aux_separator: Option<FieldSeparator>,
    ephemerides_type: Option<EphemeridesType>,
    pointing_database: Option<Utf8PathBuf>,
    pointing_query: Option<String>,
    observing_filters: Option<Vec<String>>,
    other_colours: Option<Vec<String>>,
    phase_function: Option<String>,
    trailing_losses: Option<bool>,
    camera_model: Option<CameraModel>,
    footprint_path: Option<Utf8PathBuf>,
    fill_factor: Option<f64>,
    bright_limit: Option<f64>,
    snr_limit: Option<f64>,
    mag_limit: Option<f64>,
    in_sep_threshold: Option<f64>,
    min_tracklet: Option<i64>,
    no_tracklets: Option<i64>,
    tracklet_interval: Option<f64>,
    ssp_detection_efficiency: Option<f64>,
    out_dir: Option<Utf8PathBuf>,
    file_stem: Option<String>,
    output_format: Option<OutputFormat>,
    chunk_size: Option<i64>,
}

fn required<T>(value: Option<T>, message: &str) -> Result<T, SurveyJoinError> {
    value.ok_or_else(|| invalid(message))
}

impl PipelineConfigBuilder {
    pub fn survey(mut self, v: &str) -> Self {
        self.survey = v.to_string();
        self
    }
    pub fn object_type(mut self, v: ObjectType) -> Self {
        self.object_type = Some(v);
        self
    }
    pub fn pointing_separator(mut self, v: FieldSeparator) -> Self {
        self.pointing_separator = Some(v);
        self
    }
    pub fn aux_separator(mut self, v: FieldSeparator) -> Self {
        self.aux_separator = Some(v);
        self
    }
    pub fn ephemerides_type(mut self, v: EphemeridesType) -> Self {
        self.ephemerides_type = Some(v);
        self
    }
    pub fn pointing_database(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.pointing_database = Some(v.into());
        self
    }
    pub fn pointing_query(mut self, v: impl Into<String>) -> Self {
        self.pointing_query = Some(v.into());
        self
    }
    pub fn observing_filters(mut self, v: Vec<String>) -> Self {
        self.observing_filters = Some(v);
        self
    }
    pub fn other_colours(mut self, v: Vec<String>) -> Self {
        self.other_colours = Some(v);
        self
    }
    pub fn phase_function(mut self, v: impl Into<String>) -> Self {
        self.phase_function = Some(v.into());
        self
    }
    pub fn trailing_losses(mut self, v: bool) -> Self {
        self.trailing_losses = Some(v);
        self
    }
    pub fn camera_model(mut self, v: CameraModel) -> Self {
        self.camera_model = Some(v);
        self
    }
    pub fn footprint_path(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.footprint_path = Some(v.into());
        self
    }
    pub fn fill_factor(mut self, v: f64) -> Self {
        self.fill_factor = Some(v);
        self
    }
    pub fn bright_limit(mut self, v: f64) -> Self {
        self.bright_limit = Some(v);
        self
    }
    pub fn snr_limit(mut self, v: f64) -> Self {
        self.snr_limit = Some(v);
        self
    }
    pub fn mag_limit(mut self, v: f64) -> Self {
        self.mag_limit = Some(v);
        self
    }

    // --- SSP filtering (all five or none) ---
    pub fn in_sep_threshold(mut self, v: f64) -> Self {
        self.in_sep_threshold = Some(v);
        self
    }
    pub fn min_tracklet(mut self, v: i64) -> Self {
        self.min_tracklet = Some(v);
        self
    }
    pub fn no_tracklets(mut self, v: i64) -> Self {
        self.no_tracklets = Some(v);
        self
    }
    pub fn tracklet_interval(mut self, v: f64) -> Self {
        self.tracklet_interval = Some(v);
        self
    }
    pub fn ssp_detection_efficiency(mut self, v: f64) -> Self {
        self.ssp_detection_efficiency = Some(v);
        self
    }

    // --- Output ---
    pub fn out_dir(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.out_dir = Some(v.into());
        self
    }
    pub fn file_stem(mut self, v: impl Into<String>) -> Self {
        self.file_stem = Some(v.into());
        self
    }
    pub fn output_format(mut self, v: OutputFormat) -> Self {
        self.output_format = Some(v);
        self
    }
    pub fn chunk_size(mut self, v: i64) -> Self {
        self.chunk_size = Some(v);
        self
    }

    /// A zero limit or SSP parameter in the configuration means "not supplied".
    fn build_ssp(&self) -> Result<Option<SspParams>, SurveyJoinError> {
        match (
            supplied(self.in_sep_threshold),
            supplied(self.min_tracklet),
            supplied(self.no_tracklets),
            supplied(self.tracklet_interval),
            supplied(self.ssp_detection_efficiency),
        ) {
            (None, None, None, None, None) => Ok(None),
            (Some(sep), Some(min_tracklet), Some(no_tracklets), Some(interval), Some(efficiency)) => {
                if min_tracklet < 1 {
                    return Err(invalid("minimum length of tracklet is zero or negative"));
                }
                if no_tracklets < 1 {
                    return Err(invalid("number of tracklets is zero or less"));
                }
                if interval <= 0.0 {
                    return Err(invalid("tracklet appearance interval must be positive"));
                }
                if !(0.0..=1.0).contains(&efficiency) {
                    return Err(invalid(
                        "SSP detection efficiency out of bounds (should be between 0 and 1)",
                    ));
                }
                Ok(Some(SspParams {
                    in_sep_threshold: sep,
                    min_tracklet: u32::try_from(min_tracklet)
                        .map_err(|_| invalid("minTracklet is too large"))?,
                    no_tracklets: u32::try_from(no_tracklets)
                        .map_err(|_| invalid("noTracklets is too large"))?,
                    tracklet_interval: interval,
                    detection_efficiency: efficiency,
                }))
            }
            _ => Err(invalid(
                "only some SSP filtering variables supplied. Supply all five required variables for SSP filter, or none to turn filter off",
            )),
        }
    }

    fn check_survey_filters(&self, filters: &[String]) -> Result<(), SurveyJoinError> {
        if matches!(self.survey.as_str(), "LSST" | "lsst") {
            let bad: Vec<&str> = filters
                .iter()
                .map(String::as_str)
                .filter(|f| !LSST_FILTERS.contains(f))
                .collect();
            if !bad.is_empty() {
                return Err(invalid(format!(
                    "filter(s) {bad:?} given in config file are not recognised filters for {} survey (accepted: {LSST_FILTERS:?})",
                    self.survey
                )));
            }
        }
        Ok(())
    }

    /// Validate every setting and produce the [`PipelineConfig`].
    pub fn build(self) -> Result<PipelineConfig, SurveyJoinError> {
        let observing_filters = required(self.observing_filters.clone(), "no observing_filters provided")?;
        let other_colours = required(self.other_colours.clone(), "no othercolours provided")?;
        if observing_filters.is_empty() {
            return Err(invalid("observing_filters is empty"));
        }
        if other_colours.len() != observing_filters.len() - 1 {
            return Err(invalid(
                "mismatch in input config colours and filters: len(othercolours) != len(observing_filters) - 1",
            ));
        }
        self.check_survey_filters(&observing_filters)?;

        let object_type = required(self.object_type, "no object type provided")?;
        let pointing_separator = required(self.pointing_separator, "no pointing simulation format is specified")?;
        let aux_separator = required(self.aux_separator, "no auxiliary data format specified")?;
        let ephemerides_type = required(self.ephemerides_type, "no ephemerides type provided")?;

        let pointing_database = required(self.pointing_database.clone(), "no pointing database provided")?;
        if !pointing_database.is_file() {
            return Err(invalid(format!(
                "filename {pointing_database} supplied for pointingdatabase does not exist"
            )));
        }
        let pointing_query = required(self.pointing_query.clone(), "no pointing database SQLite3 query provided")?;
        let phase_function = required(self.phase_function.clone(), "phase function not defined")?;

        let camera_model = required(self.camera_model, "camera model not defined")?;
        let fill_factor = match camera_model {
            CameraModel::Circle => {
                required(self.fill_factor, "no fill factor specified for circular footprint")?
            }
            CameraModel::Footprint => {
                let path = required(self.footprint_path.as_ref(), "no camera footprint provided")?;
                if !path.exists() {
                    return Err(invalid(format!(
                        "filename {path} supplied for footprintPath does not exist"
                    )));
                }
                if self.fill_factor.is_some() {
                    return Err(invalid(
                        "fill factor supplied in config file but camera model is not \"circle\"",
                    ));
                }
                1.0
            }
        };

        let bright_limit = supplied(self.bright_limit);
        let mag_limit = supplied(self.mag_limit);
        let snr_limit = supplied(self.snr_limit).unwrap_or(DEFAULT_SNR_LIMIT);
        if snr_limit < 0.0 {
            return Err(invalid("SNR limit is negative"));
        }
        if mag_limit.is_some_and(|m| m < 0.0) {
            return Err(invalid("magnitude limit is negative"));
        }
        let ssp = self.build_ssp()?;

        let out_dir = required(self.out_dir.clone(), "out path not specified")?;
        if !out_dir.is_dir() {
            return Err(invalid(format!("filename {out_dir} supplied for outpath does not exist")));
        }
        let file_stem = required(self.file_stem.clone(), "name of output file stem not specified")?;
        if file_stem.trim().is_empty() {
            return Err(invalid("name of output file stem is empty"));
        }
        let format = required(self.output_format, "output format not specified")?;

        let chunk_size = required(self.chunk_size, "sizeSerialChunk not specified")?;
        if chunk_size < 1 {
            return Err(invalid("sizeSerialChunk must be at least 1"));
        }

        Ok(PipelineConfig {
            object_type,
            pointing_separator,
            aux_separator,
            ephemerides_type,
            pointing_database,
            pointing_query,
            observing_filters,
            other_colours,
            phase_function,
            trailing_losses: self.trailing_losses.unwrap_or(false),
            camera_model,
            footprint_path: self.footprint_path,
            fill_factor,
            bright_limit,
            snr_limit,
            mag_limit,
            ssp,
            sink: SinkConfig {
                out_dir,
                file_stem,
                format,
            },
            chunk_size: chunk_size as usize,
        })
    }
}

/// Zero stands for an absent numeric filtering setting.
fn supplied<T: Default + PartialEq>(v: Option<T>) -> Option<T> {
    v.filter(|x| *x != T::default())
}
