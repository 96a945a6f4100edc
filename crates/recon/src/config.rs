use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::normalize::normalize_header;
use crate::schema::ColumnPatternTable;

/// Profile format version understood by this engine.
pub const SUPPORTED_VERSION: u32 = 1;

/// The profile shipped with the engine.
pub const DEFAULT_PROFILE: &str = include_str!("../profiles/artwork-release.toml");

// ---------------------------------------------------------------------------
// Top-level profile
// ---------------------------------------------------------------------------

/// Versioned field-mapping profile driving a whole pipeline run.
///
/// The header vocabulary lives here rather than in code so that new header
/// spellings only need a profile edit.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
    pub version: u32,
    /// Optional field groups switched on for this profile.
    #[serde(default)]
    pub extensions: Vec<String>,
    pub extraction: ExtractionConfig,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub date_filter: DateFilterConfig,
    pub output: OutputConfig,
}

/// One canonical field and the header spellings that identify it.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldPatterns {
    pub name: String,
    pub patterns: Vec<String>,
    /// Extension that must be enabled for this field to participate.
    #[serde(default)]
    pub extension: Option<String>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub key_field: String,
    #[serde(default = "default_header_scan_rows")]
    pub header_scan_rows: usize,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub order: DedupOrder,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    pub fields: Vec<FieldPatterns>,
}

/// Order in which per-file results are concatenated before global dedup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupOrder {
    /// Worker completion order. Not deterministic across runs.
    #[default]
    Completion,
    /// Input file order.
    Input,
}

fn default_header_scan_rows() -> usize {
    15
}

fn default_sample_rows() -> usize {
    20
}

fn default_max_rows() -> usize {
    5000
}

fn default_max_workers() -> usize {
    8
}

fn default_progress_every() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub header_row: usize,
    pub key_field: String,
    pub status_field: String,
    pub accepted_statuses: Vec<String>,
    pub release_date_field: String,
    #[serde(default = "default_release_date_format")]
    pub release_date_format: String,
    pub flag_field: String,
    pub flag_tokens: Vec<String>,
    #[serde(default = "default_flag_value")]
    pub flag_value: String,
    pub fields: Vec<FieldPatterns>,
}

fn default_release_date_format() -> String {
    "%d/%m/%y".into()
}

fn default_flag_value() -> String {
    "Yes".into()
}

// ---------------------------------------------------------------------------
// Reconcile + date filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub duplicate_keys: DuplicateKeyPolicy,
}

/// What the join does when the tracker carries several rows for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// One joined row per tracker row (relational outer join).
    #[default]
    FanOut,
    /// Keep the first tracker row per key, in sheet order.
    KeepFirst,
    /// Keep the last tracker row per key, in sheet order.
    KeepLast,
}

impl std::fmt::Display for DuplicateKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FanOut => write!(f, "fan_out"),
            Self::KeepFirst => write!(f, "keep_first"),
            Self::KeepLast => write!(f, "keep_last"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateFilterConfig {
    #[serde(default = "default_preferred_tokens")]
    pub preferred_tokens: Vec<String>,
    #[serde(default = "default_fallback_tokens")]
    pub fallback_tokens: Vec<String>,
    /// chrono formats, tried in order.
    #[serde(default = "default_date_formats")]
    pub formats: Vec<String>,
}

impl Default for DateFilterConfig {
    fn default() -> Self {
        Self {
            preferred_tokens: default_preferred_tokens(),
            fallback_tokens: default_fallback_tokens(),
            formats: default_date_formats(),
        }
    }
}

fn default_preferred_tokens() -> Vec<String> {
    vec!["artwork".into(), "release".into(), "date".into()]
}

fn default_fallback_tokens() -> Vec<String> {
    vec!["release".into(), "date".into()]
}

fn default_date_formats() -> Vec<String> {
    vec!["%d/%m/%y".into(), "%d/%m/%Y".into()]
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub key_field: String,
    pub columns: Vec<OutputColumn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    /// Source column in the reconciled data. Defaults to `name`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
}

impl OutputColumn {
    pub fn source_column(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl Profile {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let profile: Profile =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// The embedded default profile.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_PROFILE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigError::Validation(format!(
                "unsupported profile version {} (expected {SUPPORTED_VERSION})",
                self.version
            )));
        }

        let extraction = &self.extraction;
        check_fields("extraction", &extraction.fields)?;
        if !extraction.fields.iter().any(|f| f.name == extraction.key_field) {
            return Err(ConfigError::Validation(format!(
                "extraction: key field '{}' is not among the extraction fields",
                extraction.key_field
            )));
        }
        if extraction.header_scan_rows == 0 {
            return Err(ConfigError::Validation(
                "extraction: header_scan_rows must be at least 1".into(),
            ));
        }
        if extraction.sample_rows < extraction.header_scan_rows {
            return Err(ConfigError::Validation(format!(
                "extraction: sample_rows ({}) must cover header_scan_rows ({})",
                extraction.sample_rows, extraction.header_scan_rows
            )));
        }
        if extraction.max_workers == 0 || extraction.progress_every == 0 {
            return Err(ConfigError::Validation(
                "extraction: max_workers and progress_every must be at least 1".into(),
            ));
        }

        let tracker = &self.tracker;
        check_fields("tracker", &tracker.fields)?;
        for (what, field) in [
            ("status field", &tracker.status_field),
            ("key field", &tracker.key_field),
        ] {
            match tracker.fields.iter().find(|f| &f.name == field) {
                None => {
                    return Err(ConfigError::Validation(format!(
                        "tracker: {what} '{field}' is not among the tracker fields"
                    )));
                }
                Some(f) if f.extension.is_some() => {
                    return Err(ConfigError::Validation(format!(
                        "tracker: {what} '{field}' cannot depend on an extension"
                    )));
                }
                Some(_) => {}
            }
        }
        if tracker.accepted_statuses.is_empty() {
            return Err(ConfigError::Validation(
                "tracker: accepted_statuses must not be empty".into(),
            ));
        }

        if self.date_filter.formats.is_empty() {
            return Err(ConfigError::Validation(
                "date_filter: at least one date format is required".into(),
            ));
        }

        let output = &self.output;
        if output.columns.is_empty() {
            return Err(ConfigError::Validation("output: no columns defined".into()));
        }
        if !output.columns.iter().any(|c| c.name == output.key_field) {
            return Err(ConfigError::Validation(format!(
                "output: key field '{}' is not an output column",
                output.key_field
            )));
        }

        // Every enabled extension must be referenced somewhere, which catches typos.
        let referenced: HashSet<&str> = tracker
            .fields
            .iter()
            .chain(&extraction.fields)
            .filter_map(|f| f.extension.as_deref())
            .chain(output.columns.iter().filter_map(|c| c.extension.as_deref()))
            .collect();
        for ext in &self.extensions {
            if !referenced.contains(ext.as_str()) {
                return Err(ConfigError::Validation(format!("unknown extension '{ext}'")));
            }
        }

        Ok(())
    }

    pub fn extension_enabled(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    fn is_active(&self, extension: Option<&str>) -> bool {
        extension.map_or(true, |e| self.extension_enabled(e))
    }

    /// Extraction fields active under the enabled extensions, in order.
    pub fn extraction_fields(&self) -> Vec<&FieldPatterns> {
        self.extraction
            .fields
            .iter()
            .filter(|f| self.is_active(f.extension.as_deref()))
            .collect()
    }

    pub fn extraction_table(&self) -> ColumnPatternTable {
        pattern_table(self.extraction_fields())
    }

    pub fn tracker_table(&self) -> ColumnPatternTable {
        pattern_table(
            self.tracker
                .fields
                .iter()
                .filter(|f| self.is_active(f.extension.as_deref())),
        )
    }

    /// Output columns as `(name, source)`; columns of disabled extensions
    /// keep their slot but have no source.
    pub fn output_columns(&self) -> Vec<(String, Option<String>)> {
        self.output
            .columns
            .iter()
            .map(|c| {
                let source = self
                    .is_active(c.extension.as_deref())
                    .then(|| c.source_column().to_string());
                (c.name.clone(), source)
            })
            .collect()
    }
}

fn pattern_table<'a>(fields: impl IntoIterator<Item = &'a FieldPatterns>) -> ColumnPatternTable {
    ColumnPatternTable::new(
        fields
            .into_iter()
            .map(|f| (f.name.clone(), f.patterns.clone())),
    )
}

fn check_fields(section: &str, fields: &[FieldPatterns]) -> Result<(), ConfigError> {
    if fields.is_empty() {
        return Err(ConfigError::Validation(format!("{section}: no fields defined")));
    }
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "{section}: field '{}' defined twice",
                field.name
            )));
        }
        if !field.patterns.iter().any(|p| !normalize_header(p).is_empty()) {
            return Err(ConfigError::Validation(format!(
                "{section}: field '{}' has no usable patterns",
                field.name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
