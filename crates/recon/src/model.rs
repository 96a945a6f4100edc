use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// Column carrying the normalized join key in the reconciled dataset.
pub const MERGE_KEY_COLUMN: &str = "Merge_Key";
/// Column carrying the provenance tag in the reconciled dataset.
pub const PROVENANCE_COLUMN: &str = "Data_Source";
pub const SOURCE_FILE_COLUMN: &str = "Source_File";
pub const SOURCE_FOLDER_COLUMN: &str = "Source_Folder";

// ---------------------------------------------------------------------------
// Sheets
// ---------------------------------------------------------------------------

/// A single cell value as handed over by a workbook collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Render the cell as text. Integral numbers print without a decimal
    /// part so that item numbers survive a numeric cell type.
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Date(dt) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d.and_time(NaiveTime::MIN))
    }
}

/// A worksheet as a dense grid of rows. Row 0 is the first row of the sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { name: name.into(), rows }
    }

    /// Build a sheet from string literals; empty strings become empty cells.
    pub fn from_text<R, C>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| Cell::from(c.as_ref())).collect())
            .collect();
        Self { name: name.into(), rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(Cell::is_empty))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// The row rendered as text, one entry per cell.
    pub fn row_text(&self, row: usize) -> Vec<String> {
        self.rows
            .get(row)
            .map(|r| r.iter().map(Cell::to_text).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Consolidated side
// ---------------------------------------------------------------------------

/// One extracted row: canonical field values plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    pub fields: HashMap<String, String>,
    pub source_file: String,
    pub source_folder: String,
}

impl ExtractedRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Value by column name, including the provenance columns.
    pub fn value(&self, column: &str) -> Option<&str> {
        match column {
            SOURCE_FILE_COLUMN => Some(&self.source_file),
            SOURCE_FOLDER_COLUMN => Some(&self.source_folder),
            _ => self.get(column),
        }
    }
}

/// Records from every candidate file, unique by business key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidatedDataset {
    pub key_field: String,
    /// Canonical fields in extraction order.
    pub fields: Vec<String>,
    pub records: Vec<ExtractedRecord>,
}

impl ConsolidatedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names as exported: canonical fields then provenance.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = self.fields.clone();
        cols.push(SOURCE_FILE_COLUMN.to_string());
        cols.push(SOURCE_FOLDER_COLUMN.to_string());
        cols
    }

    /// Number of records with a non-empty value in `field`.
    pub fn populated(&self, field: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.get(field).is_some_and(|v| !v.is_empty()))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tracker side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerRecord {
    /// Raw value of the tracker's key column (not yet normalized).
    pub merge_key: String,
    pub fields: HashMap<String, String>,
}

impl TrackerRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Accepted rows from the winning tracker sheet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerDataset {
    pub sheet: String,
    pub columns: Vec<String>,
    pub records: Vec<TrackerRecord>,
}

impl TrackerDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    BothSources,
    ConsolidatedOnly,
    TrackerOnly,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BothSources => write!(f, "Consolidated + Tracker"),
            Self::ConsolidatedOnly => write!(f, "Consolidated Only"),
            Self::TrackerOnly => write!(f, "Tracker Only"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRecord {
    pub key: String,
    pub provenance: Provenance,
    pub consolidated: Option<ExtractedRecord>,
    pub tracker: Option<TrackerRecord>,
}

impl ReconciledRecord {
    /// Look a column up across both sides. Missing sides yield `None`.
    pub fn value(&self, column: &str) -> Option<&str> {
        if column == MERGE_KEY_COLUMN {
            return Some(&self.key);
        }
        if let Some(v) = self.consolidated.as_ref().and_then(|r| r.value(column)) {
            return Some(v);
        }
        self.tracker.as_ref().and_then(|r| r.get(column))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvenanceCounts {
    pub both_sources: usize,
    pub consolidated_only: usize,
    pub tracker_only: usize,
}

impl ProvenanceCounts {
    pub fn total(&self) -> usize {
        self.both_sources + self.consolidated_only + self.tracker_only
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciledDataset {
    pub columns: Vec<String>,
    pub records: Vec<ReconciledRecord>,
}

impl ReconciledDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn counts(&self) -> ProvenanceCounts {
        let mut counts = ProvenanceCounts::default();
        for r in &self.records {
            match r.provenance {
                Provenance::BothSources => counts.both_sources += 1,
                Provenance::ConsolidatedOnly => counts.consolidated_only += 1,
                Provenance::TrackerOnly => counts.tracker_only += 1,
            }
        }
        counts
    }

    /// Cell value for export, with the provenance column rendered.
    pub fn value(&self, record: &ReconciledRecord, column: &str) -> String {
        if column == PROVENANCE_COLUMN {
            return record.provenance.to_string();
        }
        record.value(column).unwrap_or_default().to_string()
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One output row; values are aligned with [`CanonicalOutput::columns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRecord {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CanonicalOutput {
    pub columns: Vec<String>,
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalOutput {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get<'a>(&self, record: &'a CanonicalRecord, column: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        record.values.get(idx).map(String::as_str)
    }
}
