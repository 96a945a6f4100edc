//! Project tracker: status filtering and release-date formatting.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::Profile;
use crate::error::StageError;
use crate::log::StageLog;
use crate::model::{Cell, Sheet, TrackerDataset, TrackerRecord};
use crate::pipeline::Stage;
use crate::schema::ColumnPatternTable;
use crate::source::WorkbookSource;

const TRACKER_HINT: &str = "Check that the Project Tracker file is a valid Excel file.";

#[derive(Debug, Clone)]
pub struct TrackerPlan {
    pub table: ColumnPatternTable,
    pub header_row: usize,
    pub key_field: String,
    pub status_field: String,
    pub accepted_statuses: Vec<String>,
    pub release_date_field: String,
    pub release_date_format: String,
    pub flag_field: String,
    pub flag_tokens: Vec<String>,
    pub flag_value: String,
}

/// Why a tracker sheet produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetSkip {
    NoStatusColumn,
    NoMatchingRows,
}

impl TrackerPlan {
    pub fn from_profile(profile: &Profile) -> Self {
        let cfg = &profile.tracker;
        Self {
            table: profile.tracker_table(),
            header_row: cfg.header_row,
            key_field: cfg.key_field.clone(),
            status_field: cfg.status_field.clone(),
            accepted_statuses: cfg.accepted_statuses.clone(),
            release_date_field: cfg.release_date_field.clone(),
            release_date_format: cfg.release_date_format.clone(),
            flag_field: cfg.flag_field.clone(),
            flag_tokens: cfg.flag_tokens.iter().map(|t| t.to_uppercase()).collect(),
            flag_value: cfg.flag_value.clone(),
        }
    }

    /// Accepted rows of one sheet.
    pub fn process_sheet(&self, sheet: &Sheet) -> Result<TrackerDataset, SheetSkip> {
        let mapping = self.table.map_row(&sheet.row_text(self.header_row));
        let Some(status_col) = mapping.column(&self.status_field) else {
            return Err(SheetSkip::NoStatusColumn);
        };

        let mapped: Vec<(&str, usize)> = self
            .table
            .field_names()
            .filter_map(|f| mapping.column(f).map(|c| (f, c)))
            .collect();

        let mut records = Vec::new();
        for row in sheet.rows.iter().skip(self.header_row + 1) {
            let status = row.get(status_col).map(Cell::to_text).unwrap_or_default();
            if !self.accepted_statuses.iter().any(|s| *s == status) {
                continue;
            }

            let mut fields = HashMap::with_capacity(mapped.len() + 1);
            for (field, col) in &mapped {
                let cell = row.get(*col).unwrap_or(&Cell::Empty);
                let value = if *field == self.release_date_field {
                    self.format_release_date(cell)
                } else {
                    cell.to_text()
                };
                fields.insert((*field).to_string(), value);
            }
            fields.insert(self.flag_field.clone(), self.flag_for(&status));

            let merge_key = fields.get(&self.key_field).cloned().unwrap_or_default();
            records.push(TrackerRecord { merge_key, fields });
        }

        if records.is_empty() {
            return Err(SheetSkip::NoMatchingRows);
        }

        let mut columns: Vec<String> = mapped.iter().map(|(f, _)| (*f).to_string()).collect();
        columns.push(self.flag_field.clone());

        Ok(TrackerDataset {
            sheet: sheet.name.clone(),
            columns,
            records,
        })
    }

    /// Native date cells are taken as-is; text is parsed day-first. Anything
    /// else becomes `""`.
    pub fn format_release_date(&self, cell: &Cell) -> String {
        let date = match cell {
            Cell::Date(dt) => Some(dt.date()),
            Cell::Text(text) => {
                let text = text.trim();
                [self.release_date_format.as_str(), "%d/%m/%Y", "%Y-%m-%d"]
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            }
            _ => None,
        };
        date.map(|d| d.format(&self.release_date_format).to_string())
            .unwrap_or_default()
    }

    fn flag_for(&self, status: &str) -> String {
        let upper = status.to_uppercase();
        if self.flag_tokens.iter().any(|t| upper.contains(t.as_str())) {
            self.flag_value.clone()
        } else {
            String::new()
        }
    }
}

/// Process every sheet of the tracker and keep the one with the most
/// accepted rows. Ties go to the earlier sheet.
pub fn process_tracker(
    source: &dyn WorkbookSource,
    plan: &TrackerPlan,
    log: &mut dyn StageLog,
) -> Result<TrackerDataset, StageError> {
    let file_name = source.file_name();
    log.line(format!("Processing: {file_name}"));

    let mut reader = source.open().map_err(|e| {
        log.line(format!("ERROR: Cannot open Excel file: {e}"));
        StageError::new(Stage::ProcessTracker, format!("Cannot open tracker: {e}")).with_hint(TRACKER_HINT)
    })?;

    let sheet_names = reader.sheet_names();
    log.line(format!("  Found {} sheet(s)", sheet_names.len()));

    let mut best: Option<TrackerDataset> = None;
    let mut saw_status = false;
    for name in sheet_names {
        let sheet = match reader.read_sheet(&name) {
            Ok(s) => s,
            Err(e) => {
                log.warn(format!("  [X] Sheet '{name}': {e}"));
                continue;
            }
        };

        match plan.process_sheet(&sheet) {
            Ok(data) => {
                saw_status = true;
                if data.len() > best.as_ref().map_or(0, TrackerDataset::len) {
                    log.line(format!("  [OK] Sheet '{name}': {} valid records", data.len()));
                    best = Some(data);
                }
            }
            Err(SheetSkip::NoMatchingRows) => saw_status = true,
            Err(SheetSkip::NoStatusColumn) => {
                debug!(sheet = %name, status = %plan.status_field, "no status column");
            }
        }
    }

    match best {
        Some(data) => {
            info!(sheet = %data.sheet, records = data.len(), "tracker processed");
            log.line(format!("SUCCESS: Processed {} tracker records", data.len()));
            Ok(data)
        }
        None => {
            let message = if saw_status {
                "No valid tracker data found in any sheet".to_string()
            } else {
                format!("No sheet has a '{}' column", plan.status_field)
            };
            log.line(format!("ERROR: {message}"));
            Err(StageError::new(Stage::ProcessTracker, message).with_hint(TRACKER_HINT))
        }
    }
}
