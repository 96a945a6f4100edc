// Writing run results: combined dataset and final output

use std::fs;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use tracing::info;

use artsync_recon::{CanonicalOutput, ConsolidatedDataset, OutputSink, RunArtifacts};

pub const COMBINED_SHEET: &str = "Combined Data";
pub const FINAL_SHEET: &str = "Final Data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Xlsx,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

/// Writes `Combined_Data_*` and `Final_Output_*` files into one directory.
#[derive(Debug, Clone)]
pub struct RunFiles {
    dir: PathBuf,
    format: OutputFormat,
    /// Disambiguates repeated runs over the same range.
    stamp: String,
}

impl RunFiles {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            stamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    pub fn with_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.stamp = stamp.into();
        self
    }

    fn path_for(&self, prefix: &str, artifacts: &RunArtifacts<'_>) -> PathBuf {
        self.dir.join(format!(
            "{prefix}_{}_to_{}_{}.{}",
            artifacts.range.start.format("%Y%m%d"),
            artifacts.range.end.format("%Y%m%d"),
            self.stamp,
            self.format.extension()
        ))
    }

    fn write(&self, path: &Path, sheet: &str, columns: &[String], rows: &[Vec<String>]) -> Result<(), String> {
        match self.format {
            OutputFormat::Xlsx => write_xlsx(path, sheet, columns, rows),
            OutputFormat::Csv => write_csv(path, columns, rows),
        }
    }
}

impl OutputSink for RunFiles {
    fn save(&mut self, artifacts: &RunArtifacts<'_>) -> Result<Vec<PathBuf>, String> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Cannot create output folder {}: {e}", self.dir.display()))?;

        let mut written = Vec::new();

        if !artifacts.consolidated.is_empty() {
            let path = self.path_for("Combined_Data", artifacts);
            let (columns, rows) = consolidated_table(artifacts.consolidated);
            self.write(&path, COMBINED_SHEET, &columns, &rows)?;
            info!(path = %path.display(), rows = rows.len(), "combined data written");
            written.push(path);
        }

        let path = self.path_for("Final_Output", artifacts);
        let (columns, rows) = final_table(artifacts.output);
        self.write(&path, FINAL_SHEET, &columns, &rows)?;
        info!(path = %path.display(), rows = rows.len(), "final output written");
        written.push(path);

        Ok(written)
    }
}

fn consolidated_table(data: &ConsolidatedDataset) -> (Vec<String>, Vec<Vec<String>>) {
    let columns = data.columns();
    let rows = data
        .records
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| r.value(c).unwrap_or_default().to_string())
                .collect()
        })
        .collect();
    (columns, rows)
}

fn final_table(output: &CanonicalOutput) -> (Vec<String>, Vec<Vec<String>>) {
    let rows = output.records.iter().map(|r| r.values.clone()).collect();
    (output.columns.clone(), rows)
}

fn write_xlsx(path: &Path, sheet: &str, columns: &[String], rows: &[Vec<String>]) -> Result<(), String> {
    let mut workbook = XlsxWorkbook::new();
    let header = Format::new().set_bold();

    let worksheet = workbook
        .add_worksheet()
        .set_name(sheet)
        .map_err(|e| format!("Failed to create sheet '{sheet}': {e}"))?;

    for (col, name) in columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, name, &header)
            .map_err(|e| format!("Failed to write header: {e}"))?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let target_row = row_idx as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string(target_row, col as u16, value)
                .map_err(|e| format!("Failed to write cell: {e}"))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {e}"))
}

fn write_csv(path: &Path, columns: &[String], rows: &[Vec<String>]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| format!("Failed to create {}: {e}", path.display()))?;
    writer
        .write_record(columns)
        .map_err(|e| format!("Failed to write CSV header: {e}"))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| format!("Failed to write CSV row: {e}"))?;
    }
    writer
        .flush()
        .map_err(|e| format!("Failed to flush {}: {e}", path.display()))
}
