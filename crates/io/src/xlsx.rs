// Excel import via calamine (xlsx, xlsm, xls)

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use artsync_recon::{Cell, Sheet, SheetReader, WorkbookError, WorkbookSource};

/// A workbook on disk. Opened lazily, once per `open` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XlsxSource {
    path: PathBuf,
}

impl XlsxSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkbookSource for XlsxSource {
    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn folder_name(&self) -> String {
        self.path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn open(&self) -> Result<Box<dyn SheetReader + '_>, WorkbookError> {
        let workbook: Sheets<BufReader<File>> =
            open_workbook_auto(&self.path).map_err(|e| WorkbookError::Open {
                file: self.file_name(),
                message: e.to_string(),
            })?;
        debug!(path = %self.path.display(), "workbook opened");
        Ok(Box::new(XlsxReader { workbook }))
    }
}

struct XlsxReader {
    workbook: Sheets<BufReader<File>>,
}

impl SheetReader for XlsxReader {
    /// All sheets, hidden ones included.
    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    fn read_sheet(&mut self, name: &str) -> Result<Sheet, WorkbookError> {
        let range = self
            .workbook
            .worksheet_range(name)
            .map_err(|e| WorkbookError::Sheet {
                sheet: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Sheet::new(name, grid(&range)))
    }
}

/// Dense rows with absolute positions: row 0 is the sheet's first row even
/// when the used range starts further down.
fn grid(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let (height, width) = range.get_size();
    if height == 0 || width == 0 {
        return Vec::new();
    }

    // Range start offset (data may not begin at A1)
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];

    for row in range.rows() {
        let mut cells = vec![Cell::Empty; start_col as usize];
        cells.extend(row.iter().map(to_cell));
        rows.push(cells);
    }
    rows
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::Error(e) => Cell::Text(format!("#{e:?}")),
        Data::DateTime(dt) => serial_to_datetime(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso(s).map_or_else(|| Cell::Text(s.clone()), Cell::Date),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Excel serial (1900 date system) to a timestamp, rounded to the second.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}
