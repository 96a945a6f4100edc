//! Workbook collaborator seam.
//!
//! The engine never touches the filesystem. Callers hand it
//! [`WorkbookSource`]s; `artsync-io` backs them with calamine, tests back
//! them with [`MemoryWorkbook`].

use crate::error::WorkbookError;
use crate::model::Sheet;

/// A workbook that can be opened on demand, typically once per worker.
pub trait WorkbookSource: Send + Sync {
    /// Base file name, used for provenance and logging.
    fn file_name(&self) -> String;

    /// Name of the immediate parent folder.
    fn folder_name(&self) -> String;

    fn open(&self) -> Result<Box<dyn SheetReader + '_>, WorkbookError>;
}

/// An opened workbook. Hidden sheets are listed like any other.
pub trait SheetReader {
    fn sheet_names(&self) -> Vec<String>;

    fn read_sheet(&mut self, name: &str) -> Result<Sheet, WorkbookError>;
}

/// In-memory workbook.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    pub file_name: String,
    pub folder: String,
    pub sheets: Vec<Sheet>,
    /// When set, `open` fails with this message.
    pub open_error: Option<String>,
    /// Sheets whose reads fail with a sheet error.
    pub broken_sheets: Vec<String>,
}

impl MemoryWorkbook {
    pub fn new(file_name: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            folder: folder.into(),
            ..Self::default()
        }
    }

    pub fn with_sheet(mut self, sheet: Sheet) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn unreadable(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    pub fn with_broken_sheet(mut self, name: impl Into<String>) -> Self {
        self.broken_sheets.push(name.into());
        self
    }
}

struct MemoryReader<'a> {
    book: &'a MemoryWorkbook,
}

impl WorkbookSource for MemoryWorkbook {
    fn file_name(&self) -> String {
        self.file_name.clone()
    }

    fn folder_name(&self) -> String {
        self.folder.clone()
    }

    fn open(&self) -> Result<Box<dyn SheetReader + '_>, WorkbookError> {
        if let Some(message) = &self.open_error {
            return Err(WorkbookError::Open {
                file: self.file_name.clone(),
                message: message.clone(),
            });
        }
        Ok(Box::new(MemoryReader { book: self }))
    }
}

impl SheetReader for MemoryReader<'_> {
    fn sheet_names(&self) -> Vec<String> {
        self.book
            .sheets
            .iter()
            .map(|s| s.name.clone())
            .chain(self.book.broken_sheets.iter().cloned())
            .collect()
    }

    fn read_sheet(&mut self, name: &str) -> Result<Sheet, WorkbookError> {
        if self.book.broken_sheets.iter().any(|s| s == name) {
            return Err(WorkbookError::Sheet {
                sheet: name.to_string(),
                message: "unreadable sheet".into(),
            });
        }
        self.book
            .sheets
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| WorkbookError::Sheet {
                sheet: name.to_string(),
                message: "no such sheet".into(),
            })
    }
}
