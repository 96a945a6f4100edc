use std::fmt;

use crate::pipeline::Stage;

/// Profile loading failures.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parse / deserialization error.
    Parse(String),
    /// Profile validation error (unknown version, missing key field, etc.).
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "profile parse error: {msg}"),
            Self::Validation(msg) => write!(f, "profile validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failures raised by a workbook collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkbookError {
    /// The workbook could not be opened at all.
    Open { file: String, message: String },
    /// A single sheet could not be read.
    Sheet { sheet: String, message: String },
}

impl fmt::Display for WorkbookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { file, message } => write!(f, "cannot open '{file}': {message}"),
            Self::Sheet { sheet, message } => write!(f, "cannot read sheet '{sheet}': {message}"),
        }
    }
}

impl std::error::Error for WorkbookError {}

// ---------------------------------------------------------------------------
// Two-tier run errors
// ---------------------------------------------------------------------------

/// The unit an [`ItemError`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemUnit {
    File { file: String },
    Sheet { file: String, sheet: String },
    DateColumn { column: String },
}

impl fmt::Display for ItemUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { file } => write!(f, "{file}"),
            Self::Sheet { file, sheet } => write!(f, "{file} / sheet '{sheet}'"),
            Self::DateColumn { column } => write!(f, "date column '{column}'"),
        }
    }
}

/// A recoverable, per-unit failure. The unit is skipped and the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub unit: ItemUnit,
    pub message: String,
}

impl ItemError {
    pub fn file(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: ItemUnit::File { file: file.into() },
            message: message.into(),
        }
    }

    pub fn sheet(file: impl Into<String>, sheet: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: ItemUnit::Sheet {
                file: file.into(),
                sheet: sheet.into(),
            },
            message: message.into(),
        }
    }

    pub fn date_column(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: ItemUnit::DateColumn { column: column.into() },
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.message)
    }
}

impl std::error::Error for ItemError {}

/// A stage-fatal failure. The pipeline aborts and no later stage runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
    /// Remediation hint for the operator, when one is known.
    pub hint: Option<String>,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step {} Failed - {}: {}",
            self.stage.number(),
            self.stage,
            self.message
        )
    }
}

impl std::error::Error for StageError {}
