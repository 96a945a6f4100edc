//! `artsync-recon`: Heuristic spreadsheet extraction and tracker
//! reconciliation engine.
//!
//! Pure engine crate: receives workbook handles and a date range, returns
//! canonical output records plus a run log. File discovery, workbook parsing
//! and export live in `artsync-io`.

pub mod config;
pub mod consolidate;
pub mod date_filter;
pub mod error;
pub mod extract;
pub mod log;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod project;
pub mod reconcile;
pub mod schema;
pub mod source;
pub mod tracker;

pub use config::Profile;
pub use date_filter::DateRange;
pub use error::{ConfigError, ItemError, StageError, WorkbookError};
pub use model::{CanonicalOutput, Cell, ConsolidatedDataset, Sheet};
pub use pipeline::{
    OutputSink, Pipeline, PipelineEvent, PipelineInput, RunArtifacts, RunFailure, RunSummary, Stage,
};
pub use source::{MemoryWorkbook, SheetReader, WorkbookSource};
