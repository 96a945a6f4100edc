//! Filesystem collaborators for the artsync engine.
//!
//! - [`xlsx`] backs `WorkbookSource` with calamine
//! - [`discover`] finds candidate production workbooks
//! - [`export`] writes run results as xlsx or csv

pub mod discover;
pub mod export;
pub mod xlsx;

pub use discover::{discover, Discovery, DiscoveryOptions};
pub use export::{OutputFormat, RunFiles};
pub use xlsx::XlsxSource;
