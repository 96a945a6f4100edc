//! The seven-stage run driver.
//!
//! Stages run strictly in order on the calling thread; each one takes the
//! previous stage's output by value or reference and nothing is shared
//! between runs. Progress and log lines go out as [`PipelineEvent`]s.

use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{DuplicateKeyPolicy, Profile};
use crate::consolidate::{consolidate, ExtractionPlan};
use crate::date_filter::{DateFilterOutcome, DateRange, DateRangeFilter};
use crate::error::StageError;
use crate::log::StageLog;
use crate::model::{CanonicalOutput, ConsolidatedDataset, ProvenanceCounts};
use crate::project::{project, OutputPlan};
use crate::reconcile::reconcile;
use crate::source::WorkbookSource;
use crate::tracker::{process_tracker, TrackerPlan};

/// Number of stages in a run.
pub const STAGE_COUNT: u8 = 7;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DiscoverFiles,
    ExtractRecords,
    ProcessTracker,
    CombineDatasets,
    FilterDates,
    FormatOutput,
    SaveOutputs,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::DiscoverFiles,
        Stage::ExtractRecords,
        Stage::ProcessTracker,
        Stage::CombineDatasets,
        Stage::FilterDates,
        Stage::FormatOutput,
        Stage::SaveOutputs,
    ];

    /// 1-based step number.
    pub fn number(self) -> u8 {
        match self {
            Self::DiscoverFiles => 1,
            Self::ExtractRecords => 2,
            Self::ProcessTracker => 3,
            Self::CombineDatasets => 4,
            Self::FilterDates => 5,
            Self::FormatOutput => 6,
            Self::SaveOutputs => 7,
        }
    }

    /// Status line shown while the stage runs.
    pub fn status(self) -> &'static str {
        match self {
            Self::DiscoverFiles => "Scanning folders...",
            Self::ExtractRecords => "Extracting data...",
            Self::ProcessTracker => "Processing tracker...",
            Self::CombineDatasets => "Combining data...",
            Self::FilterDates => "Date filtering...",
            Self::FormatOutput => "Formatting...",
            Self::SaveOutputs => "Saving files...",
        }
    }

    fn banner(self) -> &'static str {
        match self {
            Self::DiscoverFiles => "Scanning production folders...",
            Self::ExtractRecords => "Extracting production data...",
            Self::ProcessTracker => "Processing project tracker...",
            Self::CombineDatasets => "Combining datasets...",
            Self::FilterDates => "Filtering by date range...",
            Self::FormatOutput => "Formatting final output...",
            Self::SaveOutputs => "Saving output files...",
        }
    }

    /// Progress reached once the stage has finished.
    fn progress_after(self) -> u8 {
        match self {
            Self::DiscoverFiles => 20,
            Self::ExtractRecords => 40,
            Self::ProcessTracker => 60,
            Self::CombineDatasets => 70,
            Self::FilterDates => 80,
            Self::FormatOutput => 90,
            Self::SaveOutputs => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DiscoverFiles => "Scanning folders",
            Self::ExtractRecords => "Data extraction",
            Self::ProcessTracker => "Project tracker",
            Self::CombineDatasets => "Combining datasets",
            Self::FilterDates => "Date filtering",
            Self::FormatOutput => "Formatting",
            Self::SaveOutputs => "Saving files",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Events + reporter
// ---------------------------------------------------------------------------

/// Out-of-band notifications for a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Overall progress, 0..=100.
    Progress(u8),
    Status(String),
    /// A timestamped run-log line.
    Log(String),
}

/// Collects the run log and forwards events. Sends never block and a
/// disconnected receiver is ignored.
struct Reporter {
    events: Option<Sender<PipelineEvent>>,
    lines: Vec<String>,
}

impl Reporter {
    fn new(events: Option<Sender<PipelineEvent>>) -> Self {
        Self {
            events,
            lines: Vec::new(),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn progress(&self, pct: u8) {
        self.emit(PipelineEvent::Progress(pct.min(100)));
    }

    fn status(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Status(message.into()));
    }

    fn record(&mut self, message: String) {
        let line = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
        self.emit(PipelineEvent::Log(line.clone()));
        self.lines.push(line);
    }
}

impl StageLog for Reporter {
    fn line(&mut self, message: String) {
        info!(target: "artsync::run", "{message}");
        self.record(message);
    }

    fn warn(&mut self, message: String) {
        warn!(target: "artsync::run", "{message}");
        self.record(message);
    }
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// What a run hands to its output sink.
#[derive(Debug, Clone, Copy)]
pub struct RunArtifacts<'a> {
    pub consolidated: &'a ConsolidatedDataset,
    pub output: &'a CanonicalOutput,
    pub range: DateRange,
}

/// Persists run results. Returns the locations written.
pub trait OutputSink {
    fn save(&mut self, artifacts: &RunArtifacts<'_>) -> Result<Vec<PathBuf>, String>;
}

/// Inputs of one run.
pub struct PipelineInput<'a> {
    pub files: &'a [Box<dyn WorkbookSource>],
    pub tracker: &'a dyn WorkbookSource,
    pub range: DateRange,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub profile: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub elapsed_ms: u64,
    pub files_scanned: usize,
    pub consolidated_records: usize,
    pub tracker_records: usize,
    pub tracker_sheet: String,
    pub reconciled: ProvenanceCounts,
    pub date_filter: DateFilterOutcome,
    pub final_records: usize,
    pub outputs: Vec<PathBuf>,
    pub log: Vec<String>,
}

/// A stage-fatal error together with the log up to the failure.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub error: StageError,
    pub log: Vec<String>,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A pipeline configured from one profile. Reusable across runs.
pub struct Pipeline {
    profile: String,
    extraction: ExtractionPlan,
    tracker: TrackerPlan,
    duplicate_keys: DuplicateKeyPolicy,
    date_filter: DateRangeFilter,
    output: OutputPlan,
    events: Option<Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(profile: &Profile) -> Self {
        Self {
            profile: profile.name.clone(),
            extraction: ExtractionPlan::from_profile(profile),
            tracker: TrackerPlan::from_profile(profile),
            duplicate_keys: profile.reconcile.duplicate_keys,
            date_filter: DateRangeFilter::new(&profile.date_filter),
            output: OutputPlan::from_profile(profile),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn run(&self, input: PipelineInput<'_>, sink: &mut dyn OutputSink) -> Result<RunSummary, RunFailure> {
        let mut reporter = Reporter::new(self.events.clone());
        match self.run_stages(&input, sink, &mut reporter) {
            Ok(mut summary) => {
                summary.log = reporter.lines;
                Ok(summary)
            }
            Err(err) => {
                error!(stage = %err.stage, message = %err.message, "run failed");
                reporter.line("=".repeat(50));
                reporter.line("ERROR OCCURRED!".into());
                reporter.line(format!("Error: {err}"));
                if let Some(hint) = &err.hint {
                    reporter.line(hint.clone());
                }
                reporter.line("=".repeat(50));
                reporter.progress(0);
                reporter.status("Failed");
                Err(RunFailure {
                    error: err,
                    log: reporter.lines,
                })
            }
        }
    }

    fn run_stages(
        &self,
        input: &PipelineInput<'_>,
        sink: &mut dyn OutputSink,
        log: &mut Reporter,
    ) -> Result<RunSummary, StageError> {
        let started = Instant::now();
        let range = input.range;

        log.line("=".repeat(50));
        log.line("STARTING AUTOMATED WORKFLOW".into());
        log.line(format!("Date Range: {} to {}", range.start, range.end));
        log.line("=".repeat(50));
        log.status("Processing... Please wait");
        log.progress(10);

        // 1. Discover
        enter(log, Stage::DiscoverFiles);
        if input.files.is_empty() {
            log.line("ERROR: No Excel files found in any production folders".into());
            return Err(
                StageError::new(Stage::DiscoverFiles, "No production files found in target folders")
                    .with_hint("Check that the input folders exist and contain Excel files."),
            );
        }
        log.line(format!("SUCCESS: Found {} production files", input.files.len()));
        leave(log, Stage::DiscoverFiles);

        // 2. Extract
        enter(log, Stage::ExtractRecords);
        let events = log.events.clone();
        let consolidated = consolidate(input.files, &self.extraction, log, |done, total| {
            if let Some(tx) = &events {
                let pct = 20 + (done * 20 / total.max(1)) as u8;
                let _ = tx.send(PipelineEvent::Progress(pct));
            }
        })?;
        log.line(format!("SUCCESS: Extracted {} records", consolidated.len()));
        leave(log, Stage::ExtractRecords);

        // 3. Tracker
        enter(log, Stage::ProcessTracker);
        let tracker = process_tracker(input.tracker, &self.tracker, log)?;
        leave(log, Stage::ProcessTracker);

        // 4. Combine
        enter(log, Stage::CombineDatasets);
        let reconciled = reconcile(&consolidated, &tracker, self.duplicate_keys, log)?;
        let counts = reconciled.counts();
        log.line(format!("SUCCESS: Combined {} records", reconciled.len()));
        leave(log, Stage::CombineDatasets);

        // 5. Date filter
        enter(log, Stage::FilterDates);
        let (filtered, date_filter) = self.date_filter.apply(reconciled, range, log);
        log.line(format!("SUCCESS: {} records after date filter", filtered.len()));
        leave(log, Stage::FilterDates);

        // 6. Project
        enter(log, Stage::FormatOutput);
        let output = project(&filtered, &self.output)?;
        log.line(format!("Final output: {} records", output.len()));
        log.line(format!("SUCCESS: Formatted {} final records", output.len()));
        leave(log, Stage::FormatOutput);

        // 7. Save
        enter(log, Stage::SaveOutputs);
        let artifacts = RunArtifacts {
            consolidated: &consolidated,
            output: &output,
            range,
        };
        let outputs = sink
            .save(&artifacts)
            .map_err(|e| StageError::new(Stage::SaveOutputs, e))?;
        if outputs.is_empty() {
            return Err(StageError::new(Stage::SaveOutputs, "No files were saved"));
        }
        for path in &outputs {
            let name = path.file_name().map_or_else(
                || path.display().to_string(),
                |n| n.to_string_lossy().into_owned(),
            );
            log.line(format!("Saved: {name}"));
        }
        log.line(format!("SUCCESS: Saved {} files", outputs.len()));
        leave(log, Stage::SaveOutputs);

        let elapsed = started.elapsed();
        log.line("=".repeat(50));
        log.line("WORKFLOW COMPLETED SUCCESSFULLY!".into());
        log.line(format!("Total time: {:.1}s", elapsed.as_secs_f64()));
        log.line("=".repeat(50));
        log.status("Complete!");

        Ok(RunSummary {
            profile: self.profile.clone(),
            start: range.start,
            end: range.end,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            files_scanned: input.files.len(),
            consolidated_records: consolidated.len(),
            tracker_records: tracker.len(),
            tracker_sheet: tracker.sheet.clone(),
            reconciled: counts,
            date_filter,
            final_records: output.len(),
            outputs,
            log: Vec::new(),
        })
    }
}

fn enter(log: &mut Reporter, stage: Stage) {
    log.line(format!("[STEP {}/{STAGE_COUNT}] {}", stage.number(), stage.banner()));
    log.status(format!("Step {}/{STAGE_COUNT}: {}", stage.number(), stage.status()));
}

fn leave(log: &mut Reporter, stage: Stage) {
    log.progress(stage.progress_after());
}
