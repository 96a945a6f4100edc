//! `artsync run`: discovery, the seven-step pipeline, and output files.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use chrono::{Duration, Local, NaiveDate};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use artsync_io::{discover, DiscoveryOptions, OutputFormat, RunFiles, XlsxSource};
use artsync_recon::{
    DateRange, Pipeline, PipelineEvent, PipelineInput, RunFailure, RunSummary, WorkbookSource,
};

use crate::exit_codes::{stage_exit_code, EXIT_ERROR};
use crate::profile::load_profile;
use crate::CliError;

/// Length of the default date window, ending today.
pub const DEFAULT_WINDOW_DAYS: i64 = 90;

/// Created under the desktop (or home) directory when `--output-dir` is absent.
pub const DEFAULT_OUTPUT_FOLDER: &str = "Automated_Data_Processing_Output";

#[derive(Args)]
pub struct RunArgs {
    /// Project tracker workbook
    #[arg(long, short = 't')]
    tracker: PathBuf,

    /// Folder to scan or workbook to include. Repeatable.
    #[arg(long, short = 'i', required = true, value_name = "DIR_OR_FILE")]
    input: Vec<PathBuf>,

    /// First release date to keep (YYYY-MM-DD, default: 90 days before --end)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last release date to keep (YYYY-MM-DD, default: today)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Profile TOML (default: built-in artwork-release profile)
    #[arg(long, short = 'p')]
    profile: Option<PathBuf>,

    /// Folder for the output workbooks
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Output file format
    #[arg(long, value_enum, default_value = "xlsx")]
    format: ExportFormat,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Include workbooks from any folder, not only "*_Production Item List"
    #[arg(long)]
    any_folder: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    Xlsx,
    Csv,
}

impl From<ExportFormat> for OutputFormat {
    fn from(f: ExportFormat) -> Self {
        match f {
            ExportFormat::Xlsx => OutputFormat::Xlsx,
            ExportFormat::Csv => OutputFormat::Csv,
        }
    }
}

/// `--json` shape for a failed run.
#[derive(Serialize)]
struct FailureReport<'a> {
    status: &'static str,
    step: u8,
    stage: artsync_recon::Stage,
    message: &'a str,
    hint: Option<&'a str>,
    exit_code: u8,
    log: &'a [String],
}

pub fn cmd_run(args: RunArgs, quiet: bool) -> Result<(), CliError> {
    let profile = load_profile(args.profile.as_deref())?;
    let range = resolve_range(args.start, args.end, Local::now().date_naive())?;

    let options = if args.any_folder {
        DiscoveryOptions { folder_suffix: None }
    } else {
        DiscoveryOptions::default()
    };
    let found = discover(&args.input, &options);
    for root in &found.missing {
        eprintln!("warning: input not found: {}", root.display());
    }
    for (dir, reason) in &found.unreadable {
        warn!(dir = %dir.display(), %reason, "cannot list folder");
    }

    let files: Vec<Box<dyn WorkbookSource>> = found
        .files
        .iter()
        .map(|p| Box::new(XlsxSource::new(p)) as Box<dyn WorkbookSource>)
        .collect();
    let tracker = XlsxSource::new(&args.tracker);

    let output_dir = args.output_dir.unwrap_or_else(default_output_dir);
    let mut sink = RunFiles::new(&output_dir, args.format.into());
    info!(
        profile = %profile.name,
        files = files.len(),
        range = %range,
        output = %output_dir.display(),
        "starting run"
    );

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            if let PipelineEvent::Log(line) = event {
                if !quiet {
                    eprintln!("{line}");
                }
            }
        }
    });

    let pipeline = Pipeline::new(&profile).with_events(tx);
    let result = pipeline.run(
        PipelineInput {
            files: &files,
            tracker: &tracker,
            range,
        },
        &mut sink,
    );
    // Closes the channel so the printer drains and exits.
    drop(pipeline);
    let _ = printer.join();

    match result {
        Ok(summary) => {
            if args.json {
                print_json(&summary)?;
            }
            print_summary(&summary);
            Ok(())
        }
        Err(failure) => {
            let code = stage_exit_code(failure.error.stage);
            if args.json {
                print_json(&failure_report(&failure, code))?;
            }
            let mut err = CliError::new(code, failure.to_string());
            err.hint = failure.error.hint.clone();
            Err(err)
        }
    }
}

/// Fill in missing bounds and reject an inverted range.
fn resolve_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<DateRange, CliError> {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));
    if start > end {
        return Err(CliError::args(format!(
            "start date {start} is after end date {end}"
        ))
        .with_hint("pass --start on or before --end"));
    }
    Ok(DateRange::new(start, end))
}

fn default_output_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_OUTPUT_FOLDER)
}

fn failure_report(failure: &RunFailure, exit_code: u8) -> FailureReport<'_> {
    FailureReport {
        status: "failed",
        step: failure.error.stage.number(),
        stage: failure.error.stage,
        message: &failure.error.message,
        hint: failure.error.hint.as_deref(),
        exit_code,
        log: &failure.log,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Human summary to stderr.
fn print_summary(s: &RunSummary) {
    let r = &s.reconciled;
    eprintln!(
        "run '{}' {} to {}: {} file(s), {} item record(s), {} tracker row(s) from '{}'",
        s.profile, s.start, s.end, s.files_scanned, s.consolidated_records, s.tracker_records, s.tracker_sheet,
    );
    eprintln!(
        "combined: {} ({} both, {} item list only, {} tracker only)",
        r.total(),
        r.both_sources,
        r.consolidated_only,
        r.tracker_only,
    );
    match &s.date_filter.column {
        Some(column) => eprintln!(
            "date filter on '{}': {} kept, {} out of range, {} unparseable{}",
            column,
            s.date_filter.kept,
            s.date_filter.out_of_range,
            s.date_filter.unparseable,
            if s.date_filter.degraded { " (not applied)" } else { "" },
        ),
        None => eprintln!("date filter: no date column, all rows kept"),
    }
    eprintln!(
        "final: {} record(s) in {:.1}s",
        s.final_records,
        s.elapsed_ms as f64 / 1000.0
    );
    for path in &s.outputs {
        eprintln!("wrote {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes::EXIT_USAGE;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_window_is_ninety_days_to_today() {
        let range = resolve_range(None, None, date(2024, 4, 1)).unwrap();
        assert_eq!(range.end, date(2024, 4, 1));
        assert_eq!(range.start, date(2024, 1, 2));
    }

    #[test]
    fn explicit_bounds_are_kept() {
        let range = resolve_range(Some(date(2024, 1, 1)), Some(date(2024, 1, 1)), date(2030, 1, 1)).unwrap();
        assert_eq!((range.start, range.end), (date(2024, 1, 1), date(2024, 1, 1)));
    }

    #[test]
    fn start_after_end_is_usage_error() {
        let err = resolve_range(Some(date(2024, 5, 1)), Some(date(2024, 4, 1)), date(2024, 6, 1)).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
        assert!(err.message.contains("after end date"));
    }

    #[test]
    fn output_dir_ends_with_folder_name() {
        assert!(default_output_dir().ends_with(DEFAULT_OUTPUT_FOLDER));
    }
}
