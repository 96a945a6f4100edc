// artsync CLI - headless artwork release reconciliation runs

mod exit_codes;
mod profile;
mod run;

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};
use profile::ProfileCommands;
use run::RunArgs;

#[derive(Parser)]
#[command(name = "artsync")]
#[command(about = "Consolidate production item lists and reconcile them against the project tracker")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Diagnostic log level (run log lines are printed regardless)
    #[arg(long, global = true, value_enum, default_value = "warn", env = "ARTSYNC_LOG")]
    log_level: LogLevel,

    /// Suppress the streamed run log on stderr
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the seven-step workflow and write the output workbooks
    #[command(after_help = "\
Examples:
  artsync run --tracker 'Project Tracker.xlsx' --input ~/Lowes/Items
  artsync run --tracker tracker.xlsx --input items/ --start 2024-01-01 --end 2024-04-01
  artsync run --tracker tracker.xlsx --input a.xlsx --input b.xlsx --any-folder --json
  artsync run --tracker tracker.xlsx --input items/ --profile custom.toml --format csv")]
    Run(RunArgs),

    /// Inspect or validate reconciliation profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  artsync-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\nprofile_version: 1",
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  artsync-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\nprofile_version: 1",
        )
    }
}

/// Diagnostics go to stderr; stdout is reserved for `--json` output.
/// The run log already streams through pipeline events, so its tracing
/// mirror is off unless `ARTSYNC_TRACE` asks for it.
fn init_tracing(level: LogLevel, quiet: bool) {
    let fallback = if quiet { "error" } else { level.as_filter() };
    let filter = EnvFilter::try_from_env("ARTSYNC_TRACE")
        .or_else(|_| EnvFilter::try_new(format!("{fallback},artsync::run=off")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level, cli.quiet);

    let result = match cli.command {
        Commands::Run(args) => run::cmd_run(args, cli.quiet),
        Commands::Profile { command } => profile::cmd_profile(command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
