//! `artsync profile`: dump and validate reconciliation profiles.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use artsync_recon::config::DEFAULT_PROFILE;
use artsync_recon::Profile;

use crate::exit_codes::{EXIT_PROFILE_INVALID, EXIT_USAGE};
use crate::CliError;

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Print the built-in profile as TOML
    #[command(after_help = "\
Examples:
  artsync profile show > custom.toml")]
    Show,

    /// Parse and validate a profile without running
    #[command(after_help = "\
Examples:
  artsync profile validate custom.toml")]
    Validate {
        /// Path to the profile TOML file
        path: PathBuf,
    },
}

pub fn cmd_profile(cmd: ProfileCommands) -> Result<(), CliError> {
    match cmd {
        ProfileCommands::Show => {
            print!("{DEFAULT_PROFILE}");
            Ok(())
        }
        ProfileCommands::Validate { path } => {
            let profile = load_profile(Some(&path))?;
            eprintln!(
                "valid: profile '{}' v{} with {} extraction field(s), {} tracker field(s), {} output column(s)",
                profile.name,
                profile.version,
                profile.extraction.fields.len(),
                profile.tracker.fields.len(),
                profile.output.columns.len(),
            );
            if !profile.extensions.is_empty() {
                eprintln!("extensions: {}", profile.extensions.join(", "));
            }
            Ok(())
        }
    }
}

/// The profile at `path`, or the built-in one.
pub fn load_profile(path: Option<&Path>) -> Result<Profile, CliError> {
    match path {
        None => Profile::builtin().map_err(|e| CliError::new(EXIT_PROFILE_INVALID, e.to_string())),
        Some(path) => {
            let input = std::fs::read_to_string(path).map_err(|e| {
                CliError::new(EXIT_USAGE, format!("cannot read profile {}: {e}", path.display()))
            })?;
            Profile::from_toml(&input).map_err(|e| {
                CliError::new(EXIT_PROFILE_INVALID, format!("{}: {e}", path.display()))
                    .with_hint("run `artsync profile show` for a working template")
            })
        }
    }
}
