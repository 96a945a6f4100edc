//! CLI Exit Code Registry
//!
//! Single source of truth for `artsync` exit codes. Scripts rely on them.
//!
//! | Range   | Domain    | Description                                 |
//! |---------|-----------|---------------------------------------------|
//! | 0       | Universal | Success                                     |
//! | 1       | Universal | General error (unspecified)                 |
//! | 2       | Universal | Usage error (bad args, unreadable file)     |
//! | 3       | profile   | Profile failed to parse or validate         |
//! | 10-16   | run       | Stage failure, one code per pipeline stage  |

use artsync_recon::Stage;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, inverted date range, unreadable profile file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Profile (3)
// =============================================================================

/// Profile TOML did not parse or failed validation.
pub const EXIT_PROFILE_INVALID: u8 = 3;

// =============================================================================
// Run stages (10-16)
// =============================================================================

/// Step 1: no input files found.
pub const EXIT_STAGE_DISCOVER: u8 = 10;

/// Step 2: no records could be extracted.
pub const EXIT_STAGE_EXTRACT: u8 = 11;

/// Step 3: tracker unreadable or without accepted rows.
pub const EXIT_STAGE_TRACKER: u8 = 12;

/// Step 4: join produced nothing.
pub const EXIT_STAGE_COMBINE: u8 = 13;

/// Step 5: date filtering failed.
pub const EXIT_STAGE_FILTER: u8 = 14;

/// Step 6: output projection failed.
pub const EXIT_STAGE_FORMAT: u8 = 15;

/// Step 7: output files could not be written.
pub const EXIT_STAGE_SAVE: u8 = 16;

/// Map a failed stage to its exit code.
pub fn stage_exit_code(stage: Stage) -> u8 {
    match stage {
        Stage::DiscoverFiles => EXIT_STAGE_DISCOVER,
        Stage::ExtractRecords => EXIT_STAGE_EXTRACT,
        Stage::ProcessTracker => EXIT_STAGE_TRACKER,
        Stage::CombineDatasets => EXIT_STAGE_COMBINE,
        Stage::FilterDates => EXIT_STAGE_FILTER,
        Stage::FormatOutput => EXIT_STAGE_FORMAT,
        Stage::SaveOutputs => EXIT_STAGE_SAVE,
    }
}
