// Production file discovery

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Folder-name suffix that marks a production item list folder.
pub const PRODUCTION_FOLDER_SUFFIX: &str = "_Production Item List";

/// Workbook extensions considered, compared case-insensitively.
pub const WORKBOOK_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "xlsm"];

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Only files whose parent folder name ends with this suffix are kept.
    /// `None` keeps workbooks from any folder.
    pub folder_suffix: Option<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            folder_suffix: Some(PRODUCTION_FOLDER_SUFFIX.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Candidate workbooks, sorted.
    pub files: Vec<PathBuf>,
    /// Roots that did not exist.
    pub missing: Vec<PathBuf>,
    /// Directories that could not be listed.
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Collect candidate workbooks under `roots`.
///
/// A root that is itself a workbook file is taken as-is. Directories are
/// walked recursively, skipping hidden directories; lock files and other
/// names starting with `~`, `.` or `$` are ignored.
pub fn discover(roots: &[PathBuf], options: &DiscoveryOptions) -> Discovery {
    let mut found = Discovery::default();

    for root in roots {
        if !root.exists() {
            warn!(root = %root.display(), "input root not found");
            found.missing.push(root.clone());
            continue;
        }

        if root.is_file() {
            if is_workbook(root) {
                found.files.push(root.clone());
            } else {
                debug!(path = %root.display(), "not a workbook, skipped");
            }
            continue;
        }

        let before = found.files.len();
        walk(root, options, &mut found);
        info!(
            root = %root.display(),
            files = found.files.len() - before,
            "scanned input folder"
        );
    }

    found.files.sort();
    found.files.dedup();
    found
}

fn walk(dir: &Path, options: &DiscoveryOptions, found: &mut Discovery) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            found.unreadable.push((dir.to_path_buf(), e.to_string()));
            return;
        }
    };

    let in_production_folder = options
        .folder_suffix
        .as_deref()
        .map_or(true, |suffix| {
            dir.file_name()
                .is_some_and(|n| n.to_string_lossy().ends_with(suffix))
        });

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if !name.starts_with('.') {
                walk(&path, options, found);
            }
        } else if in_production_folder && is_workbook(&path) {
            found.files.push(path);
        }
    }
}

fn is_workbook(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    if name.starts_with(['~', '.', '$']) {
        return false;
    }
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.as_str()))
}
