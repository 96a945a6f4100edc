// Process-level tests for the `artsync` binary.
//
// Workbooks are generated with rust_xlsxwriter into a temp dir and read back
// through the real calamine path.
//
// Run with: cargo test -p artsync-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rust_xlsxwriter::Workbook;

fn artsync() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_artsync"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("ARTSYNC_LOG").env_remove("ARTSYNC_TRACE");
    cmd
}

/// Cells that parse as numbers are written as numbers, like a real export.
fn write_workbook(path: &Path, sheet: &str, rows: &[&[&str]]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name(sheet).unwrap();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match value.parse::<f64>() {
                Ok(n) => worksheet.write_number(r as u32, c as u16, n).unwrap(),
                Err(_) => worksheet.write_string(r as u32, c as u16, *value).unwrap(),
            };
        }
    }
    workbook.save(path).unwrap();
}

struct Fixture {
    _tmp: tempfile::TempDir,
    items: PathBuf,
    tracker: PathBuf,
    out: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let items = tmp.path().join("items");
    write_workbook(
        &items.join("Spring_Production Item List/spring.xlsx"),
        "Items",
        &[
            &["Spring 2024 line review"],
            &[],
            &["Item #", "VBU", "Vendor Name", "Brand", "Item Description", "SKU"],
            &["1001", "12", "Acme", "Kobalt", "Hammer", "New"],
            &["1002", "7", "Acme", "Dewalt", "Drill", "Existing"],
            &["TBD", "7", "Acme", "Dewalt", "Saw", "New"],
        ],
    );
    write_workbook(
        &items.join("Archive/old.xlsx"),
        "Items",
        &[
            &["Item #", "VBU", "Vendor Name", "Brand", "Item Description", "SKU"],
            &["3003", "1", "Old", "Old", "Old", "Old"],
        ],
    );
    let tracker = tmp.path().join("Project Tracker.xlsx");
    write_workbook(
        &tracker,
        "2024",
        &[
            &["PKG3", "File Name", "Rounds", "PKG1", "Artwork Release Date", "Printer Code 1 (LW Code)"],
            &["H-1", "hammer.ai", "File Release", "1001", "15/03/24", "LW9"],
            &["H-2", "drill.ai", "File Re-Release R2", "1002", "20/03/24", ""],
            &["H-3", "saw.ai", "In Progress", "1003", "20/03/24", ""],
        ],
    );
    let out = tmp.path().join("out");
    Fixture { _tmp: tmp, items, tracker, out }
}

fn run_args<'a>(f: &'a Fixture, extra: &[&'a str]) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--tracker".into(),
        f.tracker.display().to_string(),
        "--input".into(),
        f.items.display().to_string(),
        "--output-dir".into(),
        f.out.display().to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    args
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be one JSON value: {e}\n{stdout}"))
}

// ===========================================================================
// artsync run
// ===========================================================================

#[test]
fn run_json_end_to_end() {
    let f = fixture();
    let output = artsync()
        .args(run_args(&f, &["--start", "2024-01-01", "--end", "2024-04-01", "--format", "csv", "--json"]))
        .output()
        .expect("artsync run");

    assert!(
        output.status.success(),
        "exit code: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let summary = stdout_json(&output);
    assert_eq!(summary["profile"], "artwork-release");
    assert_eq!(summary["files_scanned"], 1, "Archive folder is not a production folder");
    assert_eq!(summary["consolidated_records"], 2);
    assert_eq!(summary["tracker_records"], 2);
    assert_eq!(summary["reconciled"]["both_sources"], 2);
    assert_eq!(summary["final_records"], 2);

    let outputs = summary["outputs"].as_array().unwrap();
    assert_eq!(outputs.len(), 2);
    let final_path = PathBuf::from(outputs[1].as_str().unwrap());
    let name = final_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Final_Output_20240101_to_20240401_"), "{name}");

    let csv = std::fs::read_to_string(&final_path).unwrap();
    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("HUGO ID,Product Vendor Company Name,Item Number"));
    let rows: Vec<_> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("H-1,Acme,1001,12,Hammer,Kobalt,New,15/03/24"), "{}", rows[0]);
    assert!(rows[0].contains("LW9"));
    assert!(rows[1].contains(",Yes,"), "{}", rows[1]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WORKFLOW COMPLETED SUCCESSFULLY!"));
    assert!(stderr.contains("final: 2 record(s)"));
}

#[test]
fn any_folder_picks_up_archive() {
    let f = fixture();
    let output = artsync()
        .args(run_args(
            &f,
            &["--start", "2024-01-01", "--end", "2024-04-01", "--any-folder", "--json", "-q"],
        ))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary = stdout_json(&output);
    assert_eq!(summary["files_scanned"], 2);
    assert_eq!(summary["consolidated_records"], 3);
    assert_eq!(summary["final_records"], 2);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("[STEP 1/7]"), "--quiet hides the run log");
}

#[test]
fn inverted_range_is_usage_error() {
    let f = fixture();
    let output = artsync()
        .args(run_args(&f, &["--start", "2024-05-01", "--end", "2024-04-01"]))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("is after end date"));
    assert!(!f.out.exists(), "nothing is written before the range is valid");
}

#[test]
fn no_production_files_fails_step_one() {
    let f = fixture();
    let empty = f.items.join("Empty_Production Item List");
    std::fs::create_dir_all(&empty).unwrap();
    let output = artsync()
        .args([
            "run",
            "--tracker",
            f.tracker.to_str().unwrap(),
            "--input",
            empty.to_str().unwrap(),
            "--output-dir",
            f.out.to_str().unwrap(),
            "--json",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(10));

    let report = stdout_json(&output);
    assert_eq!(report["status"], "failed");
    assert_eq!(report["step"], 1);
    assert_eq!(report["stage"], "discover_files");
    assert_eq!(report["exit_code"], 10);
    assert!(report["hint"].as_str().unwrap().contains("input folders"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: Step 1 Failed"));
    assert!(stderr.contains("hint:"));
}

#[test]
fn missing_tracker_fails_step_three() {
    let f = fixture();
    let mut args = run_args(&f, &["--start", "2024-01-01", "--end", "2024-04-01"]);
    args[2] = f.items.join("nope.xlsx").display().to_string();
    let output = artsync().args(args).output().unwrap();
    assert_eq!(output.status.code(), Some(12));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Step 3 Failed"));
}

#[test]
fn invalid_profile_exits_three() {
    let f = fixture();
    let bad = f.out.with_file_name("bad.toml");
    std::fs::write(&bad, "name = \"x\"\nversion = 2\n").unwrap();
    let output = artsync()
        .args(run_args(&f, &["--profile", bad.to_str().unwrap()]))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

// ===========================================================================
// artsync profile
// ===========================================================================

#[test]
fn shown_profile_validates() {
    let tmp = tempfile::tempdir().unwrap();
    let shown = artsync().args(["profile", "show"]).output().unwrap();
    assert!(shown.status.success());
    let path = tmp.path().join("profile.toml");
    std::fs::write(&path, &shown.stdout).unwrap();

    let output = artsync()
        .args(["profile", "validate", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("valid: profile 'artwork-release' v1"));
    assert!(stderr.contains("19 output column(s)"));
    assert!(stderr.contains("extensions: printer_code"));
}

#[test]
fn validate_missing_file_is_usage_error() {
    let output = artsync()
        .args(["profile", "validate", "/definitely/not/here.toml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}
