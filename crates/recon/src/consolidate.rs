//! Concurrent extraction across candidate workbooks, then key dedup.

use std::collections::HashSet;
use std::sync::mpsc;

use rayon::ThreadPoolBuilder;
use tracing::{debug, warn};

use crate::config::{DedupOrder, Profile};
use crate::error::{ItemError, StageError};
use crate::extract::{RecordOrigin, SheetExtractor};
use crate::log::StageLog;
use crate::model::{ConsolidatedDataset, ExtractedRecord};
use crate::pipeline::Stage;
use crate::schema::{infer_header, ColumnPatternTable};
use crate::source::WorkbookSource;

/// Everything a worker needs to process one file. Shared read-only.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub table: ColumnPatternTable,
    pub extractor: SheetExtractor,
    pub header_scan_rows: usize,
    pub sample_rows: usize,
    pub max_workers: usize,
    pub order: DedupOrder,
    pub progress_every: usize,
}

impl ExtractionPlan {
    pub fn from_profile(profile: &Profile) -> Self {
        let cfg = &profile.extraction;
        Self {
            table: profile.extraction_table(),
            extractor: SheetExtractor {
                fields: profile
                    .extraction_fields()
                    .into_iter()
                    .map(|f| f.name.clone())
                    .collect(),
                key_field: cfg.key_field.clone(),
                max_rows: cfg.max_rows,
            },
            header_scan_rows: cfg.header_scan_rows,
            sample_rows: cfg.sample_rows,
            max_workers: cfg.max_workers,
            order: cfg.order,
            progress_every: cfg.progress_every,
        }
    }

    /// Pool size: the configured bound, capped by the CPU count.
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism().map_or(4, |n| n.get());
        self.max_workers.min(cpus).max(1)
    }
}

/// Result of one file, sent from a worker to the driver.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// Position of the file in the input list.
    pub index: usize,
    pub file_name: String,
    /// Records unique by key within this file, sheet order preserved.
    pub records: Vec<ExtractedRecord>,
    /// Skipped sheets, or the whole file when it could not be opened.
    pub issues: Vec<ItemError>,
    pub sheets_matched: usize,
}

impl FileOutcome {
    fn failed(index: usize, file_name: String, issue: ItemError) -> Self {
        Self {
            index,
            file_name,
            records: Vec::new(),
            issues: vec![issue],
            sheets_matched: 0,
        }
    }
}

/// Extract every sheet of one workbook. Never fails; problems become issues.
pub fn extract_file(source: &dyn WorkbookSource, index: usize, plan: &ExtractionPlan) -> FileOutcome {
    let file_name = source.file_name();
    let origin = RecordOrigin {
        file: file_name.clone(),
        folder: source.folder_name(),
    };

    let mut reader = match source.open() {
        Ok(r) => r,
        Err(e) => {
            return FileOutcome::failed(index, file_name.clone(), ItemError::file(file_name, e.to_string()));
        }
    };

    let mut records = Vec::new();
    let mut issues = Vec::new();
    let mut sheets_matched = 0;

    for sheet_name in reader.sheet_names() {
        let sheet = match reader.read_sheet(&sheet_name) {
            Ok(s) => s,
            Err(e) => {
                issues.push(ItemError::sheet(&file_name, &sheet_name, e.to_string()));
                continue;
            }
        };

        let sample: Vec<Vec<String>> = (0..sheet.height().min(plan.sample_rows))
            .map(|row| sheet.row_text(row))
            .collect();
        if sample.iter().all(|row| row.iter().all(|c| c.is_empty())) {
            continue;
        }

        let Some(header) = infer_header(&sample, &plan.table, plan.header_scan_rows) else {
            debug!(file = %file_name, sheet = %sheet_name, "no header row found");
            continue;
        };

        let extracted = plan.extractor.extract(&sheet, header.row, &header.mapping, &origin);
        if !extracted.is_empty() {
            sheets_matched += 1;
            records.extend(extracted);
        }
    }

    FileOutcome {
        index,
        file_name,
        records: dedup_by_key(records, &plan.extractor.key_field),
        issues,
        sheets_matched,
    }
}

/// Keep the first record per key, preserving order.
fn dedup_by_key(records: Vec<ExtractedRecord>, key_field: &str) -> Vec<ExtractedRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.get(key_field).unwrap_or_default().to_string()))
        .collect()
}

/// Run extraction over all files and merge the results.
///
/// Workers run on a bounded rayon pool and send [`FileOutcome`]s over a
/// channel; this thread is the only consumer, so logging and `on_progress`
/// never run concurrently. `on_progress(completed, total)` fires every
/// `progress_every` files and on the last one.
pub fn consolidate(
    sources: &[Box<dyn WorkbookSource>],
    plan: &ExtractionPlan,
    log: &mut dyn StageLog,
    mut on_progress: impl FnMut(usize, usize),
) -> Result<ConsolidatedDataset, StageError> {
    let total = sources.len();
    let workers = plan.worker_count();
    log.line(format!("Using {workers} parallel workers..."));

    let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(total);
    let mut completed = 0;
    let mut handle = |outcome: FileOutcome, log: &mut dyn StageLog| {
        completed += 1;
        report_file(&outcome, log);
        if completed % plan.progress_every.max(1) == 0 || completed == total {
            on_progress(completed, total);
            log.line(format!("  Progress: {completed}/{total} files processed"));
        }
        outcomes.push(outcome);
    };

    let pool = if workers > 1 {
        match ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(workers, error = %e, "thread pool unavailable, extracting serially");
                log.warn(format!(
                    "Failed to initialize thread pool (workers={workers}); falling back to serial extraction"
                ));
                None
            }
        }
    } else {
        None
    };

    match pool {
        Some(pool) => {
            let (tx, rx) = mpsc::channel::<FileOutcome>();
            pool.in_place_scope(|scope| {
                for (index, source) in sources.iter().enumerate() {
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        // The receiver outlives every worker.
                        let _ = tx.send(extract_file(source.as_ref(), index, plan));
                    });
                }
                drop(tx);
                for outcome in rx {
                    handle(outcome, &mut *log);
                }
            });
        }
        None => {
            for (index, source) in sources.iter().enumerate() {
                handle(extract_file(source.as_ref(), index, plan), &mut *log);
            }
        }
    }

    if plan.order == DedupOrder::Input {
        outcomes.sort_by_key(|o| o.index);
    }

    let fields = plan.extractor.fields.clone();
    let key_field = plan.extractor.key_field.clone();
    let records = dedup_by_key(
        outcomes.into_iter().flat_map(|o| o.records).collect(),
        &key_field,
    );

    if records.is_empty() {
        log.line("ERROR: No data extracted from any files".into());
        return Err(
            StageError::new(Stage::ExtractRecords, "No valid data extracted from production files")
                .with_hint("Check that Excel files contain the expected columns (Item Number, VBU, etc.)."),
        );
    }

    let dataset = ConsolidatedDataset {
        key_field,
        fields,
        records,
    };

    if dataset.fields.iter().any(|f| f == "VBU") {
        log.line(format!(
            "  VBU data: {} records have VBU values",
            dataset.populated("VBU")
        ));
    }
    log.line(format!("TOTAL: {} valid records extracted", dataset.len()));

    Ok(dataset)
}

fn report_file(outcome: &FileOutcome, log: &mut dyn StageLog) {
    for issue in &outcome.issues {
        warn!(%issue, "skipped");
        log.warn(format!("  [X] {issue}"));
    }
    if !outcome.records.is_empty() {
        log.line(format!(
            "  [OK] {}: {} records",
            outcome.file_name,
            outcome.records.len()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sheet;
    use crate::source::MemoryWorkbook;

    fn plan() -> ExtractionPlan {
        ExtractionPlan::from_profile(&Profile::builtin().unwrap())
    }

    fn sheet(name: &str, rows: &[&[&str]]) -> Sheet {
        Sheet::from_text(name, rows.iter().map(|r| r.to_vec()))
    }

    fn book(name: &str, rows: &[&[&str]]) -> MemoryWorkbook {
        MemoryWorkbook::new(name, "Spring_Production Item List").with_sheet(sheet("Items", rows))
    }

    const HEADER: &[&str] = &["Item #", "VBU", "Vendor Name", "Brand"];

    #[test]
    fn scans_every_sheet_and_dedups_within_file() {
        let source = MemoryWorkbook::new("a.xlsx", "F")
            .with_sheet(sheet("Notes", &[&["just notes"]]))
            .with_sheet(sheet("Main", &[HEADER, &["1001", "12", "Acme", "Kobalt"]]))
            .with_sheet(sheet(
                "Backup",
                &[HEADER, &["1001", "12", "Other", "Kobalt"], &["1002", "7", "Zeta", "Dewalt"]],
            ));
        let outcome = extract_file(&source, 0, &plan());
        assert_eq!(outcome.sheets_matched, 2);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].get("Product Vendor Company Name"), Some("Acme"));
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn broken_sheet_is_an_issue_not_a_failure() {
        let source = book("a.xlsx", &[HEADER, &["1001", "12", "Acme", "Kobalt"]]).with_broken_sheet("Bad");
        let outcome = extract_file(&source, 3, &plan());
        assert_eq!(outcome.index, 3);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.issues[0].to_string().contains("sheet 'Bad'"));
    }

    #[test]
    fn consolidated_keys_are_unique() {
        let sources: Vec<Box<dyn WorkbookSource>> = (0..12)
            .map(|i| {
                let key = format!("{}", 1000 + i % 5);
                Box::new(book(&format!("f{i}.xlsx"), &[HEADER, &[key.as_str(), "1", "V", "B"]]))
                    as Box<dyn WorkbookSource>
            })
            .collect();
        let mut log: Vec<String> = Vec::new();
        let mut ticks = Vec::new();
        let data = consolidate(&sources, &plan(), &mut log, |done, total| ticks.push((done, total))).unwrap();

        assert_eq!(data.len(), 5);
        let keys: HashSet<_> = data.records.iter().map(|r| r.get("Item Number").unwrap()).collect();
        assert_eq!(keys.len(), data.len());
        assert_eq!(ticks, vec![(10, 12), (12, 12)]);
        assert!(log.iter().any(|l| l.contains("TOTAL: 5 valid records")));
    }

    #[test]
    fn input_order_makes_first_file_win() {
        let sources: Vec<Box<dyn WorkbookSource>> = vec![
            Box::new(book("a.xlsx", &[HEADER, &["1001", "1", "First", "B"]])),
            Box::new(book("b.xlsx", &[HEADER, &["1001", "1", "Second", "B"]])),
        ];
        let mut plan = plan();
        plan.order = DedupOrder::Input;
        let data = consolidate(&sources, &plan, &mut Vec::<String>::new(), |_, _| {}).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].get("Product Vendor Company Name"), Some("First"));
        assert_eq!(data.records[0].source_file, "a.xlsx");
    }

    #[test]
    fn serial_path_matches_pool_path() {
        let sources: Vec<Box<dyn WorkbookSource>> = vec![
            Box::new(book("a.xlsx", &[HEADER, &["1001", "1", "V", "B"]])),
            Box::new(MemoryWorkbook::new("broken.xlsx", "F").unreadable("bad zip")),
        ];
        let mut plan = plan();
        plan.max_workers = 1;
        let mut log: Vec<String> = Vec::new();
        let data = consolidate(&sources, &plan, &mut log, |_, _| {}).unwrap();
        assert_eq!(data.len(), 1);
        assert!(log.iter().any(|l| l.contains("[X] broken.xlsx")));
    }

    #[test]
    fn zero_progress_interval_reports_every_file() {
        let sources: Vec<Box<dyn WorkbookSource>> = vec![
            Box::new(book("a.xlsx", &[HEADER, &["1001", "1", "V", "B"]])),
            Box::new(book("b.xlsx", &[HEADER, &["1002", "1", "V", "B"]])),
        ];
        let mut plan = plan();
        plan.progress_every = 0;
        let mut ticks = Vec::new();
        consolidate(&sources, &plan, &mut Vec::<String>::new(), |done, total| ticks.push((done, total))).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks.last(), Some(&(2, 2)));
    }

    #[test]
    fn nothing_extracted_fails_the_stage() {
        let sources: Vec<Box<dyn WorkbookSource>> =
            vec![Box::new(book("a.xlsx", &[&["Notes"], &["TBD"]]))];
        let err = consolidate(&sources, &plan(), &mut Vec::<String>::new(), |_, _| {}).unwrap_err();
        assert_eq!(err.stage, Stage::ExtractRecords);
        assert!(err.hint.unwrap().contains("Item Number, VBU"));
    }
}
