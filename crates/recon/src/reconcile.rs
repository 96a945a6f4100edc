//! Full outer join of the consolidated and tracker datasets.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::config::DuplicateKeyPolicy;
use crate::error::StageError;
use crate::log::StageLog;
use crate::model::{
    ConsolidatedDataset, ExtractedRecord, Provenance, ReconciledDataset, ReconciledRecord,
    TrackerDataset, TrackerRecord, MERGE_KEY_COLUMN, PROVENANCE_COLUMN,
};
use crate::normalize::normalize_key;
use crate::pipeline::Stage;

/// Join both sides on the digit-only key.
///
/// Rows whose key normalizes to `""` are dropped first. Output is ordered by
/// key; under [`DuplicateKeyPolicy::FanOut`] a key present in several tracker
/// rows yields one joined row per tracker row.
pub fn reconcile(
    consolidated: &ConsolidatedDataset,
    tracker: &TrackerDataset,
    policy: DuplicateKeyPolicy,
    log: &mut dyn StageLog,
) -> Result<ReconciledDataset, StageError> {
    if consolidated.is_empty() || tracker.is_empty() {
        return Err(StageError::new(
            Stage::CombineDatasets,
            "Cannot combine: consolidated or tracker data is empty",
        ));
    }

    let mut left: BTreeMap<String, Vec<&ExtractedRecord>> = BTreeMap::new();
    for record in &consolidated.records {
        let key = normalize_key(record.get(&consolidated.key_field).unwrap_or_default());
        if !key.is_empty() {
            left.entry(key).or_default().push(record);
        }
    }

    let mut right: BTreeMap<String, Vec<&TrackerRecord>> = BTreeMap::new();
    for record in &tracker.records {
        let key = normalize_key(&record.merge_key);
        if !key.is_empty() {
            right.entry(key).or_default().push(record);
        }
    }

    let duplicated = right.values().filter(|rows| rows.len() > 1).count();
    if duplicated > 0 {
        log.warn(format!(
            "  {duplicated} tracker key(s) appear on several rows (policy: {policy})"
        ));
        for rows in right.values_mut() {
            collapse(rows, policy);
        }
    }

    let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
    let mut records = Vec::new();
    for key in keys {
        let lhs = left.get(key).map(Vec::as_slice).unwrap_or_default();
        let rhs = right.get(key).map(Vec::as_slice).unwrap_or_default();
        match (lhs.is_empty(), rhs.is_empty()) {
            (false, false) => {
                for l in lhs {
                    for r in rhs {
                        records.push(joined(key, Provenance::BothSources, Some(*l), Some(*r)));
                    }
                }
            }
            (false, true) => {
                records.extend(lhs.iter().map(|l| joined(key, Provenance::ConsolidatedOnly, Some(*l), None)));
            }
            (true, false) => {
                records.extend(rhs.iter().map(|r| joined(key, Provenance::TrackerOnly, None, Some(*r))));
            }
            (true, true) => {}
        }
    }

    if records.is_empty() {
        return Err(StageError::new(
            Stage::CombineDatasets,
            "No records share a usable key after normalization",
        ));
    }

    let mut columns = vec![MERGE_KEY_COLUMN.to_string()];
    columns.extend(consolidated.columns());
    columns.extend(tracker.columns.iter().cloned());
    columns.push(PROVENANCE_COLUMN.to_string());

    let data = ReconciledDataset { columns, records };
    let counts = data.counts();
    info!(
        total = data.len(),
        both = counts.both_sources,
        consolidated_only = counts.consolidated_only,
        tracker_only = counts.tracker_only,
        "datasets combined"
    );
    log.line(format!(
        "Combined: {} records ({} matched, {} consolidated only, {} tracker only)",
        data.len(),
        counts.both_sources,
        counts.consolidated_only,
        counts.tracker_only
    ));
    Ok(data)
}

fn collapse(rows: &mut Vec<&TrackerRecord>, policy: DuplicateKeyPolicy) {
    match policy {
        DuplicateKeyPolicy::FanOut => {}
        DuplicateKeyPolicy::KeepFirst => rows.truncate(1),
        DuplicateKeyPolicy::KeepLast => {
            if let Some(last) = rows.pop() {
                rows.clear();
                rows.push(last);
            }
        }
    }
}

fn joined(
    key: &str,
    provenance: Provenance,
    consolidated: Option<&ExtractedRecord>,
    tracker: Option<&TrackerRecord>,
) -> ReconciledRecord {
    ReconciledRecord {
        key: key.to_string(),
        provenance,
        consolidated: consolidated.cloned(),
        tracker: tracker.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn consolidated(keys: &[&str]) -> ConsolidatedDataset {
        ConsolidatedDataset {
            key_field: "Item Number".into(),
            fields: vec!["Item Number".into(), "Brand".into()],
            records: keys
                .iter()
                .map(|k| ExtractedRecord {
                    fields: HashMap::from([
                        ("Item Number".to_string(), k.to_string()),
                        ("Brand".to_string(), format!("brand-{k}")),
                    ]),
                    source_file: "a.xlsx".into(),
                    source_folder: "F".into(),
                })
                .collect(),
        }
    }

    fn tracker(rows: &[(&str, &str)]) -> TrackerDataset {
        TrackerDataset {
            sheet: "T".into(),
            columns: vec!["PKG1".into(), "HUGO ID".into()],
            records: rows
                .iter()
                .map(|(key, hugo)| TrackerRecord {
                    merge_key: key.to_string(),
                    fields: HashMap::from([
                        ("PKG1".to_string(), key.to_string()),
                        ("HUGO ID".to_string(), hugo.to_string()),
                    ]),
                })
                .collect(),
        }
    }

    #[test]
    fn join_is_complete_for_unique_keys() {
        let left = consolidated(&["1001", "1002", "1003"]);
        let right = tracker(&[("1002", "H2"), ("1003-A", "H3"), ("1004", "H4"), ("1005", "H5")]);
        let data = reconcile(&left, &right, DuplicateKeyPolicy::FanOut, &mut Vec::<String>::new()).unwrap();

        let counts = data.counts();
        assert_eq!(counts.both_sources, 2);
        assert_eq!(counts.consolidated_only, 1);
        assert_eq!(counts.tracker_only, 2);
        assert_eq!(counts.total(), left.len() + right.len() - 2);

        let keys: Vec<_> = data.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["1001", "1002", "1003", "1004", "1005"]);
        assert_eq!(data.columns.first().map(String::as_str), Some(MERGE_KEY_COLUMN));
        assert_eq!(data.columns.last().map(String::as_str), Some(PROVENANCE_COLUMN));
    }

    #[test]
    fn one_sided_rows_leave_other_side_blank() {
        let data = reconcile(
            &consolidated(&["1001"]),
            &tracker(&[("2002", "H2")]),
            DuplicateKeyPolicy::FanOut,
            &mut Vec::<String>::new(),
        )
        .unwrap();
        let tracker_only = &data.records[1];
        assert_eq!(tracker_only.provenance, Provenance::TrackerOnly);
        assert_eq!(data.value(tracker_only, "Item Number"), "");
        assert_eq!(data.value(tracker_only, "HUGO ID"), "H2");
        assert_eq!(data.value(tracker_only, PROVENANCE_COLUMN), "Tracker Only");
    }

    #[test]
    fn keyless_tracker_rows_are_dropped() {
        let data = reconcile(
            &consolidated(&["1001"]),
            &tracker(&[("TBD", "H0"), ("1001", "H1")]),
            DuplicateKeyPolicy::FanOut,
            &mut Vec::<String>::new(),
        )
        .unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].provenance, Provenance::BothSources);
    }

    #[test]
    fn duplicate_tracker_keys_follow_policy() {
        let left = consolidated(&["1001"]);
        let right = tracker(&[("1001", "first"), ("1001", "second")]);

        let fan = reconcile(&left, &right, DuplicateKeyPolicy::FanOut, &mut Vec::<String>::new()).unwrap();
        assert_eq!(fan.len(), 2);

        let first = reconcile(&left, &right, DuplicateKeyPolicy::KeepFirst, &mut Vec::<String>::new()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.records[0].value("HUGO ID"), Some("first"));

        let mut log: Vec<String> = Vec::new();
        let last = reconcile(&left, &right, DuplicateKeyPolicy::KeepLast, &mut log).unwrap();
        assert_eq!(last.records[0].value("HUGO ID"), Some("second"));
        assert!(log[0].contains("policy: keep_last"));
    }

    #[test]
    fn empty_inputs_fail() {
        let err = reconcile(
            &consolidated(&[]),
            &tracker(&[("1001", "H1")]),
            DuplicateKeyPolicy::FanOut,
            &mut Vec::<String>::new(),
        )
        .unwrap_err();
        assert_eq!(err.stage, Stage::CombineDatasets);
    }

    #[test]
    fn all_keys_unusable_fails() {
        let err = reconcile(
            &consolidated(&["n/a"]),
            &tracker(&[("TBD", "H1")]),
            DuplicateKeyPolicy::FanOut,
            &mut Vec::<String>::new(),
        )
        .unwrap_err();
        assert!(err.message.contains("usable key"));
    }
}
