//! Projection into the fixed canonical output schema.

use tracing::debug;

use crate::config::Profile;
use crate::error::StageError;
use crate::model::{CanonicalOutput, CanonicalRecord, ReconciledDataset};
use crate::pipeline::Stage;

/// Ordered output columns and where each is read from.
#[derive(Debug, Clone)]
pub struct OutputPlan {
    /// `(output name, source column)`; `None` means always empty.
    pub columns: Vec<(String, Option<String>)>,
    pub key_field: String,
}

impl OutputPlan {
    pub fn new(columns: Vec<(String, Option<String>)>, key_field: impl Into<String>) -> Self {
        Self {
            columns,
            key_field: key_field.into(),
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self::new(profile.output_columns(), profile.output.key_field.clone())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Copy each output column from its source, `""` when the source is absent,
/// and drop rows whose key column is blank. An empty result is not an error.
pub fn project(data: &ReconciledDataset, plan: &OutputPlan) -> Result<CanonicalOutput, StageError> {
    let Some(key_idx) = plan.columns.iter().position(|(name, _)| *name == plan.key_field) else {
        return Err(StageError::new(
            Stage::FormatOutput,
            format!("Key column '{}' is not part of the output", plan.key_field),
        ));
    };

    let records: Vec<CanonicalRecord> = data
        .records
        .iter()
        .map(|record| CanonicalRecord {
            values: plan
                .columns
                .iter()
                .map(|(_, source)| {
                    source
                        .as_deref()
                        .map(|s| data.value(record, s))
                        .unwrap_or_default()
                })
                .collect(),
        })
        .filter(|r| !r.values[key_idx].trim().is_empty())
        .collect();

    debug!(
        input = data.len(),
        output = records.len(),
        "projected to output schema"
    );

    Ok(CanonicalOutput {
        columns: plan.column_names(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::{ExtractedRecord, Provenance, ReconciledRecord, TrackerRecord};

    fn record(item: &str, hugo: &str) -> ReconciledRecord {
        ReconciledRecord {
            key: item.to_string(),
            provenance: Provenance::BothSources,
            consolidated: Some(ExtractedRecord {
                fields: HashMap::from([
                    ("Item Number".to_string(), item.to_string()),
                    ("SKU New/Existing".to_string(), "New".to_string()),
                ]),
                source_file: "a.xlsx".into(),
                source_folder: "F".into(),
            }),
            tracker: Some(TrackerRecord {
                merge_key: item.to_string(),
                fields: HashMap::from([("HUGO ID".to_string(), hugo.to_string())]),
            }),
        }
    }

    fn plan() -> OutputPlan {
        OutputPlan::new(
            vec![
                ("HUGO ID".into(), Some("HUGO ID".into())),
                ("Item Number".into(), Some("Item Number".into())),
                ("SKU".into(), Some("SKU New/Existing".into())),
                ("Store Date".into(), Some("Store Date".into())),
                ("Printer Code".into(), None),
            ],
            "Item Number",
        )
    }

    #[test]
    fn fills_every_column_in_order() {
        let data = ReconciledDataset {
            columns: vec![],
            records: vec![record("1001", "H1")],
        };
        let out = project(&data, &plan()).unwrap();
        assert_eq!(out.columns, ["HUGO ID", "Item Number", "SKU", "Store Date", "Printer Code"]);
        assert_eq!(out.records[0].values, ["H1", "1001", "New", "", ""]);
        assert_eq!(out.get(&out.records[0], "SKU"), Some("New"));
    }

    #[test]
    fn rows_without_item_number_are_dropped() {
        let mut tracker_only = record("2002", "H2");
        tracker_only.consolidated = None;
        tracker_only.provenance = Provenance::TrackerOnly;
        let data = ReconciledDataset {
            columns: vec![],
            records: vec![record("1001", "H1"), tracker_only, record("  ", "H3")],
        };
        let out = project(&data, &plan()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.records[0].values[1], "1001");
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let out = project(&ReconciledDataset::default(), &plan()).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.columns.len(), 5);
    }

    #[test]
    fn key_must_be_an_output_column() {
        let plan = OutputPlan::new(vec![("HUGO ID".into(), None)], "Item Number");
        let err = project(&ReconciledDataset::default(), &plan).unwrap_err();
        assert_eq!(err.stage, Stage::FormatOutput);
    }
}
