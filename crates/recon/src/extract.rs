//! Turning one sheet with a known header row into canonical records.

use std::collections::HashMap;

use crate::model::{ExtractedRecord, Sheet};
use crate::normalize::normalize_key;
use crate::schema::SchemaMapping;

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrigin {
    pub file: String,
    pub folder: String,
}

/// Copies mapped columns out of a sheet and validates the business key.
#[derive(Debug, Clone)]
pub struct SheetExtractor {
    /// Canonical fields, in output order.
    pub fields: Vec<String>,
    pub key_field: String,
    /// Data rows read below the header.
    pub max_rows: usize,
}

impl SheetExtractor {
    /// Extract rows below `header_row`.
    ///
    /// Mapped fields are trimmed text, unmapped fields are `""`. The key field
    /// is reduced to its first digit run and rows where that is empty are
    /// dropped.
    pub fn extract(
        &self,
        sheet: &Sheet,
        header_row: usize,
        mapping: &SchemaMapping,
        origin: &RecordOrigin,
    ) -> Vec<ExtractedRecord> {
        let Some(key_col) = mapping.column(&self.key_field) else {
            return Vec::new();
        };

        let columns: Vec<(&str, Option<usize>)> = self
            .fields
            .iter()
            .map(|f| (f.as_str(), mapping.column(f)))
            .collect();

        sheet
            .rows
            .iter()
            .skip(header_row + 1)
            .take(self.max_rows)
            .filter_map(|row| {
                let raw_key = row.get(key_col).map(|c| c.to_text()).unwrap_or_default();
                let key = normalize_key(&raw_key);
                if key.is_empty() {
                    return None;
                }

                let mut fields = HashMap::with_capacity(columns.len());
                for (field, col) in &columns {
                    let value = if *field == self.key_field {
                        key.clone()
                    } else {
                        col.and_then(|c| row.get(c))
                            .map(|cell| cell.to_text().trim().to_string())
                            .unwrap_or_default()
                    };
                    fields.insert((*field).to_string(), value);
                }

                Some(ExtractedRecord {
                    fields,
                    source_file: origin.file.clone(),
                    source_folder: origin.folder.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cell;
    use crate::schema::ColumnPatternTable;

    fn extractor() -> SheetExtractor {
        SheetExtractor {
            fields: vec!["Item Number".into(), "Brand".into(), "VBU".into()],
            key_field: "Item Number".into(),
            max_rows: 5000,
        }
    }

    fn origin() -> RecordOrigin {
        RecordOrigin {
            file: "list.xlsx".into(),
            folder: "Spring_Production Item List".into(),
        }
    }

    fn mapping_for(sheet: &Sheet, row: usize) -> SchemaMapping {
        ColumnPatternTable::new([("Item Number", vec!["item #"]), ("Brand", vec!["brand"])])
            .map_row(&sheet.row_text(row))
    }

    #[test]
    fn extracts_trimmed_values_and_blank_unmapped_fields() {
        let sheet = Sheet::from_text(
            "Main",
            [
                vec!["Title"],
                vec!["Item #", "Brand"],
                vec!["1001", "  Kobalt "],
            ],
        );
        let records = extractor().extract(&sheet, 1, &mapping_for(&sheet, 1), &origin());
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.get("Item Number"), Some("1001"));
        assert_eq!(rec.get("Brand"), Some("Kobalt"));
        assert_eq!(rec.get("VBU"), Some(""));
        assert_eq!(rec.source_file, "list.xlsx");
        assert_eq!(rec.source_folder, "Spring_Production Item List");
    }

    #[test]
    fn rows_without_digits_are_dropped() {
        let sheet = Sheet::from_text(
            "Main",
            [
                vec!["Item #", "Brand"],
                vec!["TBD", "Kobalt"],
                vec!["", "Craftsman"],
                vec!["#2002-B", "Dewalt"],
            ],
        );
        let records = extractor().extract(&sheet, 0, &mapping_for(&sheet, 0), &origin());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Item Number"), Some("2002"));
        assert_eq!(records[0].get("Brand"), Some("Dewalt"));
    }

    #[test]
    fn numeric_key_cells_keep_their_digits() {
        let sheet = Sheet::new(
            "Main",
            vec![
                vec![Cell::from("Item #"), Cell::from("Brand")],
                vec![Cell::Number(1001.0), Cell::Empty],
            ],
        );
        let records = extractor().extract(&sheet, 0, &mapping_for(&sheet, 0), &origin());
        assert_eq!(records[0].get("Item Number"), Some("1001"));
        assert_eq!(records[0].get("Brand"), Some(""));
    }

    #[test]
    fn row_cap_limits_data_rows() {
        let mut rows = vec![vec!["Item #".to_string(), "Brand".to_string()]];
        rows.extend((0..10).map(|i| vec![format!("{}", 100 + i), "B".to_string()]));
        let sheet = Sheet::from_text("Main", rows);
        let capped = SheetExtractor { max_rows: 4, ..extractor() };
        let records = capped.extract(&sheet, 0, &mapping_for(&sheet, 0), &origin());
        assert_eq!(records.len(), 4);
        assert_eq!(records[3].get("Item Number"), Some("103"));
    }

    #[test]
    fn missing_key_column_yields_nothing() {
        let sheet = Sheet::from_text("Main", [vec!["Brand", "VBU"], vec!["Kobalt", "12"]]);
        let records = extractor().extract(&sheet, 0, &mapping_for(&sheet, 0), &origin());
        assert!(records.is_empty());
    }
}
