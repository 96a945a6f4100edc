//! Header-row inference and fuzzy column mapping.

use std::collections::HashMap;

use crate::normalize::normalize_header;

/// A row scoring at least this many fields is accepted without scanning further.
pub const CONFIDENT_SCORE: usize = 3;
/// The best row must score at least this many fields to count as a header.
pub const MIN_HEADER_SCORE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldPatterns {
    name: String,
    patterns: Vec<String>,
}

/// Canonical field name → normalized header substrings, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPatternTable {
    fields: Vec<FieldPatterns>,
}

impl ColumnPatternTable {
    /// Build a table from raw patterns. Patterns are normalized here; ones that
    /// normalize to nothing are dropped since they would match every cell.
    pub fn new<I, S, P>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let fields = fields
            .into_iter()
            .map(|(name, patterns)| FieldPatterns {
                name: name.into(),
                patterns: patterns
                    .into_iter()
                    .map(|p| normalize_header(p.as_ref()))
                    .filter(|p| !p.is_empty())
                    .collect(),
            })
            .collect();
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Map one candidate header row. For each field the leftmost cell that
    /// contains any of its patterns wins.
    pub fn map_row<S: AsRef<str>>(&self, cells: &[S]) -> SchemaMapping {
        let normalized: Vec<String> = cells.iter().map(|c| normalize_header(c.as_ref())).collect();

        let mut columns = HashMap::new();
        for field in &self.fields {
            let hit = normalized.iter().position(|cell| {
                !cell.is_empty() && field.patterns.iter().any(|p| cell.contains(p.as_str()))
            });
            if let Some(col) = hit {
                columns.insert(field.name.clone(), col);
            }
        }

        SchemaMapping { columns }
    }
}

/// Canonical field → column position within one sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMapping {
    columns: HashMap<String, usize>,
}

impl SchemaMapping {
    pub fn column(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    /// Number of canonical fields matched.
    pub fn score(&self) -> usize {
        self.columns.len()
    }
}

/// Result of a successful header search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMatch {
    pub row: usize,
    pub mapping: SchemaMapping,
}

/// Find the header row among the first `scan_rows` rows.
///
/// Returns `None` when no row matches at least [`MIN_HEADER_SCORE`] fields.
pub fn infer_header<S: AsRef<str>>(
    rows: &[Vec<S>],
    table: &ColumnPatternTable,
    scan_rows: usize,
) -> Option<HeaderMatch> {
    let mut best: Option<HeaderMatch> = None;

    for (row, cells) in rows.iter().take(scan_rows).enumerate() {
        let mapping = table.map_row(cells.as_slice());
        let score = mapping.score();

        if score > best.as_ref().map_or(0, |b| b.mapping.score()) {
            best = Some(HeaderMatch { row, mapping });
        }

        if score >= CONFIDENT_SCORE {
            break;
        }
    }

    best.filter(|b| b.mapping.score() >= MIN_HEADER_SCORE)
}
