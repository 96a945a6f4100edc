//! Inclusive date-range filtering on the best-named date column.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DateFilterConfig;
use crate::error::ItemError;
use crate::log::StageLog;
use crate::model::ReconciledDataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Both bounds are included.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateFilterOutcome {
    /// Column the filter ran on, if one was found.
    pub column: Option<String>,
    pub kept: usize,
    pub unparseable: usize,
    pub out_of_range: usize,
    /// The filter could not run and every row was passed through.
    pub degraded: bool,
}

/// Column-name selection and day-first date parsing.
#[derive(Debug, Clone)]
pub struct DateRangeFilter {
    preferred_tokens: Vec<String>,
    fallback_tokens: Vec<String>,
    formats: Vec<String>,
}

impl DateRangeFilter {
    pub fn new(config: &DateFilterConfig) -> Self {
        let lower = |tokens: &[String]| -> Vec<String> { tokens.iter().map(|t| t.to_lowercase()).collect() };
        Self {
            preferred_tokens: lower(&config.preferred_tokens),
            fallback_tokens: lower(&config.fallback_tokens),
            formats: config.formats.clone(),
        }
    }

    /// First column containing every preferred token, else every fallback
    /// token. Matching is case-insensitive.
    pub fn select_column<'a>(&self, columns: &'a [String]) -> Option<&'a str> {
        [&self.preferred_tokens, &self.fallback_tokens]
            .into_iter()
            .filter(|tokens| !tokens.is_empty())
            .find_map(|tokens| {
                columns.iter().find(|col| {
                    let lower = col.to_lowercase();
                    tokens.iter().all(|t| lower.contains(t.as_str()))
                })
            })
            .map(String::as_str)
    }

    /// Parse with each format in turn.
    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    }

    /// Keep rows whose date lies in `range`.
    ///
    /// Without a date column every row passes. An inverted range is logged
    /// and also passes every row rather than failing the run.
    pub fn apply(
        &self,
        data: ReconciledDataset,
        range: DateRange,
        log: &mut dyn StageLog,
    ) -> (ReconciledDataset, DateFilterOutcome) {
        log.line(format!("Filtering dates: {range}"));

        let Some(column) = self.select_column(&data.columns).map(str::to_string) else {
            log.line("No date column found - skipping date filter".into());
            let outcome = DateFilterOutcome {
                kept: data.len(),
                ..DateFilterOutcome::default()
            };
            return (data, outcome);
        };

        if range.is_inverted() {
            let issue = ItemError::date_column(&column, format!("start {} is after end {}", range.start, range.end));
            warn!(%issue, "date filter skipped");
            log.warn(format!("Date filter error: {issue}; keeping all rows"));
            let outcome = DateFilterOutcome {
                column: Some(column),
                kept: data.len(),
                degraded: true,
                ..DateFilterOutcome::default()
            };
            return (data, outcome);
        }

        let mut outcome = DateFilterOutcome {
            column: Some(column.clone()),
            ..DateFilterOutcome::default()
        };
        let ReconciledDataset { columns, records } = data;
        let records: Vec<_> = records
            .into_iter()
            .filter(|record| match self.parse_date(record.value(&column).unwrap_or_default()) {
                Some(date) if range.contains(date) => true,
                Some(_) => {
                    outcome.out_of_range += 1;
                    false
                }
                None => {
                    outcome.unparseable += 1;
                    false
                }
            })
            .collect();
        outcome.kept = records.len();

        info!(
            column = %column,
            kept = outcome.kept,
            unparseable = outcome.unparseable,
            out_of_range = outcome.out_of_range,
            "date filter applied"
        );
        log.line(format!("After filtering: {} records", outcome.kept));
        (ReconciledDataset { columns, records }, outcome)
    }
}
