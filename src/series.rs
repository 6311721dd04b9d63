//! Year-keyed time series.
//!
//! Multi-year fields appear in documents as sibling entries whose labels
//! differ only by an embedded year, plus an optional `note`:
//!
//! ```text
//! "Exports": {
//!     "Exports 2023": {"text": "$1.2 trillion (2023 est.)"},
//!     "Exports 2022": {"text": "$1.1 trillion (2022 est.)"},
//!     "note": "balance of payments basis"
//! }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::node::{FieldNode, NOTE_KEY};
use crate::normalize::normalize;
use crate::value::{parse_value_with, ValueOptions};

static RE_KEY_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?P<year>\d{4})\b").unwrap());

/// One year of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSeriesEntry {
    pub year: i32,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub is_estimate: bool,
}

/// Entries ordered strictly by descending year, with the newest entry
/// summarized in the `latest_*` fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct YearSeries {
    pub data: Vec<YearSeriesEntry>,
    pub latest_value: Option<f64>,
    pub latest_year: Option<i32>,
    pub latest_unit: Option<String>,
}

impl YearSeries {
    /// Build a series from entries in scan order. Later entries for a year
    /// replace earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = YearSeriesEntry>) -> Self {
        let mut by_year: BTreeMap<i32, YearSeriesEntry> = BTreeMap::new();
        for entry in entries {
            by_year.insert(entry.year, entry);
        }

        let data: Vec<YearSeriesEntry> = by_year.into_values().rev().collect();

        let mut series = Self {
            data,
            ..Self::default()
        };
        if let Some(first) = series.data.first() {
            if first.value.is_some() {
                series.latest_value = first.value;
                series.latest_year = Some(first.year);
                series.latest_unit = first.unit.clone();
            }
        }
        series
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

/// A series together with the normalized note that accompanied it. This is
/// the shape written to entity records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeriesField {
    #[serde(flatten)]
    pub series: YearSeries,
    pub note: Option<String>,
}

/// Year embedded in a sibling label such as `"Exports 2023"`.
pub fn year_from_key(key: &str) -> Option<i32> {
    RE_KEY_YEAR
        .captures(key)
        .and_then(|caps| caps["year"].parse().ok())
}

/// Aggregate the year-labeled children of `node` into a [`YearSeries`].
///
/// Children whose label carries no four-digit year are skipped, as are
/// children whose text yields nothing recordable. The node's `note`, when
/// non-blank, is normalized and returned alongside the series.
pub fn aggregate_year_series(node: &FieldNode) -> (YearSeries, Option<String>) {
    aggregate_year_series_with(node, &ValueOptions::default())
}

/// [`aggregate_year_series`] with explicit value-parsing options.
pub fn aggregate_year_series_with(
    node: &FieldNode,
    options: &ValueOptions,
) -> (YearSeries, Option<String>) {
    let mut entries = Vec::new();

    for (key, child) in node.iter() {
        if key == NOTE_KEY {
            continue;
        }
        let Some(year) = year_from_key(key) else {
            tracing::trace!(key = %key, "skipping non-year sibling");
            continue;
        };
        let Some(text) = child.text.as_deref() else {
            continue;
        };

        let parsed = parse_value_with(text, options);
        if !parsed.has_signal() {
            tracing::debug!(key = %key, raw = %parsed.raw, "year entry without a value");
            continue;
        }

        entries.push(YearSeriesEntry {
            year,
            value: parsed.value,
            unit: parsed.unit,
            is_estimate: parsed.is_estimate,
        });
    }

    let note = node
        .note_trimmed()
        .map(normalize)
        .filter(|note| !note.is_empty());

    (YearSeries::from_entries(entries), note)
}

/// Aggregate into the record shape.
pub fn series_field(node: &FieldNode, options: &ValueOptions) -> SeriesField {
    let (series, note) = aggregate_year_series_with(node, options);
    SeriesField { series, note }
}
