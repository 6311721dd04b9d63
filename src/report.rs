//! Per-entity outcome tallies and the run-level summary built from them.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::extraction::{Extraction, FieldOutcome};

/// Outcome of every field extracted for one entity. Each field is recorded
/// once; extracting the same field name again replaces the earlier outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub entity_id: String,
    pub outcomes: IndexMap<String, FieldOutcome>,
}

impl EntityReport {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            outcomes: IndexMap::new(),
        }
    }

    pub fn record(&mut self, field: impl Into<String>, outcome: FieldOutcome) {
        self.outcomes.insert(field.into(), outcome);
    }

    pub fn record_extraction(&mut self, extraction: &Extraction) {
        self.record(extraction.field.clone(), extraction.outcome.clone());
    }

    pub fn outcome(&self, field: &str) -> Option<&FieldOutcome> {
        self.outcomes.get(field)
    }

    /// Fields whose handler failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(field, outcome)| match outcome {
            FieldOutcome::Failed { reason, .. } => Some((field.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// Fields that were required but empty.
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|(field, outcome)| match outcome {
            FieldOutcome::Empty { required: true } => Some(field.as_str()),
            _ => None,
        })
    }

    pub fn extracted_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| **outcome == FieldOutcome::Extracted)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.values().any(FieldOutcome::is_failure)
    }
}

/// Per-field counters across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTally {
    pub extracted: usize,
    pub missing: usize,
    pub empty: usize,
    pub required_empty: usize,
    pub restricted: usize,
    pub unparsed: usize,
    pub failed: usize,
}

impl FieldTally {
    fn add(&mut self, outcome: &FieldOutcome) {
        match outcome {
            FieldOutcome::Extracted => self.extracted += 1,
            FieldOutcome::Missing => self.missing += 1,
            FieldOutcome::Empty { required } => {
                self.empty += 1;
                if *required {
                    self.required_empty += 1;
                }
            }
            FieldOutcome::Restricted => self.restricted += 1,
            FieldOutcome::Unparsed { .. } => self.unparsed += 1,
            FieldOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// One handler failure, attributed to its entity and field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailure {
    pub entity_id: String,
    pub field: String,
    pub handler: String,
    pub reason: String,
}

/// Run-level summary across all entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub entities: usize,
    pub fields: IndexMap<String, FieldTally>,
    pub failures: Vec<FieldFailure>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            entities: 0,
            fields: IndexMap::new(),
            failures: Vec::new(),
        }
    }

    /// Fold one entity's report into the summary.
    pub fn absorb(&mut self, report: &EntityReport) {
        self.entities += 1;
        for (field, outcome) in &report.outcomes {
            self.fields.entry(field.clone()).or_default().add(outcome);
            if let FieldOutcome::Failed { handler, reason } = outcome {
                self.failures.push(FieldFailure {
                    entity_id: report.entity_id.clone(),
                    field: field.clone(),
                    handler: handler.clone(),
                    reason: reason.clone(),
                });
            }
        }
    }

    pub fn tally(&self, field: &str) -> Option<&FieldTally> {
        self.fields.get(field)
    }

    pub fn total_failures(&self) -> usize {
        self.failures.len()
    }

    /// Emit the summary through `tracing`, one line per field.
    pub fn log(&self) {
        tracing::info!(
            entities = self.entities,
            fields = self.fields.len(),
            failures = self.failures.len(),
            "extraction run complete"
        );
        for (field, tally) in &self.fields {
            tracing::info!(
                field = %field,
                extracted = tally.extracted,
                missing = tally.missing,
                empty = tally.empty,
                restricted = tally.restricted,
                unparsed = tally.unparsed,
                failed = tally.failed,
                "field tally"
            );
        }
        for failure in &self.failures {
            tracing::warn!(
                entity = %failure.entity_id,
                field = %failure.field,
                handler = %failure.handler,
                "{}",
                failure.reason
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(reason: &str) -> FieldOutcome {
        FieldOutcome::Failed {
            handler: "value".to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_record_replaces_same_field() {
        let mut report = EntityReport::new("FR");
        report.record("gdp", FieldOutcome::Missing);
        report.record("gdp", FieldOutcome::Extracted);

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcome("gdp"), Some(&FieldOutcome::Extracted));
    }

    #[test]
    fn test_failures_and_warnings() {
        let mut report = EntityReport::new("FR");
        report.record("gdp", FieldOutcome::Extracted);
        report.record("debt", failed("bad shape"));
        report.record("area", FieldOutcome::Empty { required: true });
        report.record("coast", FieldOutcome::Empty { required: false });

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures, vec![("debt", "bad shape")]);
        assert_eq!(report.warnings().collect::<Vec<_>>(), vec!["area"]);
        assert_eq!(report.extracted_count(), 1);
        assert!(report.has_failures());
    }

    #[test]
    fn test_summary_tallies_per_field() {
        let mut first = EntityReport::new("FR");
        first.record("gdp", FieldOutcome::Extracted);
        first.record("debt", failed("boom"));

        let mut second = EntityReport::new("DE");
        second.record("gdp", FieldOutcome::Missing);
        second.record("debt", FieldOutcome::Extracted);
        second.record("world_only", FieldOutcome::Restricted);

        let mut summary = RunSummary::new();
        summary.absorb(&first);
        summary.absorb(&second);

        assert_eq!(summary.entities, 2);
        let gdp = summary.tally("gdp").unwrap();
        assert_eq!((gdp.extracted, gdp.missing), (1, 1));
        let debt = summary.tally("debt").unwrap();
        assert_eq!((debt.extracted, debt.failed), (1, 1));
        assert_eq!(summary.tally("world_only").unwrap().restricted, 1);

        assert_eq!(summary.total_failures(), 1);
        assert_eq!(summary.failures[0].entity_id, "FR");
        assert_eq!(summary.failures[0].field, "debt");
    }
}
