//! Per-entity extraction context.
//!
//! Holds the fields extracted so far for one entity together with the
//! outcome of every field attempt.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::extraction::{extract, ExtractOptions, Extraction};
use crate::handler_registry::Handler;
use crate::node::FieldNode;
use crate::report::EntityReport;

/// Fields extracted for one entity, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,

    #[serde(flatten)]
    pub fields: IndexMap<String, JsonValue>,

    #[serde(skip)]
    pub report: EntityReport,
}

impl EntityRecord {
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }
}

/// Mutable state while one entity is being processed.
///
/// Every field is recorded exactly once: extracting the same field name a
/// second time replaces both the stored value and its outcome.
#[derive(Debug, Clone)]
pub struct EntityContext {
    entity_id: String,
    fields: IndexMap<String, JsonValue>,
    report: EntityReport,
}

impl EntityContext {
    /// # Example
    /// ```
    /// use almanac::runtime::EntityContext;
    ///
    /// let ctx = EntityContext::new("FR");
    /// assert_eq!(ctx.entity_id(), "FR");
    /// assert_eq!(ctx.field_count(), 0);
    /// ```
    pub fn new(entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        Self {
            report: EntityReport::new(entity_id.clone()),
            entity_id,
            fields: IndexMap::new(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Run [`extract`] for one field, store its value and outcome, and hand
    /// the extraction back to the caller.
    pub fn extract_field(
        &mut self,
        root: &FieldNode,
        path: &str,
        handler: &Handler,
        options: &ExtractOptions,
    ) -> Extraction {
        let extraction = extract(root, path, handler, options, &self.entity_id);
        self.report.record_extraction(&extraction);
        self.fields
            .insert(extraction.field.clone(), extraction.value.clone());
        extraction
    }

    /// Store a value produced outside the dispatcher.
    pub fn set_field(&mut self, field: impl Into<String>, value: JsonValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn get_field(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn report(&self) -> &EntityReport {
        &self.report
    }

    pub fn report_mut(&mut self) -> &mut EntityReport {
        &mut self.report
    }

    pub fn into_record(self) -> EntityRecord {
        EntityRecord {
            entity_id: self.entity_id,
            fields: self.fields,
            report: self.report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::FieldOutcome;
    use crate::handler_registry::HandlerError;
    use serde_json::json;

    fn root() -> FieldNode {
        FieldNode::from_json(&json!({
            "Geography": {"Area": {"total": {"text": "643,801 sq km"}}}
        }))
    }

    fn echo() -> Handler {
        Handler::data_only("echo", |node: &FieldNode| {
            Ok(json!(node.text_trimmed().unwrap_or_default()))
        })
    }

    #[test]
    fn test_extract_field_records_value_and_outcome() {
        let mut ctx = EntityContext::new("FR");
        let options = ExtractOptions::default().named("area");

        let extraction = ctx.extract_field(&root(), "Geography.Area.total", &echo(), &options);

        assert!(extraction.is_extracted());
        assert_eq!(ctx.get_field("area"), Some(&json!("643,801 sq km")));
        assert_eq!(ctx.report().outcome("area"), Some(&FieldOutcome::Extracted));
    }

    #[test]
    fn test_repeat_extraction_overwrites() {
        let mut ctx = EntityContext::new("FR");
        let options = ExtractOptions::default().named("area");

        ctx.extract_field(&root(), "Geography.Area.land", &echo(), &options);
        assert_eq!(ctx.report().outcome("area"), Some(&FieldOutcome::Missing));

        ctx.extract_field(&root(), "Geography.Area.total", &echo(), &options);
        assert_eq!(ctx.field_count(), 1);
        assert_eq!(ctx.report().outcomes.len(), 1);
        assert_eq!(ctx.report().outcome("area"), Some(&FieldOutcome::Extracted));
    }

    #[test]
    fn test_failure_keeps_default() {
        let mut ctx = EntityContext::new("FR");
        let failing = Handler::data_only("failing", |_node: &FieldNode| {
            Err(HandlerError::Message("no".to_string()))
        });
        let options = ExtractOptions::default().named("area").with_default(json!(null));

        ctx.extract_field(&root(), "Geography.Area.total", &failing, &options);

        assert_eq!(ctx.get_field("area"), Some(&JsonValue::Null));
        assert!(ctx.report().has_failures());
    }

    #[test]
    fn test_record_serializes_flat() {
        let mut ctx = EntityContext::new("FR");
        ctx.set_field("name", json!("France"));
        ctx.set_field("area", json!(643801.0));

        let record = ctx.into_record();
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(
            out,
            json!({"entity_id": "FR", "name": "France", "area": 643801.0})
        );
    }
}
