//! Runs the configured field plan over entity documents.

use serde_json::Value as JsonValue;

use crate::config::{ConfigError, EngineConfig};
use crate::extraction::FieldOutcome;
use crate::handler_registry::HandlerRegistry;
use crate::node::FieldNode;
use crate::runtime::context::{EntityContext, EntityRecord};

/// Applies every field of an [`EngineConfig`] to one entity at a time.
///
/// The parser holds only shared read-only state, so one instance can be
/// used for any number of entities, from any number of threads.
///
/// # Example Flow
/// 1. Load the engine config (field plan)
/// 2. Build a registry with the built-in handlers plus any custom ones
/// 3. Parse each entity document into an [`EntityRecord`]
pub struct EntityParser {
    config: EngineConfig,
    registry: HandlerRegistry,
}

impl EntityParser {
    /// Create a parser with a caller-supplied registry.
    ///
    /// # Errors
    /// Returns error if the plan is invalid or names a handler the registry
    /// doesn't have
    pub fn new(config: EngineConfig, registry: HandlerRegistry) -> Result<Self, ConfigError> {
        config.validate_plan()?;
        config.validate_handlers(&registry)?;
        Ok(Self { config, registry })
    }

    /// Create a parser that uses only the built-in handlers.
    ///
    /// # Example
    /// ```
    /// use almanac::config::{EngineConfig, FieldSpec};
    /// use almanac::runtime::EntityParser;
    /// use serde_json::json;
    ///
    /// let mut config = EngineConfig::default();
    /// config.fields.push(FieldSpec::new("area", "Geography.Area.total", "value"));
    ///
    /// let parser = EntityParser::with_builtins(config).unwrap();
    /// let record = parser.parse_json("FR", &json!({
    ///     "Geography": {"Area": {"total": {"text": "643,801 sq km"}}}
    /// }));
    /// assert_eq!(record.get("area").unwrap()["value"], json!(643801.0));
    /// ```
    pub fn with_builtins(config: EngineConfig) -> Result<Self, ConfigError> {
        let registry = config.builtin_registry();
        Self::new(config, registry)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Parse one entity document given as JSON.
    pub fn parse_json(&self, entity_id: &str, document: &JsonValue) -> EntityRecord {
        self.parse_node(entity_id, &FieldNode::from_json(document))
    }

    /// Parse one entity document.
    ///
    /// Never fails: each field's failure is recorded in the record's report
    /// and the field falls back to its default.
    pub fn parse_node(&self, entity_id: &str, root: &FieldNode) -> EntityRecord {
        let mut context = EntityContext::new(entity_id);

        for field in &self.config.fields {
            let options = field.extract_options(&self.config);
            match self.registry.get(&field.handler) {
                Some(handler) => {
                    context.extract_field(root, &field.path, handler, &options);
                }
                None => {
                    tracing::error!(
                        entity = %entity_id,
                        field = %field.name,
                        handler = %field.handler,
                        "handler not registered"
                    );
                    context.set_field(field.name.clone(), options.default.clone());
                    context.report_mut().record(
                        field.name.clone(),
                        FieldOutcome::Failed {
                            handler: field.handler.clone(),
                            reason: "handler not registered".to_string(),
                        },
                    );
                }
            }
        }

        let record = context.into_record();
        tracing::debug!(
            entity = %entity_id,
            extracted = record.report.extracted_count(),
            fields = record.fields.len(),
            "entity parsed"
        );
        record
    }
}
