//! Field handler registry.
//!
//! Every field handler implements one contract: it receives the resolved
//! subtree and the id of the entity being processed, and returns a JSON
//! value for the entity record. Handlers written against the subtree alone
//! are adapted to that contract once, when they are registered.

use std::collections::HashMap;
use std::fmt;

use serde_json::{json, Map, Value as JsonValue};

use crate::node::FieldNode;
use crate::normalize::normalize;
use crate::series::{series_field, YearSeries, YearSeriesEntry};
use crate::split::{split, SplitOptions};
use crate::value::{parse_value_with, try_parse_value, UnparsedValue, ValueOptions, ValueStatus};

/// Error type for handler execution
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// Generic failure with a message.
    Message(String),
    /// The subtree does not have the shape the handler expects.
    InvalidShape(String),
    /// A value string matched no known pattern.
    Unparsed(String),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Message(msg) => write!(f, "Handler error: {}", msg),
            HandlerError::InvalidShape(msg) => write!(f, "Invalid field shape: {}", msg),
            HandlerError::Unparsed(raw) => write!(f, "Unparsed value: {:?}", raw),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<UnparsedValue> for HandlerError {
    fn from(err: UnparsedValue) -> Self {
        HandlerError::Unparsed(err.raw)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Message(err.to_string())
    }
}

/// The single calling convention for field handlers.
pub trait FieldHandler: Send + Sync {
    /// Produce the record value for one field of one entity.
    ///
    /// # Returns
    ///
    /// * `Ok(value)` - Value to store under the field's name
    /// * `Err(HandlerError)` - Handler failed; the dispatcher substitutes the default
    fn handle(&self, node: &FieldNode, entity_id: &str) -> Result<JsonValue, HandlerError>;
}

impl<F> FieldHandler for F
where
    F: Fn(&FieldNode, &str) -> Result<JsonValue, HandlerError> + Send + Sync,
{
    fn handle(&self, node: &FieldNode, entity_id: &str) -> Result<JsonValue, HandlerError> {
        self(node, entity_id)
    }
}

/// Adapter for handlers that only look at the subtree.
struct DataOnly<F>(F);

impl<F> FieldHandler for DataOnly<F>
where
    F: Fn(&FieldNode) -> Result<JsonValue, HandlerError> + Send + Sync,
{
    fn handle(&self, node: &FieldNode, _entity_id: &str) -> Result<JsonValue, HandlerError> {
        (self.0)(node)
    }
}

/// A handler together with the name it was registered under.
pub struct Handler {
    name: String,
    func: Box<dyn FieldHandler>,
}

impl Handler {
    pub fn new(name: impl Into<String>, func: impl FieldHandler + 'static) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    /// Wrap a handler that ignores the entity id.
    pub fn data_only<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&FieldNode) -> Result<JsonValue, HandlerError> + Send + Sync + 'static,
    {
        Self::new(name, DataOnly(func))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, node: &FieldNode, entity_id: &str) -> Result<JsonValue, HandlerError> {
        self.func.handle(node, entity_id)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// Registry of named field handlers.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in handlers:
    ///
    /// | name          | result                                            |
    /// |---------------|---------------------------------------------------|
    /// | `text`        | `{text, note}`, both normalized                   |
    /// | `list`        | array of items split from the text                |
    /// | `value`       | parsed value map, plus `note` when present        |
    /// | `year_series` | `{data, latest_value, latest_year, latest_unit, note}` |
    /// | `subfields`   | map of child labels to values, recursively        |
    pub fn with_builtins(split_options: &SplitOptions, value_options: &ValueOptions) -> Self {
        let mut registry = Self::new();

        registry.register_data_only("text", text_field);

        let list_split = split_options.clone();
        registry.register_data_only("list", move |node: &FieldNode| list_field(node, &list_split));

        let value_opts = *value_options;
        registry.register_data_only("value", move |node: &FieldNode| value_field(node, &value_opts));

        let series_opts = *value_options;
        registry.register_data_only("year_series", move |node: &FieldNode| {
            year_series_field(node, &series_opts)
        });

        let sub_opts = *value_options;
        registry.register_data_only("subfields", move |node: &FieldNode| {
            Ok(subfields(node, &sub_opts))
        });

        registry
    }

    /// Register a handler in the `(subtree, entity_id)` form.
    ///
    /// # Example
    ///
    /// ```
    /// use almanac::{FieldNode, HandlerRegistry};
    /// use serde_json::json;
    ///
    /// let mut registry = HandlerRegistry::new();
    /// registry.register("entity_tag", |_node: &FieldNode, entity_id: &str| {
    ///     Ok(json!({ "entity": entity_id }))
    /// });
    /// assert!(registry.has_handler("entity_tag"));
    /// ```
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&FieldNode, &str) -> Result<JsonValue, HandlerError> + Send + Sync + 'static,
    {
        self.register_handler(name, func);
    }

    /// Register any [`FieldHandler`] implementation.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: impl FieldHandler + 'static) {
        let name = name.into();
        self.handlers.insert(name.clone(), Handler::new(name, handler));
    }

    /// Register a handler that only takes the subtree. It is adapted to the
    /// `(subtree, entity_id)` form here, once.
    pub fn register_data_only<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&FieldNode) -> Result<JsonValue, HandlerError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.handlers
            .insert(name.clone(), Handler::data_only(name, func));
    }

    /// Look up a registered handler
    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Check if a handler is registered
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Names of all registered handlers, sorted.
    pub fn list_handlers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }
}

fn require_text(node: &FieldNode) -> Result<&str, HandlerError> {
    node.text
        .as_deref()
        .ok_or_else(|| HandlerError::InvalidShape("field has no text".to_string()))
}

fn normalized_note(node: &FieldNode) -> Option<String> {
    node.note_trimmed().map(normalize).filter(|n| !n.is_empty())
}

fn text_field(node: &FieldNode) -> Result<JsonValue, HandlerError> {
    let text = node.text.as_deref().map(normalize).filter(|t| !t.is_empty());
    Ok(json!({
        "text": text,
        "note": normalized_note(node),
    }))
}

fn list_field(node: &FieldNode, options: &SplitOptions) -> Result<JsonValue, HandlerError> {
    let text = require_text(node)?;
    Ok(JsonValue::from(split(text, options)))
}

fn value_field(node: &FieldNode, options: &ValueOptions) -> Result<JsonValue, HandlerError> {
    let text = require_text(node)?;
    let mut value = serde_json::to_value(try_parse_value(text, options)?)?;
    if let (Some(note), JsonValue::Object(map)) = (normalized_note(node), &mut value) {
        map.insert("note".to_string(), JsonValue::String(note));
    }
    Ok(value)
}

/// Series from year-keyed children. A node without any falls back to its own
/// text when that carries a year marker; otherwise the shape is rejected.
fn year_series_field(node: &FieldNode, options: &ValueOptions) -> Result<JsonValue, HandlerError> {
    let mut field = series_field(node, options);

    if field.series.is_empty() {
        let text = node.text_trimmed().ok_or_else(|| {
            HandlerError::InvalidShape("no year-keyed entries".to_string())
        })?;
        let parsed = parse_value_with(text, options);
        let year = parsed.year.or(parsed.fiscal_year).ok_or_else(|| {
            HandlerError::InvalidShape(format!(
                "no year-keyed entries and no year in text {:?}",
                normalize(text)
            ))
        })?;
        field.series = YearSeries::from_entries([YearSeriesEntry {
            year,
            value: parsed.value,
            unit: parsed.unit,
            is_estimate: parsed.is_estimate,
        }]);
    }

    Ok(serde_json::to_value(field)?)
}

/// Child labels map to parsed values when the text carries one, to
/// normalized text otherwise, and to nested maps when the child has
/// children of its own.
fn subfields(node: &FieldNode, options: &ValueOptions) -> JsonValue {
    let mut map = Map::new();

    if let Some(text) = node.text_trimmed() {
        map.insert("text".to_string(), JsonValue::String(normalize(text)));
    }
    if let Some(note) = normalized_note(node) {
        map.insert("note".to_string(), JsonValue::String(note));
    }

    for (label, child) in node.iter() {
        if child.is_empty() {
            continue;
        }
        let value = if !child.children.is_empty() {
            subfields(child, options)
        } else {
            leaf_value(child, options)
        };
        map.insert(label.clone(), value);
    }

    JsonValue::Object(map)
}

fn leaf_value(node: &FieldNode, options: &ValueOptions) -> JsonValue {
    let Some(text) = node.text_trimmed() else {
        return json!({ "note": normalized_note(node) });
    };

    let parsed = parse_value_with(text, options);
    match parsed.status() {
        ValueStatus::Unparsed => JsonValue::String(normalize(text)),
        _ => serde_json::to_value(parsed).unwrap_or(JsonValue::Null),
    }
}
