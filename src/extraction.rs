//! Field dispatch: resolve a dotted path in an entity document and run a
//! handler on the subtree found there.
//!
//! Nothing raised while extracting one field escapes this module. A missing
//! path, an empty subtree, a handler error or a handler panic all degrade to
//! the field's default value, with the reason reported in [`FieldOutcome`].

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::handler_registry::{Handler, HandlerError};
use crate::node::FieldNode;

/// A dot-separated path to a field in an entity document.
///
/// Segments are matched exactly against child labels, so they keep the
/// capitalization and punctuation of the source (`"Economy.Real GDP (purchasing power parity)"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<String>,
}

impl FieldPath {
    /// Parse a field path with a given delimiter
    ///
    /// # Example
    ///
    /// ```
    /// use almanac::FieldPath;
    ///
    /// let path = FieldPath::parse("Economy/Budget/revenues", "/");
    /// assert_eq!(path.segments, vec!["Economy", "Budget", "revenues"]);
    /// ```
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Create a field path from a dotted string (common format)
    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Walk `root` one segment at a time.
    ///
    /// Returns `None` as soon as a segment is absent.
    pub fn resolve<'a>(&self, root: &'a FieldNode) -> Option<&'a FieldNode> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| node.get(segment))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::from_dotted(path)
    }
}

/// Resolve a dotted path against a document root.
pub fn resolve<'a>(root: &'a FieldNode, path: &str) -> Option<&'a FieldNode> {
    FieldPath::from_dotted(path).resolve(root)
}

/// Per-call options for [`extract`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Returned whenever the handler does not produce a value.
    pub default: JsonValue,

    /// When false, an empty subtree is reported as a required field missing.
    pub allow_empty: bool,

    /// Only run the handler for this entity id; all other entities get the
    /// default without the handler being called.
    pub restricted_to: Option<String>,

    /// Name used in logs and reports. Defaults to the path.
    pub field_name: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            default: JsonValue::Object(Map::new()),
            allow_empty: true,
            restricted_to: None,
            field_name: None,
        }
    }
}

impl ExtractOptions {
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = default;
        self
    }

    pub fn require_non_empty(mut self) -> Self {
        self.allow_empty = false;
        self
    }

    pub fn restricted_to(mut self, entity_id: impl Into<String>) -> Self {
        self.restricted_to = Some(entity_id.into());
        self
    }

    pub fn named(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }
}

/// What happened when extracting one field for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldOutcome {
    /// The handler produced a value.
    Extracted,
    /// The path did not resolve for this entity.
    Missing,
    /// The path resolved to an empty subtree.
    Empty { required: bool },
    /// The field is restricted to another entity.
    Restricted,
    /// The handler reported a value it could not parse.
    Unparsed { raw: String },
    /// The handler returned an error or panicked.
    Failed { handler: String, reason: String },
}

impl FieldOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FieldOutcome::Failed { .. })
    }
}

/// Error type describing why a field has no extracted value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    MissingField { field: String },
    EmptyField { field: String },
    UnparsedValue { field: String, raw: String },
    HandlerFailed {
        field: String,
        handler: String,
        reason: String,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::MissingField { field } => write!(f, "Field '{}' is not present", field),
            ExtractError::EmptyField { field } => {
                write!(f, "Required field '{}' is missing or empty", field)
            }
            ExtractError::UnparsedValue { field, raw } => {
                write!(f, "Field '{}' has an unrecognized value: {:?}", field, raw)
            }
            ExtractError::HandlerFailed {
                field,
                handler,
                reason,
            } => write!(f, "Handler '{}' failed on field '{}': {}", handler, field, reason),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Result of one [`extract`] call. `value` is always usable: it holds the
/// handler's output or the configured default.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub field: String,
    pub value: JsonValue,
    pub outcome: FieldOutcome,
}

impl Extraction {
    pub fn is_extracted(&self) -> bool {
        self.outcome == FieldOutcome::Extracted
    }

    /// Convert into a typed result for callers that want to surface the
    /// failure reason themselves.
    pub fn into_result(self) -> Result<JsonValue, ExtractError> {
        let field = self.field;
        match self.outcome {
            FieldOutcome::Extracted => Ok(self.value),
            FieldOutcome::Missing | FieldOutcome::Restricted => {
                Err(ExtractError::MissingField { field })
            }
            FieldOutcome::Empty { .. } => Err(ExtractError::EmptyField { field }),
            FieldOutcome::Unparsed { raw } => Err(ExtractError::UnparsedValue { field, raw }),
            FieldOutcome::Failed { handler, reason } => Err(ExtractError::HandlerFailed {
                field,
                handler,
                reason,
            }),
        }
    }
}

/// Extract one field of one entity.
///
/// # Arguments
/// * `root` - The entity's document tree
/// * `path` - Dotted path to the field, e.g. `"Economy.Budget.revenues"`
/// * `handler` - Handler to run on the resolved subtree
/// * `options` - Default value, emptiness and restriction policy
/// * `entity_id` - Id of the entity being processed, passed to the handler
///
/// # Example
/// ```
/// use almanac::{extract, ExtractOptions, FieldNode, FieldOutcome, Handler};
/// use serde_json::json;
///
/// let root = FieldNode::from_json(&json!({"Economy": {}}));
/// let handler = Handler::data_only("noop", |_node: &FieldNode| Ok(json!(1)));
///
/// let result = extract(&root, "Economy.Budget.revenues", &handler, &ExtractOptions::default(), "XX");
/// assert_eq!(result.outcome, FieldOutcome::Missing);
/// assert_eq!(result.value, json!({}));
/// ```
pub fn extract(
    root: &FieldNode,
    path: &str,
    handler: &Handler,
    options: &ExtractOptions,
    entity_id: &str,
) -> Extraction {
    let path = FieldPath::from_dotted(path);
    let field = options
        .field_name
        .clone()
        .unwrap_or_else(|| path.raw.clone());

    let outcome = match options.restricted_to.as_deref() {
        Some(only) if only != entity_id => {
            tracing::trace!(entity = %entity_id, field = %field, "field restricted to {}", only);
            FieldOutcome::Restricted
        }
        _ => match path.resolve(root) {
            _ if path.is_empty() => FieldOutcome::Missing,
            None => {
                tracing::debug!(entity = %entity_id, field = %field, "field not present");
                FieldOutcome::Missing
            }
            Some(node) if node.is_empty() => {
                if !options.allow_empty {
                    tracing::warn!(entity = %entity_id, field = %field, "required field is empty");
                }
                FieldOutcome::Empty {
                    required: !options.allow_empty,
                }
            }
            Some(node) => {
                return run_handler(node, handler, options, entity_id, field);
            }
        },
    };

    Extraction {
        field,
        value: options.default.clone(),
        outcome,
    }
}

fn run_handler(
    node: &FieldNode,
    handler: &Handler,
    options: &ExtractOptions,
    entity_id: &str,
    field: String,
) -> Extraction {
    let result = catch_unwind(AssertUnwindSafe(|| handler.call(node, entity_id)))
        .unwrap_or_else(|panic| Err(HandlerError::Message(panic_message(panic.as_ref()))));

    let (value, outcome) = match result {
        Ok(value) => (value, FieldOutcome::Extracted),
        Err(HandlerError::Unparsed(raw)) => {
            tracing::debug!(entity = %entity_id, field = %field, raw = %raw, "unparsed value");
            (options.default.clone(), FieldOutcome::Unparsed { raw })
        }
        Err(err) => {
            tracing::error!(
                entity = %entity_id,
                field = %field,
                handler = %handler.name(),
                error = %err,
                "field handler failed"
            );
            (
                options.default.clone(),
                FieldOutcome::Failed {
                    handler: handler.name().to_string(),
                    reason: err.to_string(),
                },
            )
        }
    };

    Extraction {
        field,
        value,
        outcome,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> FieldNode {
        FieldNode::from_json(&json!({
            "Economy": {
                "Budget": {
                    "revenues": {"text": "$4.4 trillion (2022 est.)"},
                    "expenditures": {}
                }
            }
        }))
    }

    fn text_handler() -> Handler {
        Handler::data_only("text_len", |node: &FieldNode| {
            Ok(json!(node.text.as_deref().unwrap_or_default().len()))
        })
    }

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse("Economy.Budget.revenues", ".");

        assert_eq!(path.segments.len(), 3);
        assert_eq!(path.segments[0], "Economy");
        assert_eq!(path.segments[2], "revenues");
        assert_eq!(path.to_string(), "Economy.Budget.revenues");
    }

    #[test]
    fn test_field_path_skips_empty_segments() {
        let path = FieldPath::from_dotted(".a..b.");
        assert_eq!(path.segments, vec!["a", "b"]);
    }

    #[test]
    fn test_resolve() {
        let doc = document();
        assert!(resolve(&doc, "Economy.Budget.revenues").is_some());
        assert!(resolve(&doc, "Economy.Budget.missing").is_none());
        assert!(resolve(&doc, "Economy.Budget.revenues.deeper").is_none());
    }

    #[test]
    fn test_extract_success() {
        let result = extract(
            &document(),
            "Economy.Budget.revenues",
            &text_handler(),
            &ExtractOptions::default(),
            "US",
        );

        assert!(result.is_extracted());
        assert_eq!(result.value, json!(25));
        assert_eq!(result.field, "Economy.Budget.revenues");
    }

    #[test]
    fn test_missing_path_returns_default() {
        let doc = FieldNode::from_json(&json!({"Economy": {"Exports": {"text": "x"}}}));
        let options = ExtractOptions::default().with_default(json!({"value": null}));

        let result = extract(&doc, "Economy.Budget.revenues", &text_handler(), &options, "XX");

        assert_eq!(result.outcome, FieldOutcome::Missing);
        assert_eq!(result.value, json!({"value": null}));
    }

    #[test]
    fn test_empty_subtree_default_and_required() {
        let doc = document();

        let allowed = extract(
            &doc,
            "Economy.Budget.expenditures",
            &text_handler(),
            &ExtractOptions::default(),
            "US",
        );
        assert_eq!(allowed.outcome, FieldOutcome::Empty { required: false });
        assert_eq!(allowed.value, json!({}));

        let required = extract(
            &doc,
            "Economy.Budget.expenditures",
            &text_handler(),
            &ExtractOptions::default().require_non_empty(),
            "US",
        );
        assert_eq!(required.outcome, FieldOutcome::Empty { required: true });
        assert!(matches!(
            required.into_result(),
            Err(ExtractError::EmptyField { .. })
        ));
    }

    #[test]
    fn test_restricted_field_skips_handler() {
        let handler = Handler::data_only("boom", |_node: &FieldNode| -> Result<JsonValue, HandlerError> {
            panic!("must not be called")
        });
        let options = ExtractOptions::default().restricted_to("World");

        let result = extract(&document(), "Economy.Budget.revenues", &handler, &options, "US");
        assert_eq!(result.outcome, FieldOutcome::Restricted);
        assert_eq!(result.value, json!({}));

        let allowed = extract(&document(), "Economy.Budget.revenues", &text_handler(), &options, "World");
        assert!(allowed.is_extracted());
    }

    #[test]
    fn test_handler_error_isolated() {
        let handler = Handler::data_only("failing", |_node: &FieldNode| {
            Err(HandlerError::InvalidShape("expected children".to_string()))
        });

        let result = extract(
            &document(),
            "Economy.Budget.revenues",
            &handler,
            &ExtractOptions::default().named("revenues"),
            "US",
        );

        assert_eq!(result.value, json!({}));
        match &result.outcome {
            FieldOutcome::Failed { handler, reason } => {
                assert_eq!(handler, "failing");
                assert!(reason.contains("expected children"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(
            result.into_result(),
            Err(ExtractError::HandlerFailed { field, .. }) if field == "revenues"
        ));
    }

    #[test]
    fn test_handler_panic_isolated() {
        let handler = Handler::data_only("panicky", |_node: &FieldNode| -> Result<JsonValue, HandlerError> {
            panic!("index out of range")
        });

        let result = extract(
            &document(),
            "Economy.Budget.revenues",
            &handler,
            &ExtractOptions::default(),
            "US",
        );

        assert_eq!(result.value, json!({}));
        match result.outcome {
            FieldOutcome::Failed { reason, .. } => assert!(reason.contains("index out of range")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unparsed_handler_result() {
        let handler = Handler::data_only("strict", |node: &FieldNode| {
            let text = node.text.as_deref().unwrap_or_default();
            let parsed = crate::value::try_parse_value(text, &Default::default())?;
            Ok(json!(parsed.value))
        });
        let doc = FieldNode::new().child("Rate", FieldNode::with_text("varies by region"));

        let result = extract(&doc, "Rate", &handler, &ExtractOptions::default(), "XX");

        assert_eq!(
            result.outcome,
            FieldOutcome::Unparsed {
                raw: "varies by region".to_string()
            }
        );
        assert!(!result.outcome.is_failure());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = FieldOutcome::Failed {
            handler: "value".to_string(),
            reason: "bad".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"status": "failed", "handler": "value", "reason": "bad"})
        );
        assert_eq!(
            serde_json::to_value(FieldOutcome::Missing).unwrap(),
            json!({"status": "missing"})
        );
    }
}
