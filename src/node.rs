//! Raw field tree for one entity document.
//!
//! Every labeled field in an almanac document has the same recursive shape:
//! an optional `text`, an optional `note`, and any number of named children.
//! This module provides that shape and the conversion from parsed JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Key holding a node's text in the source document.
pub const TEXT_KEY: &str = "text";

/// Key holding a node's note in the source document.
pub const NOTE_KEY: &str = "note";

/// One field of an entity document.
///
/// Nodes are built once when a document is loaded and never mutated
/// afterwards. Children keep the order they had in the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, FieldNode>,
}

impl FieldNode {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node holding only text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Builder-style note setter.
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Builder-style child insertion.
    pub fn child(mut self, key: impl Into<String>, node: FieldNode) -> Self {
        self.children.insert(key.into(), node);
        self
    }

    /// Convert a parsed JSON document (or any part of one) into a node tree.
    ///
    /// # Example
    ///
    /// ```
    /// use almanac::FieldNode;
    /// use serde_json::json;
    ///
    /// let node = FieldNode::from_json(&json!({
    ///     "Area": {"total": {"text": "9,833,517 sq km"}, "note": "includes only the 50 states"}
    /// }));
    /// let area = node.get("Area").unwrap();
    /// assert_eq!(area.note.as_deref(), Some("includes only the 50 states"));
    /// assert!(area.get("total").is_some());
    /// ```
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => {
                let mut node = FieldNode::new();
                for (key, child) in map {
                    match (key.as_str(), child) {
                        (TEXT_KEY, JsonValue::String(s)) => node.text = Some(s.clone()),
                        (NOTE_KEY, JsonValue::String(s)) => node.note = Some(s.clone()),
                        _ => {
                            node.children.insert(key.clone(), FieldNode::from_json(child));
                        }
                    }
                }
                node
            }
            JsonValue::String(s) => FieldNode::with_text(s.clone()),
            JsonValue::Number(n) => FieldNode::with_text(n.to_string()),
            JsonValue::Bool(b) => FieldNode::with_text(b.to_string()),
            JsonValue::Array(items) => {
                let mut node = FieldNode::new();
                for (index, item) in items.iter().enumerate() {
                    node.children.insert(index.to_string(), FieldNode::from_json(item));
                }
                node
            }
            JsonValue::Null => FieldNode::new(),
        }
    }

    /// Look up a direct child by its exact label.
    pub fn get(&self, key: &str) -> Option<&FieldNode> {
        self.children.get(key)
    }

    /// Text of the node with surrounding whitespace removed, if non-blank.
    pub fn text_trimmed(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Note of the node with surrounding whitespace removed, if non-blank.
    pub fn note_trimmed(&self) -> Option<&str> {
        self.note.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// A node is empty when it carries no non-blank text, no non-blank note,
    /// and every child is itself empty.
    pub fn is_empty(&self) -> bool {
        self.text_trimmed().is_none()
            && self.note_trimmed().is_none()
            && self.children.values().all(FieldNode::is_empty)
    }

    /// Iterate over `(label, child)` pairs in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldNode)> {
        self.children.iter()
    }
}
