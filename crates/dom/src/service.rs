//! DOM Service - builds document trees from CDP-style JSON
//!
//! This handles:
//! - Parsing a `DOM.getDocument`-shaped node description
//! - Tree construction through the regular mutation API
//! - Stamping parser source positions on the created nodes
//!
//! Input format:
//! ```json
//! {
//!   "root": {
//!     "nodeType": 9,
//!     "nodeName": "#document",
//!     "children": [{
//!       "nodeType": 1,
//!       "nodeName": "HTML",
//!       "attributes": ["lang", "en"],
//!       "sourceSpan": [1, 1, 40, 8],
//!       "children": [...]
//!     }]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::*;

/// Configuration for DOM service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomServiceConfig {
    /// Read `sourceSpan` arrays into node source spans
    pub track_source_spans: bool,
    /// Deepest nesting accepted below the document node
    pub max_depth: usize,
}

impl Default for DomServiceConfig {
    fn default() -> Self {
        Self {
            track_source_spans: true,
            max_depth: 512,
        }
    }
}

/// Main DOM service
pub struct DomService {
    config: DomServiceConfig,
    arena: DomArena,
}

impl DomService {
    /// Create new DOM service with default config
    pub fn new() -> Self {
        Self::with_config(DomServiceConfig::default())
    }

    /// Create DOM service with custom config
    pub fn with_config(config: DomServiceConfig) -> Self {
        Self::with_arena(config, DomArena::new())
    }

    /// Load documents into an existing arena
    pub fn with_arena(config: DomServiceConfig, arena: DomArena) -> Self {
        Self { config, arena }
    }

    pub fn config(&self) -> &DomServiceConfig {
        &self.config
    }

    /// Get reference to internal arena
    pub fn arena(&self) -> &DomArena {
        &self.arena
    }

    /// Get mutable reference to internal arena
    pub fn arena_mut(&mut self) -> &mut DomArena {
        &mut self.arena
    }

    pub fn into_arena(self) -> DomArena {
        self.arena
    }

    /// Parse a JSON document description into a new document.
    ///
    /// Accepts either `{"root": {...}}` or the document node itself. Returns
    /// the id of the created document node. Node types without a tree
    /// counterpart (doctype, attribute nodes) are skipped.
    pub fn parse_document(&mut self, description: &Value) -> Result<NodeId> {
        let root = description.get("root").unwrap_or(description);

        let node_type = read_node_type(root)?;
        if node_type != Some(NodeType::Document) {
            return Err(DomError::InvalidNodeType {
                expected: "Document".to_string(),
                actual: describe_type(root),
            });
        }

        let before = self.arena.len();
        let doc = self.arena.create_document();
        let built = self
            .apply_source_span(doc, root)
            .and_then(|()| self.parse_children(root, doc, doc, 1));
        if let Err(e) = built {
            self.discard_partial(doc);
            return Err(e);
        }

        tracing::debug!(
            "Loaded document {} ({} nodes)",
            doc,
            self.arena.len() - before
        );
        Ok(doc)
    }

    /// Like [`parse_document`](Self::parse_document), from JSON text
    pub fn parse_str(&mut self, json: &str) -> Result<NodeId> {
        let description: Value = serde_json::from_str(json)?;
        self.parse_document(&description)
    }

    fn parse_children(&mut self, json: &Value, doc: NodeId, parent: NodeId, depth: usize) -> Result<()> {
        let Some(children) = json["children"].as_array() else {
            return Ok(());
        };
        if depth > self.config.max_depth {
            return Err(DomError::MaxDepthExceeded {
                current: depth,
                max: self.config.max_depth,
            });
        }

        for child in children {
            if let Some(child_id) = self.parse_node(child, doc, depth)? {
                if let Err(e) = self.arena.append_child(parent, child_id) {
                    self.discard_partial(child_id);
                    return Err(e);
                }
                // A fragment hands over its children and stays behind empty
                if self.arena.node_type(child_id)? == NodeType::DocumentFragment {
                    self.discard_partial(child_id);
                }
            }
        }
        Ok(())
    }

    /// Create one node and its subtree, still detached from any parent
    fn parse_node(&mut self, json: &Value, doc: NodeId, depth: usize) -> Result<Option<NodeId>> {
        let Some(node_type) = read_node_type(json)? else {
            tracing::debug!("Skipping node of type {}", describe_type(json));
            return Ok(None);
        };

        let node_name = json["nodeName"].as_str().unwrap_or("");
        let node_value = json["nodeValue"].as_str().unwrap_or("");

        let node_id = match node_type {
            NodeType::Element => self
                .arena
                .create_element(Some(doc), &node_name.to_ascii_lowercase())?,
            NodeType::Text => self.arena.create_text(Some(doc), node_value)?,
            NodeType::CdataSection => self.arena.create_cdata(Some(doc), node_value)?,
            NodeType::Comment => self.arena.create_comment(Some(doc), node_value)?,
            NodeType::ProcessingInstruction => {
                self.arena
                    .create_processing_instruction(Some(doc), node_name, node_value)?
            }
            NodeType::DocumentFragment => self.arena.create_document_fragment(Some(doc))?,
            NodeType::Document => {
                return Err(DomError::InvalidNodeType {
                    expected: "child node".to_string(),
                    actual: "Document".to_string(),
                })
            }
        };

        let built = self
            .apply_attributes(node_id, node_type, json)
            .and_then(|()| self.apply_source_span(node_id, json))
            .and_then(|()| self.parse_children(json, doc, node_id, depth + 1));
        match built {
            Ok(()) => Ok(Some(node_id)),
            Err(e) => {
                self.discard_partial(node_id);
                Err(e)
            }
        }
    }

    /// Free a detached node left behind by a failed parse
    fn discard_partial(&mut self, node_id: NodeId) {
        if let Err(e) = self.arena.discard(node_id) {
            tracing::warn!("Could not free partially parsed node {}: {}", node_id, e);
        }
    }

    /// Flat `[name, value, name, value, ...]` pairs; a dangling name is ignored
    fn apply_attributes(&mut self, node_id: NodeId, node_type: NodeType, json: &Value) -> Result<()> {
        if node_type != NodeType::Element {
            return Ok(());
        }
        let Some(attrs) = json["attributes"].as_array() else {
            return Ok(());
        };
        for pair in attrs.chunks_exact(2) {
            if let (Some(name), Some(value)) = (pair[0].as_str(), pair[1].as_str()) {
                self.arena.set_attribute(node_id, name, value)?;
            }
        }
        Ok(())
    }

    fn apply_source_span(&mut self, node_id: NodeId, json: &Value) -> Result<()> {
        if !self.config.track_source_spans {
            return Ok(());
        }
        let Some(span) = json.get("sourceSpan").and_then(Value::as_array) else {
            return Ok(());
        };

        let numbers: Vec<i32> = span
            .iter()
            .filter_map(Value::as_i64)
            .filter_map(|n| i32::try_from(n).ok())
            .collect();
        if let [start_line, start_column, end_line, end_column] = numbers[..] {
            self.arena.set_source_span(
                node_id,
                SourceSpan::new(start_line, start_column, end_line, end_column),
            )?;
        }
        Ok(())
    }
}

impl Default for DomService {
    fn default() -> Self {
        Self::new()
    }
}

/// `Ok(None)` for well-formed node types the tree does not model
fn read_node_type(json: &Value) -> Result<Option<NodeType>> {
    let value = json["nodeType"]
        .as_u64()
        .ok_or_else(|| DomError::InvalidNodeType {
            expected: "numeric nodeType".to_string(),
            actual: describe_type(json),
        })?;
    Ok(u8::try_from(value).ok().and_then(NodeType::from_u8))
}

fn describe_type(json: &Value) -> String {
    match json.get("nodeType") {
        Some(value) => value.to_string(),
        None => "missing nodeType".to_string(),
    }
}
