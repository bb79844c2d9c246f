//! Core type definitions for the document tree
//!
//! Key design principles:
//! 1. Nodes refer to each other by `NodeId` (index + generation), never by pointer
//! 2. Kind-specific payload lives in one enum, no trait objects per node
//! 3. Use SmallVec for small arrays (most elements carry a handful of attributes)
//! 4. Link fields are crate-private: only the mutation engine may rewire them

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Node identifier (slot index + generation)
///
/// The generation changes every time a slot is recycled, so an id held after
/// its node was discarded never aliases a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the arena
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Node type matching the DOM specification numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    CdataSection = 4,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentFragment = 11,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            3 => Some(NodeType::Text),
            4 => Some(NodeType::CdataSection),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            11 => Some(NodeType::DocumentFragment),
            _ => None,
        }
    }
}

/// A single element attribute, kept in source order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Element payload: tag name plus generic attribute storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    pub tag_name: String,
    pub attributes: SmallVec<[Attribute; 4]>,
}

impl ElementData {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: SmallVec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute::new(name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(pos).value)
    }
}

/// Variant tag plus kind-specific payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
    DocumentFragment,
    Document,
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Element(_) => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::CData(_) => NodeType::CdataSection,
            NodeKind::Comment(_) => NodeType::Comment,
            NodeKind::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            NodeKind::DocumentFragment => NodeType::DocumentFragment,
            NodeKind::Document => NodeType::Document,
        }
    }

    /// DOM `nodeName`
    pub fn node_name(&self) -> &str {
        match self {
            NodeKind::Element(e) => &e.tag_name,
            NodeKind::Text(_) => "#text",
            NodeKind::CData(_) => "#cdata-section",
            NodeKind::Comment(_) => "#comment",
            NodeKind::ProcessingInstruction { target, .. } => target,
            NodeKind::DocumentFragment => "#document-fragment",
            NodeKind::Document => "#document",
        }
    }

    /// DOM `nodeValue`: character data for data-bearing nodes, `None` otherwise
    pub fn node_value(&self) -> Option<&str> {
        match self {
            NodeKind::Text(data) | NodeKind::CData(data) | NodeKind::Comment(data) => Some(data),
            NodeKind::ProcessingInstruction { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Content that is rendered as visible text (text and CDATA sections)
    pub fn rendered_text(&self) -> Option<&str> {
        match self {
            NodeKind::Text(data) | NodeKind::CData(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&ElementData> {
        match self {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match self {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// Source position recorded by the parser, `-1` everywhere when unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: i32,
    pub start_column: i32,
    pub end_line: i32,
    pub end_column: i32,
}

impl SourceSpan {
    pub const UNKNOWN: SourceSpan = SourceSpan {
        start_line: -1,
        start_column: -1,
        end_line: -1,
        end_column: -1,
    };

    pub fn new(start_line: i32, start_column: i32, end_line: i32, end_column: i32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }
}

impl Default for SourceSpan {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Script-host object attached to a node
pub type HostHandle = Arc<dyn Any + Send + Sync>;

/// One node of the tree
///
/// Design:
/// - Explicit `last_child` instead of wrapping the first child's back link
/// - `previous_sibling` is a true backward link (`None` for a first child)
/// - Link fields are only written by the mutation engine
#[derive(Debug)]
pub struct DomNode {
    pub(crate) kind: NodeKind,
    pub(crate) owner_document: Option<NodeId>,

    // Navigation
    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub(crate) previous_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,

    pub(crate) source_span: SourceSpan,
    pub(crate) host_object: Option<HostHandle>,
}

impl DomNode {
    pub(crate) fn new(kind: NodeKind, owner_document: Option<NodeId>) -> Self {
        Self {
            kind,
            owner_document,
            parent: None,
            first_child: None,
            last_child: None,
            previous_sibling: None,
            next_sibling: None,
            source_span: SourceSpan::UNKNOWN,
            host_object: None,
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn node_name(&self) -> &str {
        self.kind.node_name()
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        self.kind.as_element().map(|e| e.tag_name.as_str())
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    /// Get attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.kind.as_element().and_then(|e| e.attr(name))
    }

    pub fn owner_document(&self) -> Option<NodeId> {
        self.owner_document
    }

    pub fn source_span(&self) -> SourceSpan {
        self.source_span
    }

    pub fn has_host_object(&self) -> bool {
        self.host_object.is_some()
    }
}

/// Owned, serializable copy of a subtree
///
/// Used to compare subtrees structurally (e.g. a deep clone against its
/// source) and to dump trees as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_type: NodeType,
    pub node_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<NodeSnapshot>,
}

/// Elements rendered as blocks by the default classifier
pub const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "center",
    "dd",
    "dir",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "html",
    "li",
    "main",
    "menu",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tbody",
    "tfoot",
    "thead",
    "tr",
    "ul",
];

/// Elements whose content is never rendered as text
pub const NON_RENDERED_ELEMENTS: &[&str] = &["head", "noscript", "script", "style", "template"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names() {
        assert_eq!(NodeKind::Text("x".into()).node_name(), "#text");
        assert_eq!(NodeKind::CData("x".into()).node_name(), "#cdata-section");
        assert_eq!(NodeKind::Document.node_name(), "#document");
        let pi = NodeKind::ProcessingInstruction {
            target: "xml-stylesheet".into(),
            data: "href='a.css'".into(),
        };
        assert_eq!(pi.node_name(), "xml-stylesheet");
        assert_eq!(pi.node_value(), Some("href='a.css'"));
    }

    #[test]
    fn test_node_type_from_u8() {
        assert_eq!(NodeType::from_u8(1), Some(NodeType::Element));
        assert_eq!(NodeType::from_u8(11), Some(NodeType::DocumentFragment));
        assert_eq!(NodeType::from_u8(10), None);
    }

    #[test]
    fn test_element_attributes() {
        let mut el = ElementData::new("div");
        el.set_attr("id", "a");
        el.set_attr("class", "x");
        el.set_attr("id", "b");

        assert_eq!(el.attr("id"), Some("b"));
        assert_eq!(el.attributes.len(), 2);
        assert_eq!(el.remove_attr("class"), Some("x".to_string()));
        assert_eq!(el.attr("class"), None);
    }

    #[test]
    fn test_source_span_default_is_unknown() {
        let span = SourceSpan::default();
        assert!(!span.is_known());
        assert_eq!(span.start_line, -1);
        assert!(SourceSpan::new(1, 1, 1, 10).is_known());
    }

    #[test]
    fn test_rendered_text_excludes_comments() {
        assert_eq!(NodeKind::Text("a".into()).rendered_text(), Some("a"));
        assert_eq!(NodeKind::CData("b".into()).rendered_text(), Some("b"));
        assert_eq!(NodeKind::Comment("c".into()).rendered_text(), None);
    }
}
