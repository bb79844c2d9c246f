//! Collaborator seams - style, element classification, host objects
//!
//! The tree never computes CSS itself. A document gets a [`DocumentServices`]
//! bundle and every "is this rendered" question is delegated through it.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::arena::DomArena;
use crate::error::Result;
use crate::text::NEW_LINE;
use crate::types::{HostHandle, NodeId, BLOCK_ELEMENTS, NON_RENDERED_ELEMENTS};

/// Resolved CSS `display`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayValue {
    /// No explicit value
    Unspecified,
    /// `display: none` - the node and its subtree are not rendered
    None,
    Block,
    Inline,
    InlineBlock,
    ListItem,
    Table,
    Other,
}

impl DisplayValue {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => DisplayValue::Unspecified,
            "none" => DisplayValue::None,
            "block" => DisplayValue::Block,
            "inline" => DisplayValue::Inline,
            "inline-block" => DisplayValue::InlineBlock,
            "list-item" => DisplayValue::ListItem,
            "table" => DisplayValue::Table,
            _ => DisplayValue::Other,
        }
    }

    pub fn is_rendered(&self) -> bool {
        *self != DisplayValue::None
    }
}

/// Resolved CSS `visibility`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisibilityValue {
    Unspecified,
    Visible,
    Hidden,
    Collapse,
}

impl VisibilityValue {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "visible" => VisibilityValue::Visible,
            "hidden" => VisibilityValue::Hidden,
            "collapse" => VisibilityValue::Collapse,
            _ => VisibilityValue::Unspecified,
        }
    }
}

/// Read-only style queries answered by the style cascade
pub trait StyleResolver: Send + Sync {
    fn resolved_display(&self, arena: &DomArena, node: NodeId) -> DisplayValue;
    fn resolved_visibility(&self, arena: &DomArena, node: NodeId) -> VisibilityValue;
}

/// Element classification used by the text serializer
pub trait ElementClassifier: Send + Sync {
    /// Block nodes are surrounded by line breaks in rendered text
    fn is_block(&self, arena: &DomArena, node: NodeId) -> bool;

    /// Element-specific rendered text replacing the children's text.
    /// May contain the text markers from [`crate::text`].
    fn text_override(&self, arena: &DomArena, node: NodeId) -> Option<String> {
        let _ = (arena, node);
        None
    }
}

/// Creates script-host objects for nodes of one document
pub trait HostObjectFactory: Send + Sync {
    fn make_host_object(&self, arena: &DomArena, node: NodeId) -> HostHandle;
}

/// Collaborators of one document
#[derive(Clone)]
pub struct DocumentServices {
    pub style: Arc<dyn StyleResolver>,
    pub classifier: Arc<dyn ElementClassifier>,
    pub host_factory: Option<Arc<dyn HostObjectFactory>>,
}

impl DocumentServices {
    pub fn new(style: Arc<dyn StyleResolver>) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ElementClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_host_factory(mut self, factory: Arc<dyn HostObjectFactory>) -> Self {
        self.host_factory = Some(factory);
        self
    }
}

impl Default for DocumentServices {
    fn default() -> Self {
        Self {
            style: Arc::new(InlineStyleResolver),
            classifier: Arc::new(HtmlClassifier),
            host_factory: None,
        }
    }
}

impl fmt::Debug for DocumentServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentServices")
            .field("host_factory", &self.host_factory.is_some())
            .finish_non_exhaustive()
    }
}

/// Parse `style` attribute declarations (`"display: none; color: red"`)
pub fn parse_declarations(style: &str) -> AHashMap<String, String> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_end_matches("!important").trim();
            Some((name, value.to_string()))
        })
        .collect()
}

/// Resolves display/visibility from the element's own `style` attribute.
/// The boolean `hidden` attribute counts as `display: none`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineStyleResolver;

impl InlineStyleResolver {
    fn declaration(arena: &DomArena, node: NodeId, property: &str) -> Option<String> {
        let style = arena.get(node).ok()?.attr("style")?;
        parse_declarations(style).remove(property)
    }
}

impl StyleResolver for InlineStyleResolver {
    fn resolved_display(&self, arena: &DomArena, node: NodeId) -> DisplayValue {
        let hidden = arena
            .get(node)
            .map(|n| n.attr("hidden").is_some())
            .unwrap_or(false);
        if hidden {
            return DisplayValue::None;
        }
        Self::declaration(arena, node, "display")
            .map(|v| DisplayValue::parse(&v))
            .unwrap_or(DisplayValue::Unspecified)
    }

    fn resolved_visibility(&self, arena: &DomArena, node: NodeId) -> VisibilityValue {
        Self::declaration(arena, node, "visibility")
            .map(|v| VisibilityValue::parse(&v))
            .unwrap_or(VisibilityValue::Unspecified)
    }
}

/// Default HTML element classification
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlClassifier;

impl HtmlClassifier {
    fn tag(arena: &DomArena, node: NodeId) -> Option<String> {
        arena
            .get(node)
            .ok()?
            .tag_name()
            .map(|t| t.to_ascii_lowercase())
    }
}

impl ElementClassifier for HtmlClassifier {
    fn is_block(&self, arena: &DomArena, node: NodeId) -> bool {
        Self::tag(arena, node)
            .map(|t| BLOCK_ELEMENTS.contains(&t.as_str()))
            .unwrap_or(false)
    }

    fn text_override(&self, arena: &DomArena, node: NodeId) -> Option<String> {
        let tag = Self::tag(arena, node)?;
        if tag == "br" {
            return Some(NEW_LINE.to_string());
        }
        if NON_RENDERED_ELEMENTS.contains(&tag.as_str()) {
            return Some(String::new());
        }
        None
    }
}

impl DomArena {
    /// True if the node would be displayed to a user, ignoring layout.
    ///
    /// Nodes of documents without installed services are always displayed.
    pub fn is_displayed(&self, node_id: NodeId) -> Result<bool> {
        let style = match self.services_for(node_id)? {
            Some(services) => Arc::clone(&services.style),
            None => return Ok(true),
        };

        // display: root to node, a non-rendered ancestor can't be overridden
        for id in self.ancestors(node_id, true)? {
            if self.get(id)?.is_element() && !style.resolved_display(self, id).is_rendered() {
                return Ok(false);
            }
        }

        // visibility: node to root, the nearest explicit value wins
        for id in self.path_to_root(node_id)? {
            if !self.get(id)?.is_element() {
                continue;
            }
            match style.resolved_visibility(self, id) {
                VisibilityValue::Visible => return Ok(true),
                VisibilityValue::Hidden | VisibilityValue::Collapse => return Ok(false),
                VisibilityValue::Unspecified => {}
            }
        }

        Ok(true)
    }

    /// Block classification for `node_id`, through the document's classifier
    pub fn is_block(&self, node_id: NodeId) -> Result<bool> {
        Ok(match self.services_for(node_id)? {
            Some(services) => services.classifier.is_block(self, node_id),
            None => HtmlClassifier.is_block(self, node_id),
        })
    }
}
