//! Arena-based document tree storage
//!
//! All nodes of all documents live in one arena and point at each other with
//! `NodeId`s, so parent/sibling back-references never form ownership cycles.
//!
//! ## Memory Layout
//!
//! ```text
//! slots: Vec<Slot>
//!        [gen|node][gen|free][gen|node]...
//!                      ↑ recycled through `free`, generation bumped
//! ```
//!
//! This module owns creation, lookup and the read-only traversal surface.
//! Structural mutation lives in `mutation.rs`.

use ahash::AHashMap;
use std::sync::Arc;

use crate::error::{DomError, Result};
use crate::events::{ListenerHandle, ListenerRegistry};
use crate::style::DocumentServices;
use crate::types::*;

/// `compare_document_position` bits, as defined by DOM Level 3
pub const DOCUMENT_POSITION_DISCONNECTED: u16 = 0x01;
pub const DOCUMENT_POSITION_PRECEDING: u16 = 0x02;
pub const DOCUMENT_POSITION_FOLLOWING: u16 = 0x04;
pub const DOCUMENT_POSITION_CONTAINS: u16 = 0x08;
pub const DOCUMENT_POSITION_CONTAINED_BY: u16 = 0x10;

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<DomNode>,
}

/// Arena allocator for document nodes
///
/// Design:
/// - Single Vec of slots, freed slots recycled through a free list
/// - Generation counter per slot, so stale ids fail instead of aliasing
/// - Listener registry and per-document collaborators stored beside the nodes
#[derive(Debug)]
pub struct DomArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,

    pub(crate) listeners: ListenerRegistry,

    /// Document node → collaborators (style, classification, host objects)
    pub(crate) services: AHashMap<NodeId, DocumentServices>,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
            listeners: ListenerRegistry::new(),
            services: AHashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------

    fn allocate(&mut self, node: DomNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index, 0)
    }

    /// Release one slot. Caller guarantees nothing links to it any more.
    pub(crate) fn release(&mut self, node_id: NodeId) -> Result<DomNode> {
        let slot = self
            .slots
            .get_mut(node_id.index as usize)
            .filter(|s| s.generation == node_id.generation)
            .ok_or(DomError::NodeNotFound(node_id))?;
        let node = slot.node.take().ok_or(DomError::NodeNotFound(node_id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(node_id.index);
        self.live -= 1;
        self.listeners.clear_slot(node_id);
        self.services.remove(&node_id);
        Ok(node)
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.slots
            .get(node_id.index as usize)
            .filter(|s| s.generation == node_id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    pub(crate) fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.slots
            .get_mut(node_id.index as usize)
            .filter(|s| s.generation == node_id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Whether `node_id` refers to a live node
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.get(node_id).is_ok()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterator over all live node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.node
                .as_ref()
                .map(|_| NodeId::new(i as u32, s.generation))
        })
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create an unattached node. `owner` is the document that created it.
    pub fn create_node(&mut self, kind: NodeKind, owner: Option<NodeId>) -> Result<NodeId> {
        if let Some(doc) = owner {
            if self.get(doc)?.node_type() != NodeType::Document {
                return Err(DomError::InvalidNodeType {
                    expected: "Document".to_string(),
                    actual: format!("{:?}", self.get(doc)?.node_type()),
                });
            }
        }
        if matches!(kind, NodeKind::Document) {
            return Ok(self.create_document());
        }
        Ok(self.allocate(DomNode::new(kind, owner)))
    }

    /// Create a new document root. A document owns itself.
    pub fn create_document(&mut self) -> NodeId {
        let id = self.allocate(DomNode::new(NodeKind::Document, None));
        if let Ok(node) = self.get_mut(id) {
            node.owner_document = Some(id);
        }
        id
    }

    pub fn create_element(&mut self, owner: Option<NodeId>, tag: &str) -> Result<NodeId> {
        self.create_node(NodeKind::Element(ElementData::new(tag)), owner)
    }

    pub fn create_text(&mut self, owner: Option<NodeId>, data: &str) -> Result<NodeId> {
        self.create_node(NodeKind::Text(data.to_string()), owner)
    }

    pub fn create_cdata(&mut self, owner: Option<NodeId>, data: &str) -> Result<NodeId> {
        self.create_node(NodeKind::CData(data.to_string()), owner)
    }

    pub fn create_comment(&mut self, owner: Option<NodeId>, data: &str) -> Result<NodeId> {
        self.create_node(NodeKind::Comment(data.to_string()), owner)
    }

    pub fn create_processing_instruction(
        &mut self,
        owner: Option<NodeId>,
        target: &str,
        data: &str,
    ) -> Result<NodeId> {
        self.create_node(
            NodeKind::ProcessingInstruction {
                target: target.to_string(),
                data: data.to_string(),
            },
            owner,
        )
    }

    pub fn create_document_fragment(&mut self, owner: Option<NodeId>) -> Result<NodeId> {
        self.create_node(NodeKind::DocumentFragment, owner)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn parent(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.parent)
    }

    pub fn first_child(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.first_child)
    }

    pub fn last_child(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.last_child)
    }

    pub fn next_sibling(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.next_sibling)
    }

    /// True backward link; `None` for a first child
    pub fn previous_sibling(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.previous_sibling)
    }

    /// Circular view of the backward link: a first child wraps to its
    /// parent's last child (itself, when it is the only child).
    pub fn wrapping_previous_sibling(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        let node = self.get(node_id)?;
        match (node.previous_sibling, node.parent) {
            (Some(prev), _) => Ok(Some(prev)),
            (None, Some(parent)) => self.last_child(parent),
            (None, None) => Ok(None),
        }
    }

    /// Lazy, forward-only sequence of direct children. Call again to restart.
    pub fn children(&self, node_id: NodeId) -> Result<Children<'_>> {
        Ok(Children {
            arena: self,
            next: self.get(node_id)?.first_child,
        })
    }

    /// Pre-order walk of every descendant (excluding `node_id` itself)
    pub fn descendants(&self, node_id: NodeId) -> Result<Descendants<'_>> {
        let first = self.get(node_id)?.first_child;
        Ok(Descendants {
            arena: self,
            root: node_id,
            next: first,
        })
    }

    pub fn has_child_nodes(&self, node_id: NodeId) -> Result<bool> {
        Ok(self.get(node_id)?.first_child.is_some())
    }

    pub fn child_count(&self, node_id: NodeId) -> Result<usize> {
        Ok(self.children(node_id)?.count())
    }

    /// `NodeList.item(index)`
    pub fn child_at(&self, node_id: NodeId, index: usize) -> Result<Option<NodeId>> {
        Ok(self.children(node_id)?.nth(index))
    }

    /// Ancestors with the root at the first position
    pub fn ancestors(&self, node_id: NodeId, include_self: bool) -> Result<Vec<NodeId>> {
        let mut list = Vec::new();
        if include_self {
            list.push(node_id);
        }
        let mut current = self.get(node_id)?.parent;
        while let Some(id) = current {
            list.push(id);
            current = self.get(id)?.parent;
        }
        list.reverse();
        Ok(list)
    }

    /// `node_id` followed by its ancestors, nearest first
    pub(crate) fn path_to_root(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        let mut path = vec![node_id];
        let mut current = self.get(node_id)?.parent;
        while let Some(id) = current {
            path.push(id);
            current = self.get(id)?.parent;
        }
        Ok(path)
    }

    /// True if `ancestor` is `node` or one of its ancestors. O(depth).
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = self.get(id)?.parent;
        }
        Ok(false)
    }

    /// Top of the parent chain
    pub fn root(&self, node_id: NodeId) -> Result<NodeId> {
        let mut current = node_id;
        while let Some(parent) = self.get(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// True when the parent chain ends at a document node
    pub fn is_connected(&self, node_id: NodeId) -> Result<bool> {
        let root = self.root(node_id)?;
        Ok(self.get(root)?.node_type() == NodeType::Document)
    }

    // ------------------------------------------------------------------
    // Node surface
    // ------------------------------------------------------------------

    pub fn node_type(&self, node_id: NodeId) -> Result<NodeType> {
        Ok(self.get(node_id)?.node_type())
    }

    pub fn node_name(&self, node_id: NodeId) -> Result<&str> {
        Ok(self.get(node_id)?.node_name())
    }

    pub fn node_value(&self, node_id: NodeId) -> Result<Option<&str>> {
        Ok(self.get(node_id)?.kind.node_value())
    }

    pub fn owner_document(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.owner_document)
    }

    pub fn attribute(&self, node_id: NodeId, name: &str) -> Result<Option<&str>> {
        Ok(self.get(node_id)?.attr(name))
    }

    pub fn set_attribute(&mut self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        let node = self.get_mut(node_id)?;
        let actual = node.node_type();
        let element = node.kind.as_element_mut().ok_or_else(|| DomError::InvalidNodeType {
            expected: "Element".to_string(),
            actual: format!("{:?}", actual),
        })?;
        element.set_attr(name, value);
        Ok(())
    }

    pub fn remove_attribute(&mut self, node_id: NodeId, name: &str) -> Result<Option<String>> {
        Ok(self
            .get_mut(node_id)?
            .kind
            .as_element_mut()
            .and_then(|e| e.remove_attr(name)))
    }

    /// Replace the data of a text, CDATA, comment or processing instruction node
    pub fn set_character_data(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        let node = self.get_mut(node_id)?;
        match &mut node.kind {
            NodeKind::Text(data) | NodeKind::CData(data) | NodeKind::Comment(data) => {
                *data = value.to_string();
            }
            NodeKind::ProcessingInstruction { data, .. } => *data = value.to_string(),
            other => {
                return Err(DomError::InvalidNodeType {
                    expected: "character data".to_string(),
                    actual: format!("{:?}", other.node_type()),
                })
            }
        }
        Ok(())
    }

    /// DOM `textContent`: concatenated character data of the subtree,
    /// skipping comments and processing instructions below the node.
    pub fn text_content(&self, node_id: NodeId) -> Result<Option<String>> {
        let node = self.get(node_id)?;
        match node.node_type() {
            NodeType::Document => Ok(None),
            NodeType::Element | NodeType::DocumentFragment => {
                let mut text = String::new();
                self.collect_text_content(node_id, &mut text)?;
                Ok(Some(text))
            }
            _ => Ok(node.kind.node_value().map(str::to_string)),
        }
    }

    fn collect_text_content(&self, node_id: NodeId, out: &mut String) -> Result<()> {
        let mut stack: Vec<NodeId> = self.children(node_id)?.collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let node = self.get(id)?;
            match &node.kind {
                NodeKind::Text(data) | NodeKind::CData(data) => out.push_str(data),
                NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. } => {}
                _ => {
                    let mut kids: Vec<NodeId> = self.children(id)?.collect();
                    kids.reverse();
                    stack.extend(kids);
                }
            }
        }
        Ok(())
    }

    pub fn source_span(&self, node_id: NodeId) -> Result<SourceSpan> {
        Ok(self.get(node_id)?.source_span)
    }

    /// Record the parser position. Allowed once per node.
    pub fn set_source_span(&mut self, node_id: NodeId, span: SourceSpan) -> Result<()> {
        let node = self.get_mut(node_id)?;
        if node.source_span.is_known() {
            return Err(DomError::IllegalState(format!(
                "source span of node {} is already set",
                node_id
            )));
        }
        node.source_span = span;
        Ok(())
    }

    /// Owned copy of the subtree rooted at `node_id`
    pub fn snapshot(&self, node_id: NodeId) -> Result<NodeSnapshot> {
        let node = self.get(node_id)?;
        let children = self
            .children(node_id)?
            .map(|child| self.snapshot(child))
            .collect::<Result<Vec<_>>>()?;
        Ok(NodeSnapshot {
            node_type: node.node_type(),
            node_name: node.node_name().to_string(),
            node_value: node.kind.node_value().map(str::to_string),
            attributes: node
                .kind
                .as_element()
                .map(|e| e.attributes.to_vec())
                .unwrap_or_default(),
            children,
        })
    }

    /// Position of `other` relative to `node_id`
    pub fn compare_document_position(&self, node_id: NodeId, other: NodeId) -> Result<u16> {
        if node_id == other {
            return Ok(0);
        }

        let mine = self.ancestors(node_id, true)?;
        let theirs = self.ancestors(other, true)?;
        if mine[0] != theirs[0] {
            return Ok(DOCUMENT_POSITION_DISCONNECTED);
        }

        let max = mine.len().min(theirs.len());
        let mut i = 1;
        while i < max && mine[i] == theirs[i] {
            i += 1;
        }

        if i == max {
            // One chain is a prefix of the other
            if mine.len() == max {
                return Ok(DOCUMENT_POSITION_CONTAINED_BY | DOCUMENT_POSITION_FOLLOWING);
            }
            return Ok(DOCUMENT_POSITION_CONTAINS | DOCUMENT_POSITION_PRECEDING);
        }

        // Diverging branches under a common parent: whichever comes first
        let mut sibling = self.get(mine[i])?.previous_sibling;
        while let Some(id) = sibling {
            if id == theirs[i] {
                return Ok(DOCUMENT_POSITION_PRECEDING);
            }
            sibling = self.get(id)?.previous_sibling;
        }
        Ok(DOCUMENT_POSITION_FOLLOWING)
    }

    // ------------------------------------------------------------------
    // Listeners and collaborators
    // ------------------------------------------------------------------

    /// Shared listener registry. Clone it to register from other threads.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Register a change listener for `node_id` and all its descendants
    pub fn add_change_listener(&self, node_id: NodeId, listener: ListenerHandle) -> Result<()> {
        self.get(node_id)?;
        self.listeners.add(node_id, listener);
        Ok(())
    }

    pub fn remove_change_listener(&self, node_id: NodeId, listener: &ListenerHandle) -> Result<bool> {
        self.get(node_id)?;
        Ok(self.listeners.remove(node_id, listener))
    }

    /// Install style, classification and host-object collaborators for a document
    pub fn set_document_services(&mut self, document: NodeId, services: DocumentServices) -> Result<()> {
        let actual = self.get(document)?.node_type();
        if actual != NodeType::Document {
            return Err(DomError::InvalidNodeType {
                expected: "Document".to_string(),
                actual: format!("{:?}", actual),
            });
        }
        self.services.insert(document, services);
        Ok(())
    }

    /// Collaborators of the document owning `node_id`, if any were installed
    pub fn services_for(&self, node_id: NodeId) -> Result<Option<&DocumentServices>> {
        Ok(self
            .get(node_id)?
            .owner_document
            .and_then(|doc| self.services.get(&doc)))
    }

    /// Script-host object of a node, created on first access through the
    /// owning document's factory and memoized on the node.
    pub fn host_object(&mut self, node_id: NodeId) -> Result<HostHandle> {
        let node = self.get(node_id)?;
        if let Some(handle) = &node.host_object {
            return Ok(Arc::clone(handle));
        }

        let owner = node.owner_document.ok_or(DomError::NoOwnerDocument(node_id))?;
        if owner == node_id {
            return Err(DomError::IllegalState(
                "no host object associated with the document itself".to_string(),
            ));
        }
        let factory = self
            .services
            .get(&owner)
            .and_then(|s| s.host_factory.clone())
            .ok_or_else(|| {
                DomError::IllegalState(format!("document {} has no host object factory", owner))
            })?;

        let handle = factory.make_host_object(self, node_id);
        self.get_mut(node_id)?.host_object = Some(Arc::clone(&handle));
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // DOM operations deliberately left out
    // ------------------------------------------------------------------

    pub fn normalize(&mut self, _node_id: NodeId) -> Result<()> {
        Err(DomError::Unsupported("DomNode.normalize"))
    }

    pub fn is_equal_node(&self, _node_id: NodeId, _other: NodeId) -> Result<bool> {
        Err(DomError::Unsupported("DomNode.isEqualNode"))
    }

    pub fn is_supported(&self, _node_id: NodeId, _feature: &str, _version: &str) -> Result<bool> {
        Err(DomError::Unsupported("DomNode.isSupported"))
    }

    pub fn base_uri(&self, _node_id: NodeId) -> Result<String> {
        Err(DomError::Unsupported("DomNode.baseURI"))
    }

    pub fn lookup_prefix(&self, _node_id: NodeId, _namespace_uri: &str) -> Result<Option<String>> {
        Err(DomError::Unsupported("DomNode.lookupPrefix"))
    }

    pub fn lookup_namespace_uri(&self, _node_id: NodeId, _prefix: &str) -> Result<Option<String>> {
        Err(DomError::Unsupported("DomNode.lookupNamespaceURI"))
    }

    pub fn is_default_namespace(&self, _node_id: NodeId, _namespace_uri: &str) -> Result<bool> {
        Err(DomError::Unsupported("DomNode.isDefaultNamespace"))
    }

    pub fn feature(&self, _node_id: NodeId, _feature: &str, _version: &str) -> Result<HostHandle> {
        Err(DomError::Unsupported("DomNode.getFeature"))
    }

    pub fn user_data(&self, _node_id: NodeId, _key: &str) -> Result<Option<HostHandle>> {
        Err(DomError::Unsupported("DomNode.getUserData"))
    }

    pub fn set_user_data(
        &mut self,
        _node_id: NodeId,
        _key: &str,
        _data: HostHandle,
    ) -> Result<Option<HostHandle>> {
        Err(DomError::Unsupported("DomNode.setUserData"))
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over direct children
#[derive(Clone)]
pub struct Children<'a> {
    arena: &'a DomArena,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.arena.get(current).ok().and_then(|n| n.next_sibling);
        Some(current)
    }
}

/// Pre-order iterator over a subtree, without recursion
#[derive(Clone)]
pub struct Descendants<'a> {
    arena: &'a DomArena,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        let node = self.arena.get(current).ok()?;

        self.next = match node.first_child {
            Some(child) => Some(child),
            None => {
                // Climb until a node with a following sibling, stopping at the root
                let mut cursor = current;
                loop {
                    if cursor == self.root {
                        break None;
                    }
                    let n = self.arena.get(cursor).ok()?;
                    if let Some(sibling) = n.next_sibling {
                        break Some(sibling);
                    }
                    match n.parent {
                        Some(parent) if parent != self.root => cursor = parent,
                        _ => break None,
                    }
                }
            }
        };
        Some(current)
    }
}
