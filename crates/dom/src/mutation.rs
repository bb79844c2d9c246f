//! Structural mutation of the tree
//!
//! Every public operation runs in two stages:
//! 1. validate, then rewire links (nothing observable happens yet)
//! 2. deliver the collected change events
//!
//! A rejected operation therefore leaves the tree untouched, and a failing
//! listener can only stop later listeners, never undo a half-applied change.
//!
//! Event contract:
//! - insertion: "added" from the new parent up to the root; skipped when the
//!   new parent is a document fragment
//! - removal: "deleted" to the removed node's own listeners, then from the
//!   former parent up to the root
//! - move (inserting a node that already has a parent): "deleted" for the old
//!   position followed by "added" for the new one
//! - fragment children flattened into a parent only report "added"

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::events::DomChangeEvent;
use crate::types::*;

/// An event together with the nodes it is delivered to, nearest first
struct Notice {
    event: DomChangeEvent,
    path: Vec<NodeId>,
}

impl DomArena {
    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Append `node` as the last child of `parent`.
    ///
    /// A document fragment is flattened: its children move into `parent` in
    /// order and the fragment is left empty. Returns `node`.
    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> Result<NodeId> {
        let notices = self.insert_quietly(parent, node, None)?;
        self.notify(notices)?;
        Ok(node)
    }

    /// Insert `new_node` immediately before `reference`.
    ///
    /// `reference` must currently have a parent. Inserting a node before
    /// itself does nothing.
    pub fn insert_before(&mut self, reference: NodeId, new_node: NodeId) -> Result<()> {
        let parent = self.get(reference)?.parent;
        self.get(new_node)?;
        if new_node == reference {
            return Ok(());
        }
        let parent = parent.ok_or_else(|| {
            DomError::IllegalState(format!(
                "node {} has no parent to insert before",
                reference
            ))
        })?;

        let notices = self.insert_quietly(parent, new_node, Some(reference))?;
        self.notify(notices)
    }

    /// DOM `insertBefore`: insert `new_node` under `parent` before
    /// `reference`, or append when `reference` is `None`.
    pub fn insert_child_before(
        &mut self,
        parent: NodeId,
        new_node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId> {
        let Some(reference) = reference else {
            return self.append_child(parent, new_node);
        };
        self.expect_child(parent, reference)?;
        self.insert_before(reference, new_node)?;
        Ok(new_node)
    }

    // ------------------------------------------------------------------
    // Removal and replacement
    // ------------------------------------------------------------------

    /// Detach `node` from its parent. The subtree below it stays intact.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        let notices = self.remove_quietly(node)?;
        self.notify(notices)
    }

    /// DOM `removeChild`: like [`remove`](Self::remove), but `child` must be
    /// a child of `parent`. Returns `child`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId> {
        self.expect_child(parent, child)?;
        self.remove(child)?;
        Ok(child)
    }

    /// Put `new_node` where `old` is and detach `old`
    pub fn replace(&mut self, old: NodeId, new_node: NodeId) -> Result<()> {
        let parent = self.get(old)?.parent;
        self.get(new_node)?;
        if old == new_node {
            return Ok(());
        }
        let parent = parent.ok_or_else(|| {
            DomError::IllegalState(format!("node {} has no parent to be replaced in", old))
        })?;

        let mut notices = self.insert_quietly(parent, new_node, Some(old))?;
        notices.extend(self.remove_quietly(old)?);
        self.notify(notices)
    }

    /// DOM `replaceChild`: `old` must be a child of `parent`. Returns `old`.
    pub fn replace_child(&mut self, parent: NodeId, new_node: NodeId, old: NodeId) -> Result<NodeId> {
        self.expect_child(parent, old)?;
        self.replace(old, new_node)?;
        Ok(old)
    }

    /// Remove and free every descendant of `node`.
    ///
    /// Nodes are detached leaves first, so listeners see a child's removal
    /// before its parent's.
    pub fn remove_all_children(&mut self, node: NodeId) -> Result<()> {
        // Reverse pre-order: every node comes after all of its descendants
        let mut doomed: Vec<NodeId> = self.descendants(node)?.collect();
        doomed.reverse();

        let mut notices = Vec::with_capacity(doomed.len());
        for &id in &doomed {
            notices.extend(self.remove_quietly(id)?);
        }

        let outcome = self.notify(notices);
        for id in doomed {
            self.release(id)?;
        }
        tracing::trace!("Removed all children of node {}", node);
        outcome
    }

    // ------------------------------------------------------------------
    // Copy and lifetime
    // ------------------------------------------------------------------

    /// Copy `node` (and its whole subtree when `deep`) into fresh nodes.
    ///
    /// The copy is detached, keeps kind, payload, owner document and source
    /// span, and has no host object and no listeners.
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> Result<NodeId> {
        let root = self.clone_single(node, None)?;
        if !deep {
            return Ok(root);
        }

        // Copies under a cloned document belong to the new document
        let owner = (self.node_type(root)? == NodeType::Document).then_some(root);

        let mut stack: Vec<(NodeId, NodeId)> = Vec::new();
        let mut children: Vec<(NodeId, NodeId)> =
            self.children(node)?.map(|c| (c, root)).collect();
        children.reverse();
        stack.extend(children);

        while let Some((source, parent)) = stack.pop() {
            let copy = self.clone_single(source, owner)?;
            self.link(parent, copy, None)?;

            let mut children: Vec<(NodeId, NodeId)> =
                self.children(source)?.map(|c| (c, copy)).collect();
            children.reverse();
            stack.extend(children);
        }

        tracing::trace!("Deep-cloned node {} into {}", node, root);
        Ok(root)
    }

    fn clone_single(&mut self, node: NodeId, owner: Option<NodeId>) -> Result<NodeId> {
        let source = self.get(node)?;
        let kind = source.kind.clone();
        let owner = owner.or_else(|| {
            source
                .owner_document
                .filter(|&doc| doc != node && self.contains(doc))
        });
        let span = source.source_span;

        let copy = self.create_node(kind, owner)?;
        self.get_mut(copy)?.source_span = span;
        Ok(copy)
    }

    /// Free a detached node and its subtree. Ids into it become stale.
    ///
    /// Returns the number of freed nodes.
    pub fn discard(&mut self, node: NodeId) -> Result<usize> {
        if self.get(node)?.parent.is_some() {
            return Err(DomError::IllegalState(format!(
                "node {} is still attached; remove it before discarding",
                node
            )));
        }

        let mut doomed: Vec<NodeId> = self.descendants(node)?.collect();
        doomed.push(node);
        for &id in &doomed {
            self.release(id)?;
        }

        tracing::debug!("Discarded node {} ({} nodes freed)", node, doomed.len());
        Ok(doomed.len())
    }

    /// DOM `textContent` setter.
    ///
    /// Elements and fragments lose their children and get a single text child
    /// (none for an empty string). Character data is overwritten in place.
    /// Documents ignore the call.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<()> {
        match self.get(node)?.node_type() {
            NodeType::Element | NodeType::DocumentFragment => {
                self.remove_all_children(node)?;
                if !text.is_empty() {
                    let owner = self.get(node)?.owner_document;
                    let child = self.create_text(owner, text)?;
                    self.append_child(node, child)?;
                }
                Ok(())
            }
            NodeType::Document => Ok(()),
            _ => self.set_character_data(node, text),
        }
    }

    /// Move every child of `from` to the end of `to`, then detach `from`.
    ///
    /// No events fire. Parsers use this to re-home content they built.
    pub fn quietly_move_children(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let source_owner = self.get(from)?.owner_document;
        let target_owner = self.get(to)?.owner_document;
        if source_owner != target_owner {
            return Err(DomError::WrongDocument(format!(
                "cannot move children of {} into {}: different owner documents",
                from, to
            )));
        }
        self.check_container(to)?;
        if self.is_ancestor_of(from, to)? {
            return Err(DomError::HierarchyRequest(format!(
                "cannot move children of {} into its own subtree",
                from
            )));
        }

        let children: Vec<NodeId> = self.children(from)?.collect();
        for &child in &children {
            self.unlink(child)?;
            self.link(to, child, None)?;
        }
        self.unlink(from)?;

        tracing::trace!("Quietly moved {} children from {} to {}", children.len(), from, to);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn expect_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.get(parent)?;
        if self.get(child)?.parent != Some(parent) {
            return Err(DomError::NotFound(format!(
                "node {} is not a child of {}",
                child, parent
            )));
        }
        Ok(())
    }

    fn check_container(&self, parent: NodeId) -> Result<()> {
        let node = self.get(parent)?;
        match node.kind {
            NodeKind::Element(_) | NodeKind::Document | NodeKind::DocumentFragment => Ok(()),
            _ => Err(DomError::HierarchyRequest(format!(
                "{} nodes cannot have children",
                node.node_name()
            ))),
        }
    }

    /// Preconditions for linking `node` under `parent`
    fn check_insert(&self, parent: NodeId, node: NodeId) -> Result<()> {
        self.check_container(parent)?;

        let child = self.get(node)?;
        if child.node_type() == NodeType::Document {
            return Err(DomError::HierarchyRequest(
                "a document cannot be inserted as a child".to_string(),
            ));
        }
        if self.is_ancestor_of(node, parent)? {
            return Err(DomError::HierarchyRequest(format!(
                "node {} cannot be inserted into itself or its own descendant {}",
                node, parent
            )));
        }

        let target_owner = self.get(parent)?.owner_document;
        if child.owner_document != target_owner && self.is_connected(node)? {
            return Err(DomError::WrongDocument(format!(
                "node {} belongs to another document",
                node
            )));
        }
        Ok(())
    }

    /// Rewire links for an insertion and report the resulting events
    fn insert_quietly(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<Vec<Notice>> {
        if self.get(node)?.node_type() == NodeType::DocumentFragment {
            return self.insert_fragment(parent, node, reference);
        }
        self.check_insert(parent, node)?;

        let mut notices = Vec::with_capacity(2);
        if let Some(old_parent) = self.unlink(node)? {
            notices.extend(self.deleted_notice(old_parent, node)?);
            tracing::trace!("Moving node {} from {} to {}", node, old_parent, parent);
        }
        self.link(parent, node, reference)?;
        self.adopt(node, parent)?;
        notices.extend(self.added_notice(parent, node)?);

        tracing::trace!("Inserted node {} into {}", node, parent);
        Ok(notices)
    }

    fn insert_fragment(
        &mut self,
        parent: NodeId,
        fragment: NodeId,
        reference: Option<NodeId>,
    ) -> Result<Vec<Notice>> {
        self.check_container(parent)?;
        if self.is_ancestor_of(fragment, parent)? {
            return Err(DomError::HierarchyRequest(format!(
                "fragment {} cannot be inserted into itself",
                fragment
            )));
        }
        let children: Vec<NodeId> = self.children(fragment)?.collect();
        for &child in &children {
            self.check_insert(parent, child)?;
        }

        let mut notices = Vec::with_capacity(children.len());
        for &child in &children {
            self.unlink(child)?;
            self.link(parent, child, reference)?;
            self.adopt(child, parent)?;
            notices.extend(self.added_notice(parent, child)?);
        }

        tracing::trace!(
            "Flattened fragment {} into {} ({} children)",
            fragment,
            parent,
            children.len()
        );
        Ok(notices)
    }

    fn remove_quietly(&mut self, node: NodeId) -> Result<Vec<Notice>> {
        let parent = self.unlink(node)?.ok_or_else(|| {
            DomError::NotFound(format!("node {} has no parent to be removed from", node))
        })?;
        tracing::trace!("Removed node {} from {}", node, parent);
        Ok(self.deleted_notice(parent, node)?.into_iter().collect())
    }

    fn added_notice(&self, parent: NodeId, node: NodeId) -> Result<Option<Notice>> {
        if self.listeners.is_empty() || self.get(parent)?.node_type() == NodeType::DocumentFragment {
            return Ok(None);
        }
        Ok(Some(Notice {
            event: DomChangeEvent::added(parent, node),
            path: self.path_to_root(parent)?,
        }))
    }

    fn deleted_notice(&self, old_parent: NodeId, node: NodeId) -> Result<Option<Notice>> {
        if self.listeners.is_empty() {
            return Ok(None);
        }
        let mut path = vec![node];
        path.extend(self.path_to_root(old_parent)?);
        Ok(Some(Notice {
            event: DomChangeEvent::deleted(old_parent, node),
            path,
        }))
    }

    fn notify(&self, notices: Vec<Notice>) -> Result<()> {
        for notice in &notices {
            self.listeners.dispatch(&notice.path, &notice.event)?;
        }
        Ok(())
    }

    /// Link a detached `node` under `parent`, before `reference` or last
    pub(crate) fn link(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> Result<()> {
        match reference {
            None => {
                let last = self.get(parent)?.last_child;
                {
                    let n = self.get_mut(node)?;
                    n.parent = Some(parent);
                    n.previous_sibling = last;
                    n.next_sibling = None;
                }
                match last {
                    Some(last) => self.get_mut(last)?.next_sibling = Some(node),
                    None => self.get_mut(parent)?.first_child = Some(node),
                }
                self.get_mut(parent)?.last_child = Some(node);
            }
            Some(reference) => {
                let previous = self.get(reference)?.previous_sibling;
                {
                    let n = self.get_mut(node)?;
                    n.parent = Some(parent);
                    n.previous_sibling = previous;
                    n.next_sibling = Some(reference);
                }
                self.get_mut(reference)?.previous_sibling = Some(node);
                match previous {
                    Some(previous) => self.get_mut(previous)?.next_sibling = Some(node),
                    None => self.get_mut(parent)?.first_child = Some(node),
                }
            }
        }
        Ok(())
    }

    /// Take `node` out of its parent's child chain. Returns the former parent.
    pub(crate) fn unlink(&mut self, node: NodeId) -> Result<Option<NodeId>> {
        let (parent, previous, next) = {
            let n = self.get(node)?;
            (n.parent, n.previous_sibling, n.next_sibling)
        };
        let Some(parent) = parent else {
            return Ok(None);
        };

        match previous {
            Some(previous) => self.get_mut(previous)?.next_sibling = next,
            None => self.get_mut(parent)?.first_child = next,
        }
        match next {
            Some(next) => self.get_mut(next)?.previous_sibling = previous,
            None => self.get_mut(parent)?.last_child = previous,
        }

        let n = self.get_mut(node)?;
        n.parent = None;
        n.previous_sibling = None;
        n.next_sibling = None;
        Ok(Some(parent))
    }

    /// Give the subtree of `node` the owner document of its new parent
    fn adopt(&mut self, node: NodeId, parent: NodeId) -> Result<()> {
        let Some(owner) = self.get(parent)?.owner_document else {
            return Ok(());
        };
        if self.get(node)?.owner_document == Some(owner) {
            return Ok(());
        }

        let mut subtree: Vec<NodeId> = self.descendants(node)?.collect();
        subtree.push(node);
        for id in subtree {
            self.get_mut(id)?.owner_document = Some(owner);
        }
        Ok(())
    }
}
