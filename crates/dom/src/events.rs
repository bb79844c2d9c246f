//! Change notification - listener registry plus bubbling dispatch
//!
//! Design:
//! - Listeners are keyed by the node they are registered on, in one
//!   concurrent map shared by every clone of [`ListenerRegistry`]
//! - Registration may happen from any thread; structural mutation stays on
//!   the owner of `&mut DomArena`
//! - Dispatch is synchronous: walk the path, snapshot each node's listeners,
//!   call them in registration order. No registry lock is held while user
//!   code runs.

use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;
use thiserror::Error;

use crate::types::NodeId;

/// What happened to the changed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Deleted,
}

/// Structural change delivered to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomChangeEvent {
    pub kind: ChangeKind,
    /// Parent the node was added to or removed from
    pub parent: NodeId,
    /// The node that was added or removed
    pub changed: NodeId,
}

impl DomChangeEvent {
    pub fn added(parent: NodeId, changed: NodeId) -> Self {
        Self {
            kind: ChangeKind::Added,
            parent,
            changed,
        }
    }

    pub fn deleted(parent: NodeId, changed: NodeId) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            parent,
            changed,
        }
    }
}

/// Error raised by a listener. Aborts the rest of the dispatch.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Observer of structural changes on a node and all its descendants
pub trait DomChangeListener: Send + Sync {
    fn node_added(&self, event: &DomChangeEvent) -> Result<(), ListenerError> {
        let _ = event;
        Ok(())
    }

    fn node_deleted(&self, event: &DomChangeEvent) -> Result<(), ListenerError> {
        let _ = event;
        Ok(())
    }
}

/// Shared listener handle; identity is the allocation it points to
pub type ListenerHandle = Arc<dyn DomChangeListener>;

/// Listeners of one node, in registration order
pub type ListenerList = SmallVec<[ListenerHandle; 2]>;

fn same_listener(a: &ListenerHandle, b: &ListenerHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Listener registry
///
/// Cheap to clone; every clone sees the same registrations.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    /// Key: node the listeners are registered on, Value: listeners in
    /// registration order
    listeners: Arc<DashMap<NodeId, ListenerList, RandomState>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `node`. Registering the same listener twice has
    /// no additional effect.
    ///
    /// The registry cannot tell whether `node` is still live. A registration
    /// for an id whose node was already freed is never dispatched to, and is
    /// dropped once the arena frees that slot again.
    pub fn add(&self, node: NodeId, listener: ListenerHandle) {
        let mut entry = self.listeners.entry(node).or_default();
        if entry.iter().any(|l| same_listener(l, &listener)) {
            return;
        }
        entry.push(listener);
        tracing::debug!("Registered change listener on node {}", node);
    }

    /// Deregister `listener` from `node`. Returns whether it was registered.
    pub fn remove(&self, node: NodeId, listener: &ListenerHandle) -> bool {
        let removed = match self.listeners.get_mut(&node) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|l| !same_listener(l, listener));
                before != entry.len()
            }
            None => false,
        };
        // Drop empty entries so discarded or idle nodes don't linger in the map
        self.listeners.remove_if(&node, |_, list| list.is_empty());
        if removed {
            tracing::debug!("Removed change listener from node {}", node);
        }
        removed
    }

    /// Number of listeners registered directly on `node`
    pub fn count(&self, node: NodeId) -> usize {
        self.listeners.get(&node).map(|l| l.len()).unwrap_or(0)
    }

    /// True when no node has any listener
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Copy of the listener list of `node`
    pub fn snapshot(&self, node: NodeId) -> ListenerList {
        self.listeners
            .get(&node)
            .map(|l| l.value().clone())
            .unwrap_or_default()
    }

    /// Drop the listeners of every generation of the slot `node` lives in
    pub(crate) fn clear_slot(&self, node: NodeId) {
        if self.listeners.is_empty() {
            return;
        }
        self.listeners.retain(|id, _| id.index != node.index);
    }

    /// Deliver `event` to the listeners of every node in `path`, in order.
    ///
    /// Stops at the first failing listener.
    pub(crate) fn dispatch(
        &self,
        path: &[NodeId],
        event: &DomChangeEvent,
    ) -> Result<(), ListenerError> {
        if self.is_empty() {
            return Ok(());
        }

        for &node in path {
            for listener in self.snapshot(node) {
                let outcome = match event.kind {
                    ChangeKind::Added => listener.node_added(event),
                    ChangeKind::Deleted => listener.node_deleted(event),
                };
                if let Err(e) = outcome {
                    tracing::warn!(
                        "Change listener on node {} failed for {:?}: {}",
                        node,
                        event.kind,
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("nodes", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl DomChangeListener for Recorder {
        fn node_added(&self, event: &DomChangeEvent) -> Result<(), ListenerError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}: added {}", self.name, event.changed));
            Ok(())
        }
    }

    struct Failing;

    impl DomChangeListener for Failing {
        fn node_added(&self, _event: &DomChangeEvent) -> Result<(), ListenerError> {
            Err(ListenerError::new("boom"))
        }
    }

    fn id(index: u32) -> NodeId {
        NodeId::new(index, 0)
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener: ListenerHandle = Arc::new(Recorder { name: "a", log });

        registry.add(id(1), listener.clone());
        registry.add(id(1), listener.clone());
        assert_eq!(registry.count(id(1)), 1);

        assert!(registry.remove(id(1), &listener));
        assert!(!registry.remove(id(1), &listener));
        assert_eq!(registry.count(id(1)), 0);
    }

    #[test]
    fn test_dispatch_follows_path_and_registration_order() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(id(2), Arc::new(Recorder { name: "parent-1", log: log.clone() }));
        registry.add(id(2), Arc::new(Recorder { name: "parent-2", log: log.clone() }));
        registry.add(id(1), Arc::new(Recorder { name: "root", log: log.clone() }));

        let event = DomChangeEvent::added(id(2), id(3));
        registry.dispatch(&[id(2), id(1)], &event).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["parent-1: added 3v0", "parent-2: added 3v0", "root: added 3v0"]
        );
    }

    #[test]
    fn test_dispatch_stops_at_failing_listener() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(id(1), Arc::new(Recorder { name: "first", log: log.clone() }));
        registry.add(id(1), Arc::new(Failing));
        registry.add(id(1), Arc::new(Recorder { name: "last", log: log.clone() }));

        let result = registry.dispatch(&[id(1)], &DomChangeEvent::added(id(1), id(2)));
        assert!(result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["first: added 2v0"]);
    }

    #[test]
    fn test_clear_slot_drops_stale_generations() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener: ListenerHandle = Arc::new(Recorder { name: "a", log });

        registry.add(NodeId::new(4, 0), listener.clone());
        registry.add(NodeId::new(4, 1), listener.clone());
        registry.add(NodeId::new(5, 0), listener);

        registry.clear_slot(NodeId::new(4, 2));
        assert_eq!(registry.count(NodeId::new(4, 0)), 0);
        assert_eq!(registry.count(NodeId::new(4, 1)), 0);
        assert_eq!(registry.count(NodeId::new(5, 0)), 1);
    }

    #[test]
    fn test_registration_from_other_thread() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let log = log.clone();
                std::thread::spawn(move || {
                    registry.add(id(7), Arc::new(Recorder { name: "bg", log }));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.count(id(7)), 4);
    }
}
