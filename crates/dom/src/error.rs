//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. Every mutation validates before touching a
//! link, so an `Err` from a structural call means the tree is unchanged
//! (listener failures are the one exception, see [`DomError::Listener`]).

use thiserror::Error;

use crate::events::ListenerError;
use crate::types::NodeId;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(String),

    #[error("Wrong document: {0}")]
    WrongDocument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("{0} is not implemented")]
    Unsupported(&'static str),

    #[error("Node {0} has no owner document")]
    NoOwnerDocument(NodeId),

    /// A change listener failed. The mutation that triggered it has already
    /// been applied.
    #[error("Change listener failed: {0}")]
    Listener(#[from] ListenerError),

    #[error("Invalid node type: expected {expected}, got {actual}")]
    InvalidNodeType { expected: String, actual: String },

    #[error("Maximum tree depth exceeded: {current} > {max}")]
    MaxDepthExceeded { current: usize, max: usize },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl DomError {
    /// True for the deliberate stubs; callers can skip these instead of
    /// treating them as corruption.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DomError::Unsupported(_))
    }
}
