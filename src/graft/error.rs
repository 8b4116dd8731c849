//! Error types for tree mutation and pass execution.

use std::fmt;

/// Structural misuse of the tree API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node being replaced is not a child of the receiver.
    NotFound,
    /// A binding or include was requested outside any scope.
    NoScope,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::NotFound => f.write_str("node not found among the receiver's children"),
            NodeError::NoScope => f.write_str("no enclosing scope"),
        }
    }
}

impl std::error::Error for NodeError {}

/// Failure of a rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// Lifted envelopes reached the pass root with no matching ancestor.
    UnresolvedLift { remaining: usize },
    /// A structural error surfaced while a rule or hook mutated the tree.
    Node(NodeError),
    /// A rule effect failed.
    Effect(String),
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassError::UnresolvedLift { remaining } => {
                write!(f, "{} lifted node(s) with no destination", remaining)
            }
            PassError::Node(err) => write!(f, "tree operation failed: {}", err),
            PassError::Effect(message) => write!(f, "rule effect failed: {}", message),
        }
    }
}

impl std::error::Error for PassError {}

impl From<NodeError> for PassError {
    fn from(err: NodeError) -> Self {
        PassError::Node(err)
    }
}
