//! Rewrite rules: a pattern paired with an effect.

use crate::graft::error::PassError;
use crate::graft::location::Location;
use crate::graft::node::Node;
use crate::graft::pattern::{Match, Pattern};
use crate::graft::token::{ERROR, ERROR_AST, ERROR_MSG};

/// What an effect asks the executor to do with the matched range.
pub enum Rewrite {
    /// Replace the matched range with a single node.
    Replace(Node),
    /// Splice a sequence of nodes in place of the matched range.
    Splice(Vec<Node>),
    /// Delete the matched range with no insertion.
    Delete,
    /// Declare the match ineffective; the executor restores the cursor
    /// and tries the next rule at the same position.
    NoChange,
}

pub type EffectFn = dyn Fn(&Match) -> Result<Rewrite, PassError>;

/// One pattern→effect rewrite rule.
pub struct Rule {
    pattern: Pattern,
    effect: Box<EffectFn>,
}

impl Rule {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub(crate) fn run_effect(&self, m: &Match) -> Result<Rewrite, PassError> {
        (self.effect)(m)
    }
}

/// Pair a pattern with its effect.
pub fn rule<F>(pattern: Pattern, effect: F) -> Rule
where
    F: Fn(&Match) -> Result<Rewrite, PassError> + 'static,
{
    Rule {
        pattern,
        effect: Box::new(effect),
    }
}

/// Build the standard error shape: an `Error` node carrying the message
/// and the offending subtree.
///
/// Rules emit these in place of nodes they cannot make sense of; the
/// executor treats the subtree as opaque from then on and the driver
/// collects it between passes.
pub fn error_node(message: &str, ast: Node) -> Node {
    let error = Node::new(ERROR);
    error.push_back(Node::with_location(
        ERROR_MSG,
        Location::synthetic(message),
    ));
    let payload = Node::new(ERROR_AST);
    payload.push_back(ast);
    error.push_back(payload);
    error
}
