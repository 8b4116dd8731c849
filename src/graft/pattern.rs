//! Pattern combinators over sibling sequences.
//!
//! A pattern matches a prefix of some node's child list, starting at a
//! cursor position. Combinators compose a small pattern AST built by the
//! free functions in this module (`any`, `first`, `last`, `tok`,
//! `tok_text`, `inside`, `inside_any`) and the methods on [`Pattern`]
//! (`then`, `or`, `opt`, `rep`, `negate`, `peek`, `peek_not`,
//! `children`, `capture`, `filter`).
//!
//! The matching contract is uniform: a combinator may advance the cursor
//! on success and must leave both the cursor and the recorded captures
//! exactly as it found them on failure. Captures are keyed by token
//! identity and a later capture under the same key overwrites an earlier
//! one, in textual pattern order.
//!
//! Repetition resolves delegation at construction time: `rep()` on a
//! pattern that repetition cannot meaningfully iterate (`first`, `last`,
//! another `rep`, the lookahead predicates) returns the pattern itself,
//! and `rep()` on an `inside` test switches it to any-ancestor mode once,
//! rather than re-deciding per match.

use std::collections::HashMap;
use std::rc::Rc;

use regex::Regex;

use crate::graft::error::NodeError;
use crate::graft::location::Location;
use crate::graft::node::Node;
use crate::graft::token::Token;

/// A contiguous range of siblings under one parent, recorded by a
/// capture. Indices stay valid until the parent's child list is mutated;
/// the executor runs effects before it rewrites the matched range.
#[derive(Clone)]
pub struct NodeRange {
    parent: Node,
    start: usize,
    end: usize,
}

impl NodeRange {
    pub(crate) fn new(parent: Node, start: usize, end: usize) -> NodeRange {
        NodeRange { parent, start, end }
    }

    pub fn parent(&self) -> &Node {
        &self.parent
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn first(&self) -> Option<Node> {
        if self.is_empty() {
            None
        } else {
            self.parent.child(self.start)
        }
    }

    /// Handles to the captured nodes.
    pub fn nodes(&self) -> Vec<Node> {
        (self.start..self.end)
            .filter_map(|i| self.parent.child(i))
            .collect()
    }

    /// Span union of the first and last captured locations.
    pub fn location(&self) -> Location {
        if self.is_empty() {
            return Location::none();
        }
        let first = match self.parent.child(self.start) {
            Some(node) => node.location(),
            None => return Location::none(),
        };
        match self.parent.child(self.end - 1) {
            Some(node) => first.join(&node.location()),
            None => first,
        }
    }
}

/// Captures collected while matching, plus the root of the tree the
/// current pass runs over (which is what backs [`Match::fresh`]).
pub struct Match {
    root: Node,
    captures: HashMap<Token, NodeRange>,
}

impl Match {
    pub fn new(root: Node) -> Match {
        Match {
            root,
            captures: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// A fresh name from the pass root's symbol table.
    pub fn fresh(&self, prefix: &str) -> Result<Location, NodeError> {
        self.root.fresh(prefix)
    }

    /// First node of the capture under `name`, if any.
    pub fn get(&self, name: Token) -> Option<Node> {
        self.captures.get(&name).and_then(|range| range.first())
    }

    /// The full captured range under `name`.
    pub fn range(&self, name: Token) -> Option<NodeRange> {
        self.captures.get(&name).cloned()
    }

    /// Handles to all nodes captured under `name`.
    pub fn nodes(&self, name: Token) -> Vec<Node> {
        self.captures
            .get(&name)
            .map(|range| range.nodes())
            .unwrap_or_default()
    }

    /// Absorb another match's captures; its entries win on conflict.
    pub fn merge(&mut self, other: &Match) {
        for (name, range) in &other.captures {
            self.captures.insert(*name, range.clone());
        }
    }

    /// Clear captures between rules at the same cursor position.
    pub fn reset(&mut self) {
        self.captures.clear();
    }

    fn save(&self) -> HashMap<Token, NodeRange> {
        self.captures.clone()
    }

    fn restore(&mut self, saved: HashMap<Token, NodeRange>) {
        self.captures = saved;
    }

    fn insert(&mut self, name: Token, range: NodeRange) {
        self.captures.insert(name, range);
    }
}

type FilterFn = dyn Fn(&NodeRange) -> bool;

enum PatternKind {
    Any,
    First,
    Last,
    Tag(Token),
    TagText(Token, Regex),
    Inside { tags: Vec<Token>, any_ancestor: bool },
    Opt(Pattern),
    Rep(Pattern),
    Negate(Pattern),
    Peek(Pattern),
    PeekNot(Pattern),
    Then(Pattern, Pattern),
    Or(Pattern, Pattern),
    Children(Pattern, Pattern),
    Capture(Pattern, Token),
    Filter(Pattern, Rc<FilterFn>),
}

/// A composable matcher over a node's children.
#[derive(Clone)]
pub struct Pattern {
    kind: Rc<PatternKind>,
}

/// Matches one node; fails at the end of the siblings.
pub fn any() -> Pattern {
    Pattern::wrap(PatternKind::Any)
}

/// Zero-width; succeeds iff the cursor is at the first child.
pub fn first() -> Pattern {
    Pattern::wrap(PatternKind::First)
}

/// Zero-width; succeeds iff the cursor is past the last child.
pub fn last() -> Pattern {
    Pattern::wrap(PatternKind::Last)
}

/// Matches one node with the given tag.
pub fn tok(tag: Token) -> Pattern {
    Pattern::wrap(PatternKind::Tag(tag))
}

/// Matches one node with the given tag whose location text fully
/// matches `pattern`.
///
/// The expression must be valid; it is compiled (anchored) here, once.
pub fn tok_text(tag: Token, pattern: &str) -> Pattern {
    let anchored = format!(r"\A(?:{})\z", pattern);
    let regex = Regex::new(&anchored).expect("invalid token text pattern");
    Pattern::wrap(PatternKind::TagText(tag, regex))
}

/// Zero-width; true iff the current node's immediate parent has the
/// given tag. Under `rep()` the test is relaxed to any ancestor.
pub fn inside(tag: Token) -> Pattern {
    inside_any(&[tag])
}

/// Zero-width parent test against a token set.
pub fn inside_any(tags: &[Token]) -> Pattern {
    Pattern::wrap(PatternKind::Inside {
        tags: tags.to_vec(),
        any_ancestor: false,
    })
}

impl Pattern {
    fn wrap(kind: PatternKind) -> Pattern {
        Pattern {
            kind: Rc::new(kind),
        }
    }

    /// Sequence: `self` then `next`; atomic on failure.
    pub fn then(&self, next: Pattern) -> Pattern {
        Pattern::wrap(PatternKind::Then(self.clone(), next))
    }

    /// Ordered choice: try `self`, then `other` with captures reset.
    pub fn or(&self, other: Pattern) -> Pattern {
        Pattern::wrap(PatternKind::Or(self.clone(), other))
    }

    /// Optional; always succeeds, advancing only if `self` did.
    pub fn opt(&self) -> Pattern {
        Pattern::wrap(PatternKind::Opt(self.clone()))
    }

    /// Zero-or-more repetition.
    pub fn rep(&self) -> Pattern {
        match &*self.kind {
            PatternKind::Inside { tags, .. } => Pattern::wrap(PatternKind::Inside {
                tags: tags.clone(),
                any_ancestor: true,
            }),
            PatternKind::Rep(_)
            | PatternKind::First
            | PatternKind::Last
            | PatternKind::Peek(_)
            | PatternKind::PeekNot(_) => self.clone(),
            _ => Pattern::wrap(PatternKind::Rep(self.clone())),
        }
    }

    /// Matches one node, provided `self` does not match here.
    pub fn negate(&self) -> Pattern {
        Pattern::wrap(PatternKind::Negate(self.clone()))
    }

    /// Zero-width positive lookahead; captures are discarded.
    pub fn peek(&self) -> Pattern {
        Pattern::wrap(PatternKind::Peek(self.clone()))
    }

    /// Zero-width negative lookahead.
    pub fn peek_not(&self) -> Pattern {
        Pattern::wrap(PatternKind::PeekNot(self.clone()))
    }

    /// Descend: `self` must match one node, then `sub` must match from
    /// the beginning of that node's children.
    pub fn children(&self, sub: Pattern) -> Pattern {
        Pattern::wrap(PatternKind::Children(self.clone(), sub))
    }

    /// Record the matched range under `name`.
    pub fn capture(&self, name: Token) -> Pattern {
        Pattern::wrap(PatternKind::Capture(self.clone(), name))
    }

    /// Run a user test over the matched range; a `false` verdict fails
    /// the match and restores cursor and captures.
    pub fn filter<F>(&self, test: F) -> Pattern
    where
        F: Fn(&NodeRange) -> bool + 'static,
    {
        Pattern::wrap(PatternKind::Filter(self.clone(), Rc::new(test)))
    }

    /// Try this pattern against `parent`'s children starting at `start`.
    ///
    /// Returns the cursor position past the match on success. Captures
    /// are recorded into `m` (and left untouched on failure).
    pub fn match_at(&self, parent: &Node, start: usize, m: &mut Match) -> Option<usize> {
        let mut pos = start;
        let end = parent.len();
        if self.try_match(parent, &mut pos, end, m) {
            Some(pos)
        } else {
            None
        }
    }

    pub(crate) fn try_match(
        &self,
        parent: &Node,
        pos: &mut usize,
        end: usize,
        m: &mut Match,
    ) -> bool {
        match &*self.kind {
            PatternKind::Any => {
                if *pos >= end {
                    return false;
                }
                *pos += 1;
                true
            }
            PatternKind::First => *pos < end && *pos == 0,
            PatternKind::Last => *pos == end,
            PatternKind::Tag(tag) => {
                match parent.child(*pos) {
                    Some(node) if *pos < end && node.tag() == *tag => {
                        *pos += 1;
                        true
                    }
                    _ => false,
                }
            }
            PatternKind::TagText(tag, regex) => match parent.child(*pos) {
                Some(node) if *pos < end && node.tag() == *tag => {
                    let location = node.location();
                    if regex.is_match(location.view()) {
                        *pos += 1;
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            },
            PatternKind::Inside { tags, any_ancestor } => {
                if *pos >= end {
                    return false;
                }
                let node = match parent.child(*pos) {
                    Some(node) => node,
                    None => return false,
                };
                let mut current = node.parent();
                while let Some(ancestor) = current {
                    if ancestor.tag().in_set(tags) {
                        return true;
                    }
                    if !any_ancestor {
                        break;
                    }
                    current = ancestor.parent();
                }
                false
            }
            PatternKind::Opt(inner) => {
                let _ = inner.try_match(parent, pos, end, m);
                true
            }
            PatternKind::Rep(inner) => {
                while *pos < end {
                    let before = *pos;
                    if !inner.try_match(parent, pos, end, m) {
                        break;
                    }
                    if *pos == before {
                        break;
                    }
                }
                true
            }
            PatternKind::Negate(inner) => {
                if *pos >= end {
                    return false;
                }
                let start = *pos;
                let saved = m.save();
                if inner.try_match(parent, pos, end, m) {
                    *pos = start;
                    m.restore(saved);
                    return false;
                }
                *pos = start + 1;
                true
            }
            PatternKind::Peek(inner) => {
                let start = *pos;
                let saved = m.save();
                let ok = inner.try_match(parent, pos, end, m);
                *pos = start;
                m.restore(saved);
                ok
            }
            PatternKind::PeekNot(inner) => {
                let start = *pos;
                let saved = m.save();
                let ok = inner.try_match(parent, pos, end, m);
                *pos = start;
                m.restore(saved);
                !ok
            }
            PatternKind::Then(head, tail) => {
                let start = *pos;
                let saved = m.save();
                if !head.try_match(parent, pos, end, m) {
                    return false;
                }
                if !tail.try_match(parent, pos, end, m) {
                    *pos = start;
                    m.restore(saved);
                    return false;
                }
                true
            }
            PatternKind::Or(left, right) => {
                left.try_match(parent, pos, end, m) || right.try_match(parent, pos, end, m)
            }
            PatternKind::Children(head, sub) => {
                let start = *pos;
                let saved = m.save();
                if !head.try_match(parent, pos, end, m) {
                    return false;
                }
                let target = match parent.child(start) {
                    Some(node) => node,
                    None => {
                        *pos = start;
                        m.restore(saved);
                        return false;
                    }
                };
                let mut sub_pos = 0;
                let sub_end = target.len();
                if !sub.try_match(&target, &mut sub_pos, sub_end, m) {
                    *pos = start;
                    m.restore(saved);
                    return false;
                }
                true
            }
            PatternKind::Capture(inner, name) => {
                let start = *pos;
                if !inner.try_match(parent, pos, end, m) {
                    return false;
                }
                m.insert(*name, NodeRange::new(parent.clone(), start, *pos));
                true
            }
            PatternKind::Filter(inner, test) => {
                let start = *pos;
                let saved = m.save();
                if !inner.try_match(parent, pos, end, m) {
                    return false;
                }
                let range = NodeRange::new(parent.clone(), start, *pos);
                if !test(&range) {
                    *pos = start;
                    m.restore(saved);
                    return false;
                }
                true
            }
        }
    }
}
