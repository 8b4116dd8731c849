//! The tagged tree.
//!
//! A `Node` is a cheap handle (`Rc`) to a tagged, located tree node that
//! owns an ordered sequence of children. Ownership is tree-shaped: the
//! only long-lived strong handles to a node are the one in its parent's
//! child list and any bindings recorded in symbol tables; parent links
//! are `Weak` by construction, so the tree can never keep itself alive
//! through a cycle.
//!
//! Every mutator maintains the structural invariants:
//!
//! - a node claiming `parent == P` appears in `P`'s child list at
//!   exactly one position, and re-parenting removes the old claim;
//! - `contains_error` / `contains_lift` are set eagerly along the
//!   ancestor spine whenever an `Error` / `Lift` node (or a subtree
//!   already carrying the flag) is attached, and cleared only by the
//!   error-gathering and lift-handling phases.
//!
//! Subtree destruction is iterative: dropping the last handle to a node
//! tears down its descendants through an explicit worklist, so very deep
//! trees cannot exhaust the native stack.

use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use crate::graft::error::NodeError;
use crate::graft::location::Location;
use crate::graft::pattern::NodeRange;
use crate::graft::symtab::SymbolTable;
use crate::graft::token::{Token, TokenFlags, ERROR, LIFT};

pub(crate) struct NodeData {
    pub(crate) tag: Token,
    pub(crate) location: Location,
    pub(crate) parent: Weak<RefCell<NodeData>>,
    pub(crate) contains_error: bool,
    pub(crate) contains_lift: bool,
    pub(crate) symtab: Option<SymbolTable>,
    pub(crate) children: Vec<Node>,
}

impl Drop for NodeData {
    fn drop(&mut self) {
        // Tear the subtree down with a worklist rather than letting the
        // child vector drop recursively.
        let mut work: Vec<Node> = std::mem::take(&mut self.children);
        while let Some(node) = work.pop() {
            let Node { data } = node;
            if let Ok(cell) = Rc::try_unwrap(data) {
                let mut inner = cell.into_inner();
                work.append(&mut inner.children);
            }
        }
    }
}

/// Handle to a tree node. Cloning the handle does not clone the node.
#[derive(Clone)]
pub struct Node {
    pub(crate) data: Rc<RefCell<NodeData>>,
}

impl Node {
    /// Create a node with no children and the unit location.
    ///
    /// If the tag carries `SYMTAB`, a fresh, empty symbol table is
    /// attached.
    pub fn new(tag: Token) -> Node {
        Node::with_location(tag, Location::none())
    }

    pub fn with_location(tag: Token, location: Location) -> Node {
        let symtab = if tag.has(TokenFlags::SYMTAB) {
            Some(SymbolTable::new())
        } else {
            None
        };
        Node {
            data: Rc::new(RefCell::new(NodeData {
                tag,
                location,
                parent: Weak::new(),
                contains_error: false,
                contains_lift: false,
                symtab,
                children: Vec::new(),
            })),
        }
    }

    /// Create a node whose location is the span union of a matched range.
    pub fn from_range(tag: Token, range: &NodeRange) -> Node {
        Node::with_location(tag, range.location())
    }

    pub fn tag(&self) -> Token {
        self.data.borrow().tag
    }

    pub fn location(&self) -> Location {
        self.data.borrow().location.clone()
    }

    /// Widen this node's span to also cover `loc`.
    pub fn extend_location(&self, loc: &Location) {
        let mut data = self.data.borrow_mut();
        data.location = data.location.join(loc);
    }

    /// Recursively default unset locations to `loc`.
    ///
    /// A node that already has a location keeps it, but its descendants
    /// are still visited. Used for nodes synthesized by rule effects.
    pub fn fill_location(&self, loc: &Location) {
        {
            let mut data = self.data.borrow_mut();
            if data.location.is_none() {
                data.location = loc.clone();
            }
        }
        for child in self.children() {
            child.fill_location(loc);
        }
    }

    /// True if the two handles refer to the same node.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Rc::ptr_eq(&a.data, &b.data)
    }

    pub fn len(&self) -> usize {
        self.data.borrow().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().children.is_empty()
    }

    pub fn child(&self, index: usize) -> Option<Node> {
        self.data.borrow().children.get(index).cloned()
    }

    pub fn front(&self) -> Option<Node> {
        self.data.borrow().children.first().cloned()
    }

    pub fn back(&self) -> Option<Node> {
        self.data.borrow().children.last().cloned()
    }

    /// Snapshot of the child handles.
    pub fn children(&self) -> Vec<Node> {
        self.data.borrow().children.clone()
    }

    /// Position of `child` in this node's child list, by identity.
    pub fn position_of(&self, child: &Node) -> Option<usize> {
        self.data
            .borrow()
            .children
            .iter()
            .position(|c| Node::ptr_eq(c, child))
    }

    pub fn parent(&self) -> Option<Node> {
        self.data.borrow().parent.upgrade().map(|data| Node { data })
    }

    /// Nearest ancestor (or self) whose tag equals `tag`.
    pub fn ancestor(&self, tag: Token) -> Option<Node> {
        self.ancestor_in(&[tag])
    }

    /// Nearest ancestor (or self) whose tag is in `tags`.
    pub fn ancestor_in(&self, tags: &[Token]) -> Option<Node> {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.tag().in_set(tags) {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }

    pub fn contains_error(&self) -> bool {
        self.data.borrow().contains_error
    }

    pub fn contains_lift(&self) -> bool {
        self.data.borrow().contains_lift
    }

    pub(crate) fn take_contains_error(&self) -> bool {
        let mut data = self.data.borrow_mut();
        std::mem::replace(&mut data.contains_error, false)
    }

    pub(crate) fn take_contains_lift(&self) -> bool {
        let mut data = self.data.borrow_mut();
        std::mem::replace(&mut data.contains_lift, false)
    }

    // Walk the ancestor spine from `self` upward, setting the marker
    // flags implied by a newly attached child. Stops at the first
    // ancestor that already carries the flag.
    fn propagate_marks(&self, child: &Node) {
        let has_error = child.tag() == ERROR || child.contains_error();
        let has_lift = child.tag() == LIFT || child.contains_lift();
        if has_error {
            let mut current = Some(self.clone());
            while let Some(node) = current {
                let mut data = node.data.borrow_mut();
                if data.contains_error {
                    break;
                }
                data.contains_error = true;
                drop(data);
                current = node.parent();
            }
        }
        if has_lift {
            let mut current = Some(self.clone());
            while let Some(node) = current {
                let mut data = node.data.borrow_mut();
                if data.contains_lift {
                    break;
                }
                data.contains_lift = true;
                drop(data);
                current = node.parent();
            }
        }
    }

    fn claim(&self, child: &Node) {
        child.data.borrow_mut().parent = Rc::downgrade(&self.data);
    }

    // Clear the child's parent link, but only if this node still owns it;
    // a child that was re-parented elsewhere keeps its new claim, and an
    // ephemeral child never had one pointing here.
    fn disclaim(&self, child: &Node) {
        let mut data = child.data.borrow_mut();
        if data.parent.as_ptr() == Rc::as_ptr(&self.data) {
            data.parent = Weak::new();
        }
    }

    pub fn push_back(&self, child: Node) {
        if Node::ptr_eq(self, &child) {
            return;
        }
        self.claim(&child);
        self.data.borrow_mut().children.push(child.clone());
        self.propagate_marks(&child);
    }

    pub fn push_front(&self, child: Node) {
        self.insert(0, child);
    }

    /// Insert `child` so that it ends up at `index` (clamped to the
    /// current child count).
    pub fn insert(&self, index: usize, child: Node) {
        if Node::ptr_eq(self, &child) {
            return;
        }
        self.claim(&child);
        {
            let mut data = self.data.borrow_mut();
            let index = index.min(data.children.len());
            data.children.insert(index, child.clone());
        }
        self.propagate_marks(&child);
    }

    /// Insert a sequence of children starting at `index`.
    pub fn insert_all(&self, index: usize, children: Vec<Node>) {
        for (offset, child) in children.into_iter().enumerate() {
            self.insert(index + offset, child);
        }
    }

    /// Add `child` without claiming parenthood.
    ///
    /// Used for temporary envelopes that the same pass will unpack; the
    /// child's parent link is left untouched, and removal from this node
    /// will not clear it either.
    pub fn push_back_ephemeral(&self, child: Node) {
        if Node::ptr_eq(self, &child) {
            return;
        }
        self.data.borrow_mut().children.push(child);
    }

    pub fn pop_back(&self) -> Option<Node> {
        let popped = self.data.borrow_mut().children.pop();
        if let Some(child) = &popped {
            self.disclaim(child);
        }
        popped
    }

    /// Remove the children in `range` (clamped to the child count).
    pub fn erase(&self, range: Range<usize>) {
        let removed: Vec<Node> = {
            let mut data = self.data.borrow_mut();
            let end = range.end.min(data.children.len());
            let start = range.start.min(end);
            data.children.drain(start..end).collect()
        };
        for child in &removed {
            self.disclaim(child);
        }
    }

    /// Detach and return the child at `index`.
    pub fn take_child(&self, index: usize) -> Option<Node> {
        let taken = {
            let mut data = self.data.borrow_mut();
            if index < data.children.len() {
                Some(data.children.remove(index))
            } else {
                None
            }
        };
        if let Some(child) = &taken {
            self.disclaim(child);
        }
        taken
    }

    /// Swap `old` for `new` in place, or erase it when `new` is `None`.
    ///
    /// Fails with `NotFound` if `old` is not a child of this node.
    pub fn replace(&self, old: &Node, new: Option<Node>) -> Result<(), NodeError> {
        let index = self.position_of(old).ok_or(NodeError::NotFound)?;
        self.replace_at(index, new)
    }

    /// Swap the child at `index`, or erase it when `new` is `None`.
    pub fn replace_at(&self, index: usize, new: Option<Node>) -> Result<(), NodeError> {
        {
            let data = self.data.borrow();
            if index >= data.children.len() {
                return Err(NodeError::NotFound);
            }
        }
        match new {
            Some(node) => {
                let old = {
                    let data = self.data.borrow();
                    data.children[index].clone()
                };
                self.disclaim(&old);
                self.claim(&node);
                self.data.borrow_mut().children[index] = node.clone();
                self.propagate_marks(&node);
            }
            None => self.erase(index..index + 1),
        }
        Ok(())
    }

    /// Deep copy of the subtree.
    ///
    /// Symbol tables are not copied; a later binding pass recomputes
    /// them on the clone.
    pub fn deep_clone(&self) -> Node {
        let clone = Node::with_location(self.tag(), self.location());
        for child in self.children() {
            clone.push_back(child.deep_clone());
        }
        clone
    }

    /// Structural equality: same tag, same location text for `PRINT`
    /// tags, pairwise equal children.
    pub fn equals(&self, other: &Node) -> bool {
        if self.tag() != other.tag() {
            return false;
        }
        if self.tag().has(TokenFlags::PRINT) && self.location() != other.location() {
            return false;
        }
        let left = self.children();
        let right = other.children();
        left.len() == right.len()
            && left
                .iter()
                .zip(right.iter())
                .all(|(a, b)| a.equals(b))
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(node) = current {
            depth += 1;
            current = node.parent();
        }
        depth
    }

    // Equalize depths, then walk both chains in lockstep until the
    // parents coincide. Returns the sibling pair under the join point;
    // the two sides are the same node when one operand dominates the
    // other. None when the operands live in unrelated trees.
    fn same_level(&self, other: &Node) -> Option<(Node, Node)> {
        let mut p = self.clone();
        let mut q = other.clone();
        let dp = p.depth();
        let dq = q.depth();
        for _ in dq..dp {
            p = p.parent()?;
        }
        for _ in dp..dq {
            q = q.parent()?;
        }
        loop {
            match (p.parent(), q.parent()) {
                (Some(pp), Some(qq)) => {
                    if Node::ptr_eq(&pp, &qq) {
                        return Some((p, q));
                    }
                    p = pp;
                    q = qq;
                }
                (None, None) => {
                    return if Node::ptr_eq(&p, &q) {
                        Some((p.clone(), q))
                    } else {
                        None
                    };
                }
                _ => return None,
            }
        }
    }

    /// The nearest node that is an ancestor-or-self of both operands.
    pub fn common_parent(&self, other: &Node) -> Option<Node> {
        let (p, q) = self.same_level(other)?;
        if Node::ptr_eq(&p, &q) {
            Some(p)
        } else {
            p.parent()
        }
    }

    /// True if `self` is strictly to the left of `other`: neither
    /// dominates the other and `self`'s branch sits at a smaller index
    /// under their common parent.
    pub fn precedes(&self, other: &Node) -> bool {
        match self.same_level(other) {
            Some((p, q)) if !Node::ptr_eq(&p, &q) => match p.parent() {
                Some(parent) => parent.position_of(&p) < parent.position_of(&q),
                None => false,
            },
            _ => false,
        }
    }

    /// Iterative pre/post-order walk.
    ///
    /// `pre` is called when a node is first visited and returns whether
    /// to descend into its children; `post` runs only after a descent
    /// completed. The walk re-reads child lists as it goes, so callbacks
    /// may mutate the structure below the node they were handed, but not
    /// above it.
    pub fn traverse<Pre, Post>(&self, mut pre: Pre, mut post: Post)
    where
        Pre: FnMut(&Node) -> bool,
        Post: FnMut(&Node),
    {
        if !pre(self) {
            return;
        }
        let mut path: Vec<(Node, usize)> = vec![(self.clone(), 0)];
        while let Some(frame) = path.last_mut() {
            let node = frame.0.clone();
            let index = frame.1;
            frame.1 += 1;
            match node.child(index) {
                Some(child) => {
                    if pre(&child) {
                        path.push((child, 0));
                    }
                }
                None => {
                    post(&node);
                    path.pop();
                }
            }
        }
    }

    /// Collect every `Error` node that has no `Error` descendants,
    /// clearing the `contains_error` flags along the visited spine.
    pub fn get_errors(&self) -> Vec<Node> {
        let mut errors = Vec::new();
        self.traverse(
            |node| {
                if node.take_contains_error() {
                    return true;
                }
                if node.tag() == ERROR {
                    errors.push(node.clone());
                }
                false
            },
            |_| {},
        );
        errors
    }
}

fn indent<W: fmt::Write>(out: &mut W, level: usize) -> fmt::Result {
    for _ in 0..level {
        out.write_str("  ")?;
    }
    Ok(())
}

impl fmt::Display for Node {
    /// Debug rendering: `(Tag len:text child…)`, two-space indentation,
    /// with the symbol-table block on the owning node's opening line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path: Vec<(Node, usize, usize)> = vec![(self.clone(), 0, 0)];
        let mut first = true;
        loop {
            let (node, level, index) = match path.last_mut() {
                Some(frame) => {
                    let snapshot = (frame.0.clone(), frame.1, frame.2);
                    frame.2 += 1;
                    snapshot
                }
                None => break,
            };
            if index == 0 {
                if !first {
                    f.write_str("\n")?;
                }
                first = false;
                indent(f, level)?;
                write!(f, "({}", node.tag().name())?;
                if node.tag().has(TokenFlags::PRINT) {
                    let location = node.location();
                    let view = location.view();
                    write!(f, " {}:{}", view.len(), view)?;
                }
                let data = node.data.borrow();
                if let Some(symtab) = &data.symtab {
                    f.write_str("\n")?;
                    symtab.write_block(f, level + 1)?;
                }
            }
            match node.child(index) {
                Some(child) => path.push((child, level + 1, 0)),
                None => {
                    f.write_str(")")?;
                    path.pop();
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
