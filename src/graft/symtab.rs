//! Per-scope symbol tables and the name-resolution operations on nodes.
//!
//! A scope is any node whose token carries `SYMTAB`; it owns a
//! `SymbolTable` mapping names (opaque `Location` keys, compared by
//! text) to the nodes bound under them, in insertion order, plus an
//! ordered list of "included" nodes whose bindings are transitively
//! visible during upward lookup.
//!
//! Resolution comes in three strengths:
//!
//! - [`Node::lookup`] walks outward scope by scope, filtering by the
//!   `LOOKUP` flag, honouring `DEF_BEFORE_USE` ordering and stopping at
//!   a `SHADOWING` hit or an explicit scope limit;
//! - [`Node::lookdown`] consults exactly one symbol table, filtered by
//!   `LOOKDOWN`, with includes excluded;
//! - [`Node::look`] is the unfiltered read of one symbol table.

use std::collections::BTreeMap;
use std::fmt;

use crate::graft::error::NodeError;
use crate::graft::location::Location;
use crate::graft::node::Node;
use crate::graft::token::TokenFlags;

/// Binding store attached to a scope node.
pub struct SymbolTable {
    symbols: BTreeMap<Location, Vec<Node>>,
    includes: Vec<Node>,
    next_id: usize,
}

impl SymbolTable {
    pub(crate) fn new() -> SymbolTable {
        SymbolTable {
            symbols: BTreeMap::new(),
            includes: Vec::new(),
            next_id: 0,
        }
    }

    /// A name of the form `prefix$N`, unique for the lifetime of this
    /// table.
    pub(crate) fn fresh(&mut self, prefix: &str) -> Location {
        let id = self.next_id;
        self.next_id += 1;
        Location::synthetic(format!("{}${}", prefix, id))
    }

    /// Drop all bindings and includes.
    ///
    /// The fresh-name counter is kept so identifiers are never reused.
    pub(crate) fn clear(&mut self) {
        self.symbols.clear();
        self.includes.clear();
    }

    pub(crate) fn bind(&mut self, name: Location, node: Node) -> bool {
        let entry = self.symbols.entry(name).or_default();
        entry.push(node);
        entry.len() == 1
            || !entry
                .iter()
                .any(|n| n.tag().has(TokenFlags::SHADOWING))
    }

    pub(crate) fn include(&mut self, node: Node) {
        self.includes.push(node);
    }

    pub(crate) fn includes(&self) -> &[Node] {
        &self.includes
    }

    pub(crate) fn symbols_for<F>(&self, name: &Location, keep: F) -> Vec<Node>
    where
        F: Fn(&Node) -> bool,
    {
        match self.symbols.get(name) {
            Some(nodes) => nodes.iter().filter(|n| keep(n)).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Render the scope block: each name with its bound tag (or an
    /// indented tag list when there are several), then the includes.
    pub(crate) fn write_block<W: fmt::Write>(&self, out: &mut W, level: usize) -> fmt::Result {
        let indent = |out: &mut W, level: usize| -> fmt::Result {
            for _ in 0..level {
                out.write_str("  ")?;
            }
            Ok(())
        };
        indent(out, level)?;
        out.write_str("{")?;
        for (name, nodes) in &self.symbols {
            out.write_str("\n")?;
            indent(out, level + 1)?;
            write!(out, "{} =", name.view())?;
            if nodes.len() == 1 {
                write!(out, " {}", nodes[0].tag().name())?;
            } else {
                for node in nodes {
                    out.write_str("\n")?;
                    indent(out, level + 2)?;
                    out.write_str(node.tag().name())?;
                }
            }
        }
        for node in &self.includes {
            out.write_str("\n")?;
            indent(out, level + 1)?;
            write!(out, "include {}", node.location().view())?;
        }
        out.write_str("}")
    }
}

impl Node {
    /// Nearest strict ancestor that owns a symbol table.
    pub fn scope(&self) -> Option<Node> {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.tag().has(TokenFlags::SYMTAB) {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }

    /// Bind this node under `name` in its enclosing scope.
    ///
    /// Returns `Ok(false)` when the name now has several bindings and
    /// any of them is `SHADOWING`; fails with `NoScope` outside any
    /// scope.
    pub fn bind(&self, name: Location) -> Result<bool, NodeError> {
        let scope = self.scope().ok_or(NodeError::NoScope)?;
        let mut data = scope.data.borrow_mut();
        match &mut data.symtab {
            Some(symtab) => Ok(symtab.bind(name, self.clone())),
            None => Err(NodeError::NoScope),
        }
    }

    /// Append `node` to the enclosing scope's include list.
    pub fn include(&self, node: &Node) -> Result<(), NodeError> {
        let scope = self.scope().ok_or(NodeError::NoScope)?;
        let mut data = scope.data.borrow_mut();
        match &mut data.symtab {
            Some(symtab) => {
                symtab.include(node.clone());
                Ok(())
            }
            None => Err(NodeError::NoScope),
        }
    }

    /// Upward name resolution from this node, keyed by its own location.
    ///
    /// Walks outward starting at the enclosing scope. At each scope the
    /// bindings for the key are filtered to `LOOKUP` tags (restricted to
    /// definitions that precede this node when the scope demands
    /// definition-before-use), the scope's includes are appended
    /// unconditionally, and the walk stops once the scope limit `until`
    /// has been processed or any collected binding is `SHADOWING`.
    pub fn lookup(&self, until: Option<&Node>) -> Vec<Node> {
        let key = self.location();
        let mut result = Vec::new();
        let mut scope = self.scope();
        while let Some(current) = scope {
            let ordered = current.tag().has(TokenFlags::DEF_BEFORE_USE);
            {
                let data = current.data.borrow();
                if let Some(symtab) = &data.symtab {
                    result.extend(symtab.symbols_for(&key, |n| {
                        n.tag().has(TokenFlags::LOOKUP) && (!ordered || n.precedes(self))
                    }));
                    result.extend(symtab.includes().iter().cloned());
                }
            }
            let at_limit = until.is_some_and(|limit| Node::ptr_eq(&current, limit));
            let shadowed = result
                .iter()
                .any(|n| n.tag().has(TokenFlags::SHADOWING));
            if at_limit || shadowed {
                break;
            }
            scope = current.scope();
        }
        result
    }

    /// Scoped resolution: bindings for `name` in this node's own symbol
    /// table, restricted to `LOOKDOWN` tags. Includes are not consulted.
    pub fn lookdown(&self, name: &Location) -> Vec<Node> {
        let data = self.data.borrow();
        match &data.symtab {
            Some(symtab) => symtab.symbols_for(name, |n| n.tag().has(TokenFlags::LOOKDOWN)),
            None => Vec::new(),
        }
    }

    /// Unfiltered read of this node's own symbol table.
    pub fn look(&self, name: &Location) -> Vec<Node> {
        let data = self.data.borrow();
        match &data.symtab {
            Some(symtab) => symtab.symbols_for(name, |_| true),
            None => Vec::new(),
        }
    }

    /// A fresh name from the tree root's symbol table.
    ///
    /// The counter is per root, so two calls on the same tree never
    /// return the same location.
    pub fn fresh(&self, prefix: &str) -> Result<Location, NodeError> {
        let mut root = self.clone();
        while let Some(parent) = root.parent() {
            root = parent;
        }
        let mut data = root.data.borrow_mut();
        match &mut data.symtab {
            Some(symtab) => Ok(symtab.fresh(prefix)),
            None => Err(NodeError::NoScope),
        }
    }

    /// Drop this node's bindings and includes, keeping the fresh-name
    /// counter.
    pub fn clear_symbols(&self) {
        let mut data = self.data.borrow_mut();
        if let Some(symtab) = &mut data.symtab {
            symtab.clear();
        }
    }
}
