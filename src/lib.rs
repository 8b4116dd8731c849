//! # graft
//!
//! A term-rewriting engine for tree-shaped intermediate representations.
//!
//! The engine rewrites a mutable tagged tree to a fixed point by scanning
//! sibling sequences with pattern combinators and applying pattern→effect
//! rules, one pass at a time. Language frontends supply the token
//! vocabulary, the rules and a per-stage well-formedness oracle; the
//! engine supplies the tree, the matching machinery, the pass executor
//! and the multi-pass driver.
//!
//! The crate layout follows `src/graft/<area>`:
//!
//! - `token`, `location`, `node`, `symtab`: the data model
//! - `pattern`, `rule`: matching and effects
//! - `pass`, `driver`: execution
//! - `testing`: the tokenizer and vocabulary used by the test suites

pub mod graft;
