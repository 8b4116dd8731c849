//! The rewrite-pass executor.
//!
//! A pass owns an ordered list of rules, optional once-per-run and
//! per-tag hooks, and a direction. Running it scans each node's child
//! list with a cursor, tries the rules in declared order at every
//! position, applies the first effect that fires, and repeats the whole
//! sweep until an iteration makes no changes (unless the pass is marked
//! `once`).
//!
//! `Error` and `Lift` nodes are opaque: the executor neither matches at
//! them nor descends into them. After every sweep the executor resolves
//! `Lift` envelopes, carrying their contents up the spine to the nearest
//! ancestor whose tag equals the envelope's first child; an envelope
//! that reaches the pass root unconsumed fails the pass.

use std::collections::HashMap;

use crate::graft::error::PassError;
use crate::graft::location::Location;
use crate::graft::node::Node;
use crate::graft::pattern::Match;
use crate::graft::rule::{Rewrite, Rule};
use crate::graft::token::{Token, ERROR, LIFT};

/// Iteration strategy over the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Match at a node before recursing into it.
    TopDown,
    /// Recurse into a node before matching at it.
    BottomUp,
}

/// What a finished pass reports back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassReport {
    /// Sweeps performed, including the final changeless one.
    pub iterations: usize,
    /// Nodes inserted by effects over the whole run.
    pub changes: usize,
}

type HookFn = Box<dyn Fn(&Node) -> Result<usize, PassError>>;

/// One rewrite stage: rules, hooks and a direction.
pub struct Pass {
    direction: Direction,
    once: bool,
    rules: Vec<Rule>,
    pre_run: Option<HookFn>,
    post_run: Option<HookFn>,
    pre_tag: HashMap<Token, HookFn>,
    post_tag: HashMap<Token, HookFn>,
}

impl Pass {
    pub fn new(direction: Direction) -> Pass {
        Pass {
            direction,
            once: false,
            rules: Vec::new(),
            pre_run: None,
            post_run: None,
            pre_tag: HashMap::new(),
            post_tag: HashMap::new(),
        }
    }

    pub fn topdown() -> Pass {
        Pass::new(Direction::TopDown)
    }

    pub fn bottomup() -> Pass {
        Pass::new(Direction::BottomUp)
    }

    /// Run a single sweep instead of iterating to a fixed point.
    pub fn once(mut self) -> Pass {
        self.once = true;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Pass {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: Vec<Rule>) -> Pass {
        self.rules.extend(rules);
        self
    }

    /// Hook run once before the first sweep; its return value is added
    /// to the reported change count.
    pub fn pre_run<F>(mut self, hook: F) -> Pass
    where
        F: Fn(&Node) -> Result<usize, PassError> + 'static,
    {
        self.pre_run = Some(Box::new(hook));
        self
    }

    /// Hook run once after the last sweep.
    pub fn post_run<F>(mut self, hook: F) -> Pass
    where
        F: Fn(&Node) -> Result<usize, PassError> + 'static,
    {
        self.post_run = Some(Box::new(hook));
        self
    }

    /// Hook run when a sweep enters a node with the given tag.
    pub fn pre<F>(mut self, tag: Token, hook: F) -> Pass
    where
        F: Fn(&Node) -> Result<usize, PassError> + 'static,
    {
        self.pre_tag.insert(tag, Box::new(hook));
        self
    }

    /// Hook run when a sweep leaves a node with the given tag.
    pub fn post<F>(mut self, tag: Token, hook: F) -> Pass
    where
        F: Fn(&Node) -> Result<usize, PassError> + 'static,
    {
        self.post_tag.insert(tag, Box::new(hook));
        self
    }

    /// Rewrite `root` in place until a fixed point (or a single sweep
    /// when `once` is set).
    pub fn run(&self, root: &Node) -> Result<PassReport, PassError> {
        let mut iterations = 0;
        let mut total = 0;
        if let Some(hook) = &self.pre_run {
            total += hook(root)?;
        }
        let mut m = Match::new(root.clone());
        loop {
            let changes = self.apply(&mut m, root)?;
            let unresolved = self.lift(root);
            if !unresolved.is_empty() {
                return Err(PassError::UnresolvedLift {
                    remaining: unresolved.len(),
                });
            }
            total += changes;
            iterations += 1;
            if self.once || changes == 0 {
                break;
            }
        }
        if let Some(hook) = &self.post_run {
            total += hook(root)?;
        }
        tracing::debug!(iterations, changes = total, "pass finished");
        Ok(PassReport {
            iterations,
            changes: total,
        })
    }

    // One sweep over `node`'s children. The top node itself is never a
    // match target, only a context.
    fn apply(&self, m: &mut Match, node: &Node) -> Result<usize, PassError> {
        if node.tag() == ERROR || node.tag() == LIFT {
            return Ok(0);
        }
        let mut changes = 0;
        if let Some(hook) = self.pre_tag.get(&node.tag()) {
            changes += hook(node)?;
        }
        let mut it = 0;
        while it < node.len() {
            let child = match node.child(it) {
                Some(child) => child,
                None => break,
            };
            if child.tag() == ERROR || child.tag() == LIFT {
                it += 1;
                continue;
            }
            if self.direction == Direction::BottomUp {
                changes += self.apply(m, &child)?;
            }
            let (replaced, delta) = self.step(m, node, &mut it)?;
            changes += delta;
            if self.once {
                // Recurse only into nodes a rule just produced; a child
                // that matched no rule is passed over without looking
                // inside it.
                if self.direction == Direction::TopDown {
                    if let Some(count) = replaced {
                        for offset in 0..count {
                            if let Some(produced) = node.child(it + offset) {
                                changes += self.apply(m, &produced)?;
                            }
                        }
                    }
                }
                match replaced {
                    Some(count) => it += count,
                    None => it += 1,
                }
            } else if replaced.is_some() {
                // Earlier siblings may newly match against the rewritten
                // sequence; re-examine from the start.
                it = 0;
            } else {
                if self.direction == Direction::TopDown {
                    changes += self.apply(m, &child)?;
                }
                it += 1;
            }
        }
        if let Some(hook) = self.post_tag.get(&node.tag()) {
            changes += hook(node)?;
        }
        Ok(changes)
    }

    // Try each rule at the cursor. On a firing rule, rewrite the matched
    // range and report how many nodes now occupy it; `None` means no
    // rule fired. The cursor is left at the start of the rewritten
    // range.
    fn step(
        &self,
        m: &mut Match,
        node: &Node,
        it: &mut usize,
    ) -> Result<(Option<usize>, usize), PassError> {
        let end = node.len();
        let start = *it;
        for rule in &self.rules {
            m.reset();
            let mut pos = start;
            if !rule.pattern().try_match(node, &mut pos, end, m) {
                continue;
            }
            let outcome = rule.run_effect(m)?;

            // Synthesized nodes without a location inherit the span of
            // what they replace.
            let mut span = Location::none();
            for index in start..pos {
                if let Some(matched) = node.child(index) {
                    span = span.join(&matched.location());
                }
            }

            let replaced = match outcome {
                Rewrite::NoChange => continue,
                Rewrite::Delete => {
                    node.erase(start..pos);
                    0
                }
                Rewrite::Splice(nodes) => {
                    node.erase(start..pos);
                    for fresh in &nodes {
                        fresh.fill_location(&span);
                    }
                    let count = nodes.len();
                    node.insert_all(start, nodes);
                    count
                }
                Rewrite::Replace(fresh) => {
                    node.erase(start..pos);
                    fresh.fill_location(&span);
                    node.insert(start, fresh);
                    1
                }
            };
            *it = start;
            return Ok((Some(replaced), replaced));
        }
        Ok((None, 0))
    }

    // Resolve Lift envelopes bottom-up. A Lift child is detached and
    // queued; a queued envelope whose first child names this node's tag
    // is spliced at the cursor; anything else propagates upward. A
    // container whose children were all consumed by lifting is
    // dissolved. Envelopes returned from the pass root are unresolved.
    fn lift(&self, node: &Node) -> Vec<Node> {
        // The propagation flag marks the spines that lead to Lift
        // nodes; consuming it here both prunes the walk and leaves the
        // tree clean for the next iteration.
        if !node.take_contains_lift() {
            return Vec::new();
        }
        let mut uplift = Vec::new();
        let mut it = 0;
        while it < node.len() {
            let child = match node.child(it) {
                Some(child) => child,
                None => break,
            };
            let mut advance = true;
            let mut pending = self.lift(&child);
            if child.tag() == LIFT {
                pending.insert(0, child.clone());
                node.erase(it..it + 1);
                advance = false;
            } else if !pending.is_empty() && child.is_empty() {
                node.erase(it..it + 1);
                advance = false;
            }
            for envelope in pending {
                let consumed_here = envelope
                    .front()
                    .map_or(false, |head| head.tag() == node.tag());
                if consumed_here {
                    let mut contents = envelope.children();
                    contents.remove(0);
                    let count = contents.len();
                    node.insert_all(it, contents);
                    it += count;
                    advance = false;
                } else {
                    uplift.push(envelope);
                }
            }
            if advance {
                it += 1;
            }
        }
        uplift
    }
}
