//! End-to-end rewrite scenarios: parse an input, run a pass, compare
//! against the parse of the expected output.

use graft_engine::graft::node::Node;
use graft_engine::graft::pass::Pass;
use graft_engine::graft::pattern::{any, inside, last, tok};
use graft_engine::graft::rule::{rule, Rewrite};
use graft_engine::graft::testing::{parse_str, A, B, BLOCK, C, D, E, F, GROUP, H};
use graft_engine::graft::token::{Token, TokenDef, LIFT, TOP};
use rstest::rstest;

static X_DEF: TokenDef = TokenDef::new("x");
static X: Token = Token::new(&X_DEF);

fn assert_rewrites(pass: &Pass, input: &str, expected: &str) {
    let root = parse_str(input).expect("input parses");
    let want = parse_str(expected).expect("expected parses");
    pass.run(&root).expect("pass succeeds");
    assert!(
        root.equals(&want),
        "{input:?} rewrote to:\n{root}\nexpected:\n{want}"
    );
}

fn group_drop() -> Pass {
    // A group with exactly one child, itself sitting in a group,
    // dissolves into that child.
    Pass::topdown().rule(rule(
        inside(GROUP).then(tok(GROUP).children(any().capture(X).then(last()))),
        |m| Ok(Rewrite::Replace(m.get(X).expect("captured child"))),
    ))
}

fn lift_pass() -> Pass {
    Pass::topdown()
        .rule(rule(inside(GROUP).then(tok(A)), |_| {
            let envelope = Node::new(LIFT);
            envelope.push_back(Node::new(BLOCK));
            envelope.push_back(Node::new(C));
            Ok(Rewrite::Replace(envelope))
        }))
        .rule(rule(tok(B).then(tok(D)), |_| {
            Ok(Rewrite::Splice(vec![Node::new(E), Node::new(F)]))
        }))
}

#[rstest]
#[case("A")]
#[case("(A)")]
#[case("{A}")]
#[case("((A B))")]
fn a_pass_with_no_rules_is_the_identity(#[case] input: &str) {
    let root = parse_str(input).unwrap();
    let before = root.deep_clone();
    let report = Pass::topdown().run(&root).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.changes, 0);
    assert!(root.equals(&before));
}

#[test]
fn explicit_and_implicit_file_groups_parse_alike() {
    let plain = parse_str("A").unwrap();
    let grouped = parse_str("(A)").unwrap();
    assert!(plain.equals(&grouped));
}

#[rstest]
#[case("(A)", "A")]
#[case("((A))", "A")]
#[case("((A B))", "((A B))")]
fn single_group_drop(#[case] input: &str, #[case] expected: &str) {
    assert_rewrites(&group_drop(), input, expected);
}

#[rstest]
#[case("{(A A)}", "{C C}")]
#[case("{(B A D)}", "{C (E F)}")]
fn lift_carries_children_to_the_enclosing_block(#[case] input: &str, #[case] expected: &str) {
    assert_rewrites(&lift_pass(), input, expected);
}

#[test]
fn splice_unpacks_a_sequence_in_place() {
    let pass = Pass::topdown().rule(rule(tok(B).then(tok(D)), |_| {
        Ok(Rewrite::Splice(vec![Node::new(E), Node::new(F)]))
    }));
    assert_rewrites(&pass, "A B D C", "A E F C");
}

#[test]
fn delete_removes_the_matched_range_and_counts_nothing() {
    let pass = Pass::topdown().rule(rule(tok(GROUP).children(last()), |_| Ok(Rewrite::Delete)));
    let root = parse_str("A () B").unwrap();
    let report = pass.run(&root).unwrap();
    assert!(root.equals(&parse_str("A B").unwrap()));
    // The executor counts inserted nodes; a pure deletion inserts none.
    assert_eq!(report.changes, 0);
    assert_eq!(report.iterations, 1);
}

#[test]
fn no_change_yields_to_later_rules_and_is_not_counted() {
    let pass = Pass::topdown()
        .rule(rule(tok(A), |_| Ok(Rewrite::NoChange)))
        .rule(rule(tok(A), |_| Ok(Rewrite::Replace(Node::new(B)))));
    let root = parse_str("A").unwrap();
    let report = pass.run(&root).unwrap();
    assert!(root.equals(&parse_str("B").unwrap()));
    assert_eq!(report.changes, 1);
}

#[test]
fn a_rule_that_only_reports_no_change_terminates() {
    let pass = Pass::topdown().rule(rule(tok(A), |_| Ok(Rewrite::NoChange)));
    let root = parse_str("A A A").unwrap();
    let report = pass.run(&root).unwrap();
    assert!(root.equals(&parse_str("A A A").unwrap()));
    assert_eq!(report.iterations, 1);
    assert_eq!(report.changes, 0);
}

#[test]
fn once_mode_rewrites_each_position_a_single_time() {
    // The effect reproduces the matched tag, which would loop forever in
    // fixed-point mode. A once pass only descends into what its rules
    // produce, so the siblings sit directly under the root.
    let root = Node::new(TOP);
    for _ in 0..3 {
        root.push_back(Node::new(A));
    }
    let pass = Pass::topdown()
        .once()
        .rule(rule(tok(A), |_| Ok(Rewrite::Replace(Node::new(A)))));
    let report = pass.run(&root).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.changes, 3);
    assert_eq!(root.len(), 3);
    for child in root.children() {
        assert_eq!(child.tag(), A);
    }
}

#[test]
fn once_topdown_does_not_descend_into_unmatched_siblings() {
    let build = || {
        let root = Node::new(TOP);
        let group = Node::new(GROUP);
        group.push_back(Node::new(A));
        group.push_back(Node::new(B));
        root.push_back(Node::new(A));
        root.push_back(group.clone());
        (root, group)
    };
    let pair_to_c = || {
        rule(tok(A).then(tok(B)), |_| {
            Ok(Rewrite::Replace(Node::new(C)))
        })
    };

    // Neither sibling matches as a unit: the lone A has no B after it,
    // and the group is not an A. The pair inside the group must be left
    // alone, not rewritten by an unasked-for descent.
    let (root, group) = build();
    let report = Pass::topdown().once().rule(pair_to_c()).run(&root).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.changes, 0);
    assert_eq!(group.len(), 2);
    assert_eq!(group.child(0).unwrap().tag(), A);
    assert_eq!(group.child(1).unwrap().tag(), B);

    // The fixed-point form does recurse into unmatched children and
    // rewrites the nested pair.
    let (root, group) = build();
    let report = Pass::topdown().rule(pair_to_c()).run(&root).unwrap();
    assert_eq!(report.changes, 1);
    assert_eq!(group.len(), 1);
    assert_eq!(group.child(0).unwrap().tag(), C);
}

#[test]
fn bottomup_rewrites_inner_nodes_before_outer() {
    // Inner groups collapse first, so the outer group sees the collapsed
    // child within the same sweep.
    let pass = Pass::bottomup().rule(rule(
        inside(GROUP).then(tok(GROUP).children(any().capture(X).then(last()))),
        |m| Ok(Rewrite::Replace(m.get(X).expect("captured child"))),
    ));
    assert_rewrites(&pass, "(((A)))", "A");
}

#[test]
fn synthesized_nodes_inherit_the_span_of_what_they_replace() {
    let source = graft_engine::graft::location::Source::new("main", "A B");
    let pass = Pass::topdown().rule(rule(tok(A).then(tok(B)), |_| {
        Ok(Rewrite::Replace(Node::new(C)))
    }));
    let root = graft_engine::graft::testing::parse(&source).unwrap();
    pass.run(&root).unwrap();
    let file_group = root.child(0).unwrap().child(0).unwrap();
    let replacement = file_group.child(0).unwrap();
    assert_eq!(replacement.tag(), C);
    assert_eq!(replacement.location().view(), "A B");
}

#[test]
fn effects_can_mint_fresh_names() {
    let pass = Pass::topdown().rule(rule(tok(H), |m| {
        let name = m.fresh("tmp")?;
        Ok(Rewrite::Replace(Node::with_location(
            graft_engine::graft::testing::USE,
            name,
        )))
    }));
    let root = parse_str("H H").unwrap();
    pass.run(&root).unwrap();
    let file_group = root.child(0).unwrap().child(0).unwrap();
    let names: Vec<String> = file_group
        .children()
        .iter()
        .map(|n| n.location().view().to_string())
        .collect();
    assert_eq!(names, vec!["tmp$0", "tmp$1"]);
}

#[test]
fn rules_apply_in_declared_order() {
    let pass = Pass::topdown()
        .rule(rule(tok(A), |_| Ok(Rewrite::Replace(Node::new(E)))))
        .rule(rule(tok(A), |_| Ok(Rewrite::Replace(Node::new(F)))));
    assert_rewrites(&pass, "A", "E");
}

#[test]
fn failing_effects_abort_the_pass() {
    use graft_engine::graft::error::PassError;
    let pass = Pass::topdown().rule(rule(tok(A), |_| {
        Err(PassError::Effect("refusing to rewrite".to_string()))
    }));
    let root = parse_str("A").unwrap();
    assert!(matches!(pass.run(&root), Err(PassError::Effect(_))));
}
