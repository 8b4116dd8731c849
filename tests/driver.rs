//! Pipeline sequencing: schemas between stages, error gathering and
//! short-circuiting.

use graft_engine::graft::driver::{Driver, DriverError, FnSchema, Schema, SchemaViolation};
use graft_engine::graft::node::Node;
use graft_engine::graft::pass::Pass;
use graft_engine::graft::pattern::{any, inside, last, tok};
use graft_engine::graft::rule::{error_node, rule, Rewrite};
use graft_engine::graft::testing::{parse, parse_str, A, B, GROUP, H};
use graft_engine::graft::token::{Token, TokenDef, TOP};

static X_DEF: TokenDef = TokenDef::new("x");
static X: Token = Token::new(&X_DEF);

/// Reject trees that still contain a node with the given tag.
fn forbid(tag: Token) -> impl Schema {
    FnSchema::new(move |root: &Node| {
        let mut violations = Vec::new();
        root.traverse(
            |node| {
                if node.tag() == tag {
                    violations.push(SchemaViolation {
                        message: format!("unexpected {} node", tag.name()),
                        location: node.location(),
                    });
                }
                true
            },
            |_| {},
        );
        violations
    })
}

fn top_shape() -> impl Schema {
    FnSchema::new(|root: &Node| {
        if root.tag() == TOP {
            Vec::new()
        } else {
            vec![SchemaViolation {
                message: format!("expected Top at the root, found {}", root.tag().name()),
                location: root.location(),
            }]
        }
    })
}

fn group_drop() -> Pass {
    Pass::topdown().rule(rule(
        inside(GROUP).then(tok(GROUP).children(any().capture(X).then(last()))),
        |m| Ok(Rewrite::Replace(m.get(X).expect("captured child"))),
    ))
}

fn a_to_b() -> Pass {
    Pass::topdown().rule(rule(tok(A), |_| Ok(Rewrite::Replace(Node::new(B)))))
}

fn reject_h() -> Pass {
    Pass::topdown().rule(rule(tok(H).capture(X), |m| {
        let offender = m.get(X).expect("captured offender");
        Ok(Rewrite::Replace(error_node("H is not allowed here", offender)))
    }))
}

#[test]
fn stages_run_in_order_with_metrics() {
    let driver = Driver::new("pipeline", parse)
        .parse_schema(top_shape())
        .stage("flatten", group_drop(), Some(Box::new(top_shape())))
        .stage("rename", a_to_b(), Some(Box::new(forbid(A))));

    let out = driver
        .run(&graft_engine::graft::location::Source::synthetic("((A))"))
        .unwrap();
    assert!(out.root.equals(&parse_str("B").unwrap()));
    assert!(out.errors.is_empty());

    assert_eq!(out.metrics.len(), 2);
    assert_eq!(out.metrics[0].name, "flatten");
    assert_eq!(out.metrics[0].changes, 1);
    assert_eq!(out.metrics[0].iterations, 2);
    assert_eq!(out.metrics[1].name, "rename");
    assert_eq!(out.metrics[1].changes, 1);
}

#[test]
fn schema_violations_are_fatal_to_the_driver() {
    // The first stage does nothing, so the forbid-A schema must trip.
    let driver = Driver::new("pipeline", parse).stage(
        "noop",
        Pass::topdown(),
        Some(Box::new(forbid(A))),
    );

    match driver.run(&graft_engine::graft::location::Source::synthetic("A")) {
        Err(DriverError::Malformed { stage, violations }) => {
            assert_eq!(stage, "noop");
            assert_eq!(violations.len(), 1);
            assert!(violations[0].message.contains("unexpected A"));
        }
        other => panic!(
            "expected a schema violation, got {:?}",
            other.map(|o| o.metrics)
        ),
    }
}

#[test]
fn gathered_errors_short_circuit_later_stages() {
    let driver = Driver::new("pipeline", parse)
        .stage("reject", reject_h(), None)
        .stage("rename", a_to_b(), None);

    let out = driver
        .run(&graft_engine::graft::location::Source::synthetic("A H"))
        .unwrap();
    // The second stage never ran: the A is still an A.
    assert_eq!(out.metrics.len(), 1);
    assert_eq!(out.errors.len(), 1);
    let message = out.errors[0].child(0).unwrap();
    assert_eq!(message.location().view(), "H is not allowed here");

    let file_group = out.root.child(0).unwrap().child(0).unwrap();
    assert_eq!(file_group.child(0).unwrap().tag(), A);
}

#[test]
fn clean_inputs_flow_through_all_stages() {
    let driver = Driver::new("pipeline", parse)
        .stage("reject", reject_h(), None)
        .stage("rename", a_to_b(), None);

    let out = driver
        .run(&graft_engine::graft::location::Source::synthetic("A C"))
        .unwrap();
    assert!(out.errors.is_empty());
    assert_eq!(out.metrics.len(), 2);
    assert!(out.root.equals(&parse_str("B C").unwrap()));
}

#[test]
fn run_until_stops_at_the_named_stage() {
    let driver = Driver::new("pipeline", parse)
        .stage("flatten", group_drop(), None)
        .stage("rename", a_to_b(), None);

    let source = graft_engine::graft::location::Source::synthetic("((A))");
    let out = driver.run_until(&source, "flatten").unwrap();
    assert_eq!(out.metrics.len(), 1);
    assert!(out.root.equals(&parse_str("A").unwrap()));
}

#[test]
fn parser_schema_guards_the_initial_tree() {
    // A parser that produces the wrong root shape.
    let driver = Driver::new("broken", |_: &graft_engine::graft::location::SourceRef| {
        Ok(Node::new(GROUP))
    })
    .parse_schema(top_shape());

    match driver.run(&graft_engine::graft::location::Source::synthetic("")) {
        Err(DriverError::Malformed { stage, .. }) => assert_eq!(stage, "parse"),
        other => panic!(
            "expected a parse-schema violation, got {:?}",
            other.map(|o| o.metrics)
        ),
    }
}

#[test]
fn unparseable_input_is_a_parse_error() {
    let driver = Driver::new("pipeline", parse);
    match driver.run(&graft_engine::graft::location::Source::synthetic("( A")) {
        Err(DriverError::Parse(message)) => assert!(message.contains("unclosed")),
        other => panic!("expected a parse error, got {:?}", other.map(|o| o.metrics)),
    }
}
