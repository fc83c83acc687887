//! Tests for block parsing and the try/catch grammar hook

use std::sync::Arc;

use super::*;
use crate::ext::{ExprStmtExtension, TagRegistry, TryCatchExtension};
use crate::runtime::Value;

fn registry() -> TagRegistry {
    let mut registry = TagRegistry::new();
    registry.register(Arc::new(TryCatchExtension));
    registry.register(Arc::new(ExprStmtExtension));
    registry
}

fn parse_ok(source: &str) -> Vec<Node> {
    parse(source, LexerOptions::default(), &registry()).unwrap()
}

fn parse_err(source: &str) -> String {
    parse(source, LexerOptions::default(), &registry())
        .unwrap_err()
        .message
}

fn data_text(node: &Node) -> Option<&str> {
    match node {
        Node::Data { text, .. } => Some(text),
        _ => None,
    }
}

#[test]
fn test_try_without_catch() {
    let nodes = parse_ok("{% try %}body{% endtry %}");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].extension_name(), Some("try_catch"));

    let children = nodes[0].children();
    assert_eq!(children.len(), 1, "no fallback region without catch");
    assert_eq!(data_text(&children[0][0]), Some("body"));
}

#[test]
fn test_try_with_catch() {
    let nodes = parse_ok("{% try %}a{{ x }}{% catch %}b{% endtry %}");
    let children = nodes[0].children();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].len(), 2);
    assert_eq!(data_text(&children[1][0]), Some("b"));
}

#[test]
fn test_empty_regions_hold_empty_data() {
    let nodes = parse_ok("{% try %}{% catch %}{% endtry %}");
    let children = nodes[0].children();
    assert_eq!(children.len(), 2);
    for region in children {
        assert_eq!(region.len(), 1);
        assert_eq!(data_text(&region[0]), Some(""));
    }
}

#[test]
fn test_try_span_covers_end_tag() {
    let nodes = parse_ok("x\n{% try %}a\n{% endtry %}");
    let span = nodes[1].span();
    assert_eq!(span.start_line, 1);
    assert_eq!(span.end_line, 2);
    assert_eq!(span.end, "x\n{% try %}a\n{% endtry %}".len());
}

#[test]
fn test_nested_try_in_both_regions() {
    let nodes = parse_ok(
        "{% try %}{% try %}a{% endtry %}{% catch %}{% try %}b{% catch %}c{% endtry %}{% endtry %}",
    );
    let mut count = 0;
    nodes[0].walk(&mut |node| {
        if node.extension_name() == Some("try_catch") {
            count += 1;
        }
    });
    assert_eq!(count, 3);
}

#[test]
fn test_missing_endtry() {
    assert_eq!(
        parse_err("{% try %}a"),
        "unexpected end of template, expected 'catch' or 'endtry'; \
         the innermost block that needs to be closed is 'try'"
    );
    assert_eq!(
        parse_err("{% try %}a{% catch %}b"),
        "unexpected end of template, expected 'endtry'; \
         the innermost block that needs to be closed is 'try'"
    );
}

#[test]
fn test_unknown_tag_inside_try() {
    assert_eq!(
        parse_err("{% try %}{% endfor %}{% endtry %}"),
        "encountered unknown tag 'endfor', expected 'catch' or 'endtry'; \
         the innermost block that needs to be closed is 'try'"
    );
}

#[test]
fn test_stray_catch_is_unknown() {
    assert_eq!(parse_err("{% catch %}"), "encountered unknown tag 'catch'");
}

#[test]
fn test_second_catch_rejected() {
    assert_eq!(
        parse_err("{% try %}a{% catch %}b{% catch %}c{% endtry %}"),
        "encountered unknown tag 'catch', expected 'endtry'; \
         the innermost block that needs to be closed is 'try'"
    );
}

#[test]
fn test_tag_arguments_rejected() {
    assert_eq!(
        parse_err("{% try x %}a{% endtry %}"),
        "expected end of statement block, got 'x'"
    );
    assert_eq!(
        parse_err("{% try %}a{% catch e %}b{% endtry %}"),
        "expected end of statement block, got 'e'"
    );
}

#[test]
fn test_try_without_extension_is_unknown() {
    let err = parse("{% try %}a{% endtry %}", LexerOptions::default(), &TagRegistry::new())
        .unwrap_err();
    assert_eq!(err.message, "encountered unknown tag 'try'");
}

#[test]
fn test_syntax_error_reports_line() {
    let err = parse("a\nb\n{% try %}", LexerOptions::default(), &registry()).unwrap_err();
    assert!(err.to_string().contains("unexpected end of template"));
}

#[test]
fn test_whitespace_control_around_try() {
    let nodes = parse_ok("  {%- try -%}  a  {%- endtry -%}  ");
    assert_eq!(nodes.len(), 1);
    assert_eq!(data_text(&nodes[0].children()[0][0]), Some("a"));
}

#[test]
fn test_if_elif_else() {
    let nodes = parse_ok("{% if a %}1{% elif b %}2{% else %}3{% endif %}");
    let Node::If {
        branches,
        else_body,
        ..
    } = &nodes[0]
    else {
        unreachable!("expected If, got {:?}", nodes[0]);
    };
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[1].0, Expr::Name("b".into()));
    assert!(else_body.is_some());
}

#[test]
fn test_for_and_set() {
    let nodes = parse_ok("{% set l = [] %}{% for c in 'ry' %}{% do l.append(c) %}{% endfor %}");
    let Node::Set { name, expr, .. } = &nodes[0] else {
        unreachable!("expected Set, got {:?}", nodes[0]);
    };
    assert_eq!(name, "l");
    assert_eq!(expr, &Expr::List(vec![]));

    let Node::For { target, iter, body, .. } = &nodes[1] else {
        unreachable!("expected For, got {:?}", nodes[1]);
    };
    assert_eq!(target, "c");
    assert_eq!(iter, &Expr::Const(Value::from("ry")));
    assert_eq!(body[0].extension_name(), Some("do"));
}

#[test]
fn test_expression_precedence() {
    let expr = expressions::parse_expression("1 + 2 * 3", Span::default()).unwrap();
    assert_eq!(
        expr,
        Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::Const(Value::Int(1))),
            right: Box::new(Expr::Binary {
                op: BinOp::Mul,
                left: Box::new(Expr::Const(Value::Int(2))),
                right: Box::new(Expr::Const(Value::Int(3))),
            }),
        }
    );
}

#[test]
fn test_filters_and_tests() {
    let expr = expressions::parse_expression("l | join(',')", Span::default()).unwrap();
    assert_eq!(
        expr,
        Expr::Filter {
            expr: Box::new(Expr::Name("l".into())),
            name: "join".into(),
            args: vec![Expr::Const(Value::from(","))],
        }
    );

    let expr = expressions::parse_expression("x is not defined", Span::default()).unwrap();
    assert_eq!(
        expr,
        Expr::Test {
            expr: Box::new(Expr::Name("x".into())),
            name: "defined".into(),
            args: vec![],
            negated: true,
        }
    );
}

#[test]
fn test_unknown_filter_is_syntax_error() {
    assert_eq!(parse_err("{{ x | nope }}"), "no filter named 'nope'");
    assert_eq!(parse_err("{{ x is nope }}"), "no test named 'nope'");
}

#[test]
fn test_literal_eval() {
    assert_eq!(expressions::literal_eval("None"), Some(Value::None));
    assert_eq!(expressions::literal_eval("False"), Some(Value::Bool(false)));
    assert_eq!(expressions::literal_eval("-3"), Some(Value::Int(-3)));
    assert_eq!(expressions::literal_eval("'a'"), Some(Value::from("a")));
    assert_eq!(
        expressions::literal_eval("[1, 'b']"),
        Some(Value::list(vec![Value::Int(1), Value::from("b")]))
    );
    assert_eq!(expressions::literal_eval("try"), None);
    assert_eq!(expressions::literal_eval("catch: 'x' is undefined"), None);
    assert_eq!(expressions::literal_eval(""), None);
}
