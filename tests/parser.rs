//! Grammar and precedence properties exercised through the public
//! `Jexl`/`parser`/`printer` surface rather than the parser's own
//! module-internal unit tests.

use jexl::ast::Root;
use jexl::context::MapContext;
use jexl::features::FeatureSet;
use jexl::parser::parse;
use jexl::value::Value;
use jexl::Jexl;

#[test]
fn ast_round_trip_reparses_to_an_equivalent_value() {
    let engine = Jexl::new();
    for source in ["1 + 2 * 3", "a ? b : c", "x -> x + 1", "[1, 2, 3][1]", "{'a': 1}.a"] {
        let script = engine.create_script("t", source, &[]).unwrap();
        let printed = script.get_parsed_text();
        // Reparsing the printed form must not error: the printer only ever
        // emits syntax the parser itself accepts.
        assert!(parse(&printed, "t2", FeatureSet::all()).is_ok());
    }
}

#[test]
fn arithmetic_printed_text_reevaluates_identically() {
    let engine = Jexl::new();
    let script = engine.create_script("t", "1 + 2 * 3", &[]).unwrap();
    let printed = script.get_parsed_text();
    let reparsed = engine.create_script("t2", &printed, &[]).unwrap();
    let ctx = MapContext::new();
    assert!(matches!(reparsed.execute(ctx, &[]).unwrap(), Value::Int(7)));
}

#[test]
fn feature_gating_rejects_disabled_constructs() {
    let mut features = FeatureSet::all();
    features.set_loops(false);
    let err = parse("for (var i = 0; i < 3; i = i + 1) { i }", "t", features).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("loop") || err.to_string().to_lowercase().contains("feature"));
}

#[test]
fn feature_gating_is_monotonic_disabling_never_unlocks_new_syntax() {
    // Every construct accepted with a feature disabled must still be
    // accepted with every feature enabled; the inverse need not hold.
    let restricted = {
        let mut f = FeatureSet::all();
        f.set_lambda(false);
        f
    };
    let all = FeatureSet::all();
    let source = "1 + 2";
    assert!(parse(source, "t", restricted).is_ok());
    assert!(parse(source, "t", all).is_ok());
}

#[test]
fn side_effect_false_rejects_assignment() {
    let mut features = FeatureSet::all();
    features.set_side_effect(false);
    assert!(parse("x = 1", "t", features.clone()).is_err());
    assert!(parse("x", "t", features).is_ok());
}

#[test]
fn local_var_false_rejects_declarations() {
    let mut features = FeatureSet::all();
    features.set_local_var(false);
    assert!(parse("var x = 1", "t", features).is_err());
}

#[test]
fn script_false_rejects_multi_statement_programs_but_not_bare_expressions() {
    let mut features = FeatureSet::all();
    features.set_script(false);
    assert!(parse("1 + 1", "t", features.clone()).is_ok());
    assert!(parse("var x = 1; x", "t", features).is_err());
}

#[test]
fn antish_identifier_collects_dotted_segments() {
    use jexl::ast::Expr;
    let root = parse("request.user.name", "t", FeatureSet::all()).unwrap();
    match root {
        Root::Expression(Expr::Identifier { segments, .. }) => {
            assert_eq!(segments, vec!["request", "user", "name"]);
        }
        other => panic!("expected a single antish identifier expression, got {other:?}"),
    }
}

#[test]
fn multi_assign_parses_a_parenthesized_target_list() {
    let root = parse("(a, b) = pair", "t", FeatureSet::all());
    assert!(root.is_ok());
}

#[test]
fn safe_navigation_chain_parses_through_calls_and_members() {
    let root = parse("a?.b()?.c", "t", FeatureSet::all());
    assert!(root.is_ok());
}

#[test]
fn namespace_pragma_false_rejects_a_namespace_declaration_but_not_other_pragmas() {
    let mut features = FeatureSet::all();
    features.set_namespace_pragma(false);
    assert!(parse("#pragma jexl.namespace.sleeper Sleeper\n1", "t", features.clone()).is_err());
    assert!(parse("#pragma jexl.strict false\n1", "t", features).is_ok());
}

#[test]
fn namespace_prefixed_call_parses_as_a_two_segment_identifier_callee() {
    use jexl::ast::Expr;
    let root = parse("sleeper:sleep(100)", "t", FeatureSet::all()).unwrap();
    match root {
        Root::Expression(Expr::Call { callee, .. }) => match *callee {
            Expr::Identifier { segments, .. } => assert_eq!(segments, vec!["sleeper", "sleep"]),
            other => panic!("expected an identifier callee, got {other:?}"),
        },
        other => panic!("expected a call expression, got {other:?}"),
    }
}

#[test]
fn namespace_call_printed_text_preserves_the_colon() {
    let engine = Jexl::new();
    let script = engine.create_script("t", "sleeper:sleep(100)", &[]).unwrap();
    assert_eq!(script.get_parsed_text(), "sleeper:sleep(100)");
}

#[test]
fn spaced_colon_after_an_identifier_is_not_a_namespace_call() {
    // A ternary else-branch and a map-literal key both use `identifier :`
    // with a space; only a tight `prefix:method` lexes as a namespace call.
    assert!(parse("x ? sleeper : foo()", "t", FeatureSet::all()).is_ok());
    assert!(parse("{foo: bar()}", "t", FeatureSet::all()).is_ok());
}

#[test]
fn brace_list_without_colons_parses_as_a_set_literal() {
    use jexl::ast::{ArrayElement, Expr};
    let root = parse("{1, 2, 3}", "t", FeatureSet::all()).unwrap();
    match root {
        Root::Expression(Expr::SetLiteral { elements, .. }) => {
            assert_eq!(elements.len(), 3);
            assert!(matches!(&elements[0], ArrayElement::Value(Expr::Literal(..))));
        }
        other => panic!("expected a set literal, got {other:?}"),
    }
}

#[test]
fn brace_list_with_a_colon_still_parses_as_a_map() {
    use jexl::ast::Expr;
    let root = parse("{1: 'a'}", "t", FeatureSet::all()).unwrap();
    assert!(matches!(root, Root::Expression(Expr::MapLiteral { .. })));
    let root = parse("{}", "t", FeatureSet::all()).unwrap();
    assert!(matches!(root, Root::Expression(Expr::MapLiteral { .. })));
}

#[test]
fn word_form_comparators_are_equivalent_to_the_symbolic_operators() {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    for (word, expected) in [("eq", true), ("ne", false), ("lt", true), ("le", true), ("gt", false), ("ge", false)] {
        let source = format!("1 {word} 2");
        let v = engine.create_expression("t", &source).unwrap().execute(ctx.clone()).unwrap();
        assert!(matches!(v, Value::Bool(b) if b == expected), "{source} => {v:?}");
    }
}

#[test]
fn word_form_comparators_are_rejected_when_the_feature_is_off() {
    let mut features = FeatureSet::all();
    features.set_comparator_names(false);
    assert!(parse("1 eq 2", "t", features).is_err());
}

#[test]
fn pragma_header_is_not_duplicated_as_a_statement() {
    let root = parse("#pragma jexl.strict false\n1 + 1", "t", FeatureSet::all()).unwrap();
    match root {
        Root::Script { pragmas, body, .. } => {
            assert_eq!(pragmas.len(), 1);
            assert_eq!(pragmas[0].key, "jexl.strict");
            // The body is just the expression statement, not a duplicate
            // `Stmt::Pragma` node for the header.
            assert_eq!(body.len(), 1);
        }
        Root::Expression(_) => panic!("a leading pragma forces script form"),
    }
}
