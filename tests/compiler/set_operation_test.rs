//! Integration tests for set-operation rendering.

use criteria_compiler::prelude::*;
use insta::assert_snapshot;

fn render_with(expr: &Expr, options: CompileOptions) -> CompileResult<CompiledQuery<RecordingBuilder>> {
    let templates = JpqlTemplates::default();
    let metamodel = StaticMetamodel::new();
    QueryCompiler::new(&templates, &metamodel)
        .with_options(options)
        .render(expr, RecordingBuilder::new())
}

fn trace(expr: &Expr) -> String {
    let compiled = render_with(expr, CompileOptions::default()).unwrap();
    assert!(compiled.builder.is_complete(), "builder left a scope open");
    compiled.builder.trace()
}

/// `SELECT x FROM Entity x`
fn query(entity: &str, alias: &str) -> QueryMetadata {
    let root = Path::root(entity, alias);
    QueryMetadata::new().from(&root).select(&root)
}

fn count_calls(builder: &RecordingBuilder, pred: impl Fn(&BuilderCall) -> bool) -> usize {
    builder.calls().iter().filter(|call| pred(call)).count()
}

#[test]
fn test_operand_order() {
    let expr = except(query("A", "a"), query("B", "b"));

    assert_snapshot!(trace(&expr), @r"
    from(A, a)
    select(a)
    except
    from(B, b)
    select(b)
    end_set
    ");
}

#[test]
fn test_bracketed_right_operand() {
    let expr = union_all(
        query("A", "a"),
        QueryMetadata::set_operand(except(query("B", "b"), query("C", "c"))),
    );

    assert_snapshot!(trace(&expr), @r"
    from(A, a)
    select(a)
    start_union_all
    from(B, b)
    select(b)
    except
    from(C, c)
    select(c)
    end_set_with
    end_set
    end_set
    ");
}

#[test]
fn test_left_nested_operand_keeps_its_order_and_limit() {
    let a = Path::root("A", "a");
    let nested = QueryMetadata::set_operand(intersect(query("A", "a"), query("B", "b")))
        .order_by(OrderSpecifier::asc(a.get("id", "Long")))
        .limit(3);
    let expr = left_nested_set_operation(SetOperationKind::Union, nested, query("C", "c"));

    assert_snapshot!(trace(&expr), @r"
    start_set
    from(A, a)
    select(a)
    intersect
    from(B, b)
    select(b)
    end_set_with
    order_by(a.id, ASC)
    set_max_results(3)
    end_set
    union
    from(C, c)
    select(c)
    end_set
    ");
}

#[test]
fn test_nested_left_operand_without_marker_is_inlined() {
    let expr = union(
        QueryMetadata::set_operand(intersect(query("A", "a"), query("B", "b"))),
        query("C", "c"),
    );

    assert_snapshot!(trace(&expr), @r"
    from(A, a)
    select(a)
    intersect
    from(B, b)
    select(b)
    union
    from(C, c)
    select(c)
    end_set
    ");
}

#[test]
fn test_left_leaning_chain() {
    let expr = union(union(query("A", "a"), query("B", "b")), query("C", "c"));

    let compiled = render_with(&expr, CompileOptions::default()).unwrap();
    let combinators = count_calls(&compiled.builder, |call| {
        matches!(call, BuilderCall::SetOperation { .. })
    });
    assert_eq!(combinators, 2);
    assert_snapshot!(compiled.builder.trace(), @r"
    from(A, a)
    select(a)
    union
    from(B, b)
    select(b)
    union
    from(C, c)
    select(c)
    end_set
    ");
}

#[test]
fn test_bracket_counts_match_nesting_depth() {
    let innermost = QueryMetadata::set_operand(intersect(query("A", "a"), query("B", "b")));
    let middle = QueryMetadata::set_operand(left_nested_set_operation(
        SetOperationKind::Except,
        innermost,
        query("C", "c"),
    ));
    let expr = left_nested_set_operation(SetOperationKind::Union, middle, query("D", "d"));

    let compiled = render_with(&expr, CompileOptions::default()).unwrap();
    let b = &compiled.builder;
    let opened = count_calls(b, |call| {
        matches!(
            call,
            BuilderCall::StartSet | BuilderCall::SetOperation { start: true, .. }
        )
    });
    let closed = count_calls(b, |call| matches!(call, BuilderCall::EndSetWith));
    assert_eq!(opened, 2);
    assert_eq!(closed, 2);
    assert_eq!(count_calls(b, |call| matches!(call, BuilderCall::EndSet)), 3);
    assert!(b.is_complete());

    assert_snapshot!(b.trace(), @r"
    start_set
    start_set
    from(A, a)
    select(a)
    intersect
    from(B, b)
    select(b)
    end_set_with
    end_set
    except
    from(C, c)
    select(c)
    end_set_with
    end_set
    union
    from(D, d)
    select(d)
    end_set
    ");
}

#[test]
fn test_root_set_operand_orders_final_result() {
    let a = Path::root("A", "a");
    let expr = QueryMetadata::set_operand(union(query("A", "a"), query("B", "b")))
        .order_by(OrderSpecifier::asc(a.get("id", "Long")))
        .limit(10)
        .into_expr();

    assert_snapshot!(trace(&expr), @r"
    from(A, a)
    select(a)
    union
    from(B, b)
    select(b)
    end_set
    order_by(a.id, ASC)
    set_max_results(10)
    ");

    let compiled = render_with(&expr, CompileOptions::default().with_root_modifiers(false)).unwrap();
    assert!(compiled.builder.trace().ends_with("order_by(a.id, ASC)"));
}

#[test]
fn test_operands_never_use_constructor_projection() {
    let a = Path::root("A", "a");
    let b = Path::root("B", "b");
    let lhs = QueryMetadata::new()
        .from(&a)
        .select_tuple(vec![a.get("x", "Integer").into(), a.get("y", "Integer").into()]);
    let rhs = QueryMetadata::new()
        .from(&b)
        .select_tuple(vec![b.get("x", "Integer").into(), b.get("y", "Integer").into()]);

    let out = trace(&union_all(lhs, rhs));
    assert!(!out.contains("select_new"));
    assert!(out.starts_with("from(A, a)\nselect(a.x)\nselect(a.y)\nunion_all"));
}

#[test]
fn test_set_operation_in_where_subquery() {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    let c = Path::root("C", "c");
    let ids = union(
        QueryMetadata::new().from(&a).select(a.get("id", "Long")),
        QueryMetadata::new().from(&c).select(c.get("id", "Long")),
    );
    let query = QueryMetadata::new()
        .from(&b)
        .filter(b.get("id", "Long").in_(ids))
        .select(&b);

    assert_snapshot!(trace(&query.into_expr()), @r"
    from(Base, b)
    where_subqueries(b.id IN generatedSubquery_1)
    with_subquery(generatedSubquery_1)
    from(A, a)
    select(a.id)
    union
    from(C, c)
    select(c.id)
    end_set
    end
    end_subqueries
    select(b)
    ");
}

#[test]
fn test_non_query_operand_is_malformed() {
    let expr = union(query("A", "a"), Expr::constant(1));
    let err = render_with(&expr, CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::MalformedSetOperation(_)));
}

#[test]
fn test_wrong_arity_is_malformed() {
    let expr = Expr::operation(
        Operator::Set(criteria_compiler::expr::SetOperator::new(SetOperationKind::Union)),
        vec![query("A", "a").into_expr()],
    );
    let err = render_with(&expr, CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::MalformedSetOperation(ref msg) if msg.contains("two operands")));
}
