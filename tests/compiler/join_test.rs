//! Integration tests for join rendering.

use criteria_compiler::prelude::*;
use insta::assert_snapshot;

fn render(query: QueryMetadata) -> CompileResult<CompiledQuery<RecordingBuilder>> {
    let templates = JpqlTemplates::default();
    let metamodel = StaticMetamodel::new();
    QueryCompiler::new(&templates, &metamodel).render(&query.into_expr(), RecordingBuilder::new())
}

fn trace(query: QueryMetadata) -> String {
    let compiled = render(query).unwrap();
    assert!(compiled.builder.is_complete(), "builder left a scope open");
    compiled.builder.trace()
}

// ============================================================================
// Path joins
// ============================================================================

#[test]
fn test_default_join_on_treated_collection() {
    let b = Path::root("Base", "b");
    let s1 = Path::root("Sub1", "s1");
    let query = QueryMetadata::new()
        .from(&b)
        .join(JoinExpression::left(b.collection("children", "Child").treat("Sub1")).with_alias(&s1))
        .select(s1.get("value", "Integer"));

    assert_snapshot!(trace(query), @r"
    from(Base, b)
    join_default(TREAT(b.children AS Sub1), s1, LEFT)
    select(s1.value)
    ");
}

#[test]
fn test_join_count_and_root_alias() {
    let b = Path::root("Base", "b");
    let owner = Path::root("Person", "o");
    let query = QueryMetadata::new()
        .from(&b)
        .join(JoinExpression::inner(b.get("owner", "Person")).with_alias(&owner))
        .join(JoinExpression::left(b.collection("children", "Child")))
        .select(&b);
    let joins = query.joins.len();

    let compiled = render(query).unwrap();
    let calls = compiled.builder.calls();
    let rendered = calls
        .iter()
        .filter(|call| {
            matches!(
                call,
                BuilderCall::FromEntity { .. } | BuilderCall::JoinDefault { .. }
            )
        })
        .count();
    assert_eq!(rendered, joins);
    assert!(matches!(&calls[0], BuilderCall::FromEntity { alias, .. } if alias == "b"));
}

#[test]
fn test_implicit_alias_and_fetch() {
    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .join(JoinExpression::inner(b.get("owner", "Person")).fetch())
        .select(&b);

    assert_snapshot!(trace(query), @r"
    from(Base, b)
    join_default(b.owner, owner, INNER, fetch)
    select(b)
    ");
}

#[test]
fn test_association_join_with_condition() {
    let b = Path::root("Base", "b");
    let ch = Path::root("Child", "ch");
    let query = QueryMetadata::new()
        .from(&b)
        .join(
            JoinExpression::left(b.collection("children", "Child"))
                .with_alias(&ch)
                .on(ch.get("age", "Integer").gt(3)),
        )
        .select(ch.get("name", "String"));

    let compiled = render(query).unwrap();
    assert_snapshot!(compiled.builder.trace(), @r"
    from(Base, b)
    join_on_path(b.children, ch, LEFT)
    on(ch.age > :param_0)
    select(ch.name)
    ");
    assert_eq!(compiled.bindings.value("param_0"), Some(&Value::Int(3)));
}

#[test]
fn test_fetch_with_condition_is_dropped() {
    let b = Path::root("Base", "b");
    let ch = Path::root("Child", "ch");
    let query = QueryMetadata::new()
        .from(&b)
        .join(
            JoinExpression::left(b.collection("children", "Child"))
                .with_alias(&ch)
                .on(ch.get("age", "Integer").gt(3))
                .fetch(),
        )
        .select(&b);

    let out = trace(query);
    assert!(out.contains("join_on_path(b.children, ch, LEFT)"));
    assert!(!out.contains("fetch"));
}

// ============================================================================
// Entity joins
// ============================================================================

#[test]
fn test_entity_join_single_root() {
    let a = Path::root("A", "a");
    let c = Path::root("C", "c");
    let query = QueryMetadata::new()
        .from(&a)
        .join(JoinExpression::left(&c).on(c.get("aId", "Long").eq(a.get("id", "Long"))))
        .select(&a);

    assert_snapshot!(trace(query), @r"
    from(A, a)
    join_on(C, c, LEFT)
    on(c.aId = a.id)
    select(a)
    ");
}

#[test]
fn test_entity_join_anchors_on_root_with_multiple_roots() {
    let a = Path::root("A", "a");
    let b2 = Path::root("B", "b2");
    let c = Path::root("C", "c");
    let query = QueryMetadata::new()
        .from(&a)
        .from(&b2)
        .join(JoinExpression::inner(&c).on(c.get("x", "Integer").eq(a.get("x", "Integer"))))
        .select(&c);

    assert_snapshot!(trace(query), @r"
    from(A, a)
    from(B, b2)
    join_on(a, C, c, INNER)
    on(c.x = a.x)
    select(c)
    ");
}

#[test]
fn test_entity_join_requires_condition() {
    let a = Path::root("A", "a");
    let c = Path::root("C", "c");
    let query = QueryMetadata::new()
        .from(&a)
        .join(JoinExpression::inner(&c))
        .select(&a);

    let err = render(query).unwrap_err();
    assert!(matches!(err, CompileError::MalformedJoin(ref msg) if msg.contains("no on-clause")));
}

#[test]
fn test_entity_join_without_root_is_malformed() {
    let c = Path::root("C", "c");
    let query = QueryMetadata::new()
        .join(JoinExpression::inner(&c).on(c.get("x", "Integer").is_null()))
        .select(&c);

    let err = render(query).unwrap_err();
    assert!(matches!(err, CompileError::MalformedJoin(ref msg) if msg.contains("explicit base node")));
}

#[test]
fn test_explicit_default_rejects_condition() {
    let b = Path::root("Base", "b");
    let ch = Path::root("Child", "ch");
    let query = QueryMetadata::new()
        .from(&b)
        .join(
            JoinExpression::left(b.collection("children", "Child"))
                .with_alias(&ch)
                .explicit_default()
                .on(ch.get("age", "Integer").gt(3)),
        )
        .select(&b);

    assert!(matches!(render(query), Err(CompileError::MalformedJoin(_))));
}

#[test]
fn test_conditional_association_join_needs_alias() {
    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .join(
            JoinExpression::left(b.collection("children", "Child"))
                .on(b.get("active", "Boolean").eq(true)),
        )
        .select(&b);

    let err = render(query).unwrap_err();
    assert!(matches!(err, CompileError::MalformedJoin(ref msg) if msg.contains("explicit alias")));
}

#[test]
fn test_correlated_root_outside_subquery() {
    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(b.collection("children", "Child"))
        .select(&b);

    assert!(matches!(render(query), Err(CompileError::MalformedJoin(_))));
}

// ============================================================================
// Values and subquery sources
// ============================================================================

#[test]
fn test_values_root() {
    let v = Path::root("Integer", "v");
    let query = QueryMetadata::new()
        .from(ValuesSource::new("Integer", "v", vec![Value::from(1), Value::from(2)]))
        .select(&v);

    assert_snapshot!(trace(query), @r"
    from_values(Integer, v, [1, 2])
    select(v)
    ");
}

#[test]
fn test_identifiable_values_with_attribute() {
    let v = Path::root("Cat", "v");
    let query = QueryMetadata::new()
        .from(ValuesSource::new("Cat", "v", vec![Value::from(7)]).attribute("id").identifiable())
        .select(&v);

    assert_snapshot!(trace(query), @r"
    from_identifiable_values(Cat.id, v, [7])
    select(v)
    ");
}

#[test]
fn test_subquery_root() {
    let a = Path::root("A", "a");
    let s = Path::root("Summary", "s");
    let body = QueryMetadata::new()
        .from(&a)
        .select(a.get("name", "String").bind(&s.get("name", "String")));
    let query = QueryMetadata::new().from_as(body, &s).select(s.get("name", "String"));

    assert_snapshot!(trace(query), @r"
    from_subquery(Summary, s)
    from(A, a)
    bind(name)
    select(a.name)
    end
    select(s.name)
    ");
}

#[test]
fn test_subquery_join_on_condition() {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    let s = Path::root("Summary", "s");
    let body = QueryMetadata::new()
        .from(&a)
        .group_by(vec![a.get("owner", "Person").into()])
        .select_tuple(vec![
            a.get("owner", "Person").bind(&s.get("owner", "Person")),
            count(&a).bind(&s.get("total", "Long")),
        ]);
    let query = QueryMetadata::new()
        .from(&b)
        .join(
            JoinExpression::left(body)
                .with_alias(&s)
                .on(s.get("owner", "Person").eq(&b)),
        )
        .select(&b);

    assert_snapshot!(trace(query), @r"
    from(Base, b)
    join_on_subquery(Summary, s, LEFT)
    from(A, a)
    group_by(a.owner)
    bind(owner)
    select(a.owner)
    bind(total)
    select(COUNT(a))
    end
    on(s.owner = b)
    select(b)
    ");
}

#[test]
fn test_lateral_join_on_correlated_collection() {
    let b = Path::root("Base", "b");
    let c = Path::root("Child", "c");
    let l = Path::root("Latest", "l");
    let body = QueryMetadata::new()
        .from_as(b.collection("children", "Child"), &c)
        .select(c.get("value", "Integer").bind(&l.get("value", "Integer")))
        .order_by(OrderSpecifier::desc(c.get("value", "Integer")))
        .limit(1);
    let query = QueryMetadata::new()
        .from(&b)
        .join(JoinExpression::left(body).with_alias(&l).lateral())
        .select(l.get("value", "Integer"));

    assert_snapshot!(trace(query), @r"
    from(Base, b)
    join_lateral_subquery(b.children, c, l, LEFT)
    bind(value)
    select(c.value)
    order_by(c.value, DESC)
    set_max_results(1)
    end
    select(l.value)
    ");
}

#[test]
fn test_lateral_join_on_entity_with_condition() {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    let l = Path::root("Top", "l");
    let body = QueryMetadata::new()
        .from(&a)
        .filter(a.get("baseId", "Long").eq(b.get("id", "Long")))
        .select(a.get("id", "Long").bind(&l.get("id", "Long")));
    let query = QueryMetadata::new()
        .from(&b)
        .join(
            JoinExpression::inner(body)
                .with_alias(&l)
                .lateral()
                .on(l.get("id", "Long").is_not_null()),
        )
        .select(&b);

    assert_snapshot!(trace(query), @r"
    from(Base, b)
    join_lateral_on_subquery(Top, l, INNER)
    from(A, a)
    where(a.baseId = b.id)
    bind(id)
    select(a.id)
    end
    on(l.id IS NOT NULL)
    select(b)
    ");
}

#[test]
fn test_subquery_join_requires_condition_or_lateral() {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    let s = Path::root("Summary", "s");
    let body = QueryMetadata::new()
        .from(&a)
        .select(a.get("id", "Long").bind(&s.get("id", "Long")));
    let query = QueryMetadata::new()
        .from(&b)
        .join(JoinExpression::left(body).with_alias(&s))
        .select(&b);

    let err = render(query).unwrap_err();
    assert!(matches!(err, CompileError::MalformedJoin(ref msg) if msg.contains("no on-clause")));
}

#[test]
fn test_subquery_join_on_association_needs_lateral() {
    let b = Path::root("Base", "b");
    let c = Path::root("Child", "c");
    let s = Path::root("Summary", "s");
    let body = QueryMetadata::new()
        .from_as(b.collection("children", "Child"), &c)
        .select(c.get("id", "Long").bind(&s.get("id", "Long")));
    let query = QueryMetadata::new()
        .from(&b)
        .join(
            JoinExpression::left(body)
                .with_alias(&s)
                .on(s.get("id", "Long").is_not_null()),
        )
        .select(&b);

    let err = render(query).unwrap_err();
    assert!(matches!(err, CompileError::MalformedJoin(ref msg) if msg.contains("entity join to association")));
}

#[test]
fn test_subquery_join_requires_alias() {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    let body = QueryMetadata::new().from(&a).select(&a);
    let query = QueryMetadata::new()
        .from(&b)
        .join(JoinExpression::left(body).lateral())
        .select(&b);

    assert!(matches!(render(query), Err(CompileError::MalformedJoin(_))));
}
