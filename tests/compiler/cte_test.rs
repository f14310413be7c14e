//! Integration tests for the CTE pre-pass and CTE column binding.

use std::sync::Arc;

use criteria_compiler::prelude::*;
use criteria_compiler::query::QueryFlag;
use insta::assert_snapshot;

fn render_with(
    query: QueryMetadata,
    metamodel: &StaticMetamodel,
) -> CompileResult<CompiledQuery<RecordingBuilder>> {
    let templates = JpqlTemplates::default();
    QueryCompiler::new(&templates, metamodel).render(&query.into_expr(), RecordingBuilder::new())
}

fn render(query: QueryMetadata) -> CompileResult<CompiledQuery<RecordingBuilder>> {
    render_with(query, &StaticMetamodel::new())
}

fn trace(query: QueryMetadata) -> String {
    let compiled = render(query).unwrap();
    assert!(compiled.builder.is_complete(), "builder left a scope open");
    compiled.builder.trace()
}

// ============================================================================
// Plain CTEs
// ============================================================================

#[test]
fn test_cte_rendered_before_main_query() {
    let a = Path::root("A", "a");
    let c = Path::root("Cte", "c");
    let body = QueryMetadata::new()
        .from(&a)
        .select_tuple(vec![a.get("x", "Integer").into(), a.get("y", "Integer").into()]);
    let query = QueryMetadata::new()
        .with(CteDeclaration::new(
            &c,
            vec![c.get("x", "Integer"), c.get("y", "Integer")],
            body,
        ))
        .from(&c)
        .select(c.get("x", "Integer"));

    assert_snapshot!(trace(query), @r"
    with(Cte)
    from(A, a)
    bind(x)
    select(a.x)
    bind(y)
    select(a.y)
    end
    from(Cte, c)
    select(c.x)
    ");
}

#[test]
fn test_explicit_bind_overrides_position() {
    let a = Path::root("A", "a");
    let c = Path::root("Cte", "c");
    let body = QueryMetadata::new().from(&a).select_tuple(vec![
        a.get("x", "Integer").into(),
        a.get("y", "Integer").bind(&c.get("z", "Integer")),
        a.get("w", "Integer").alias(&Path::root("Integer", "ww")).bind(&c.get("w", "Integer")),
    ]);
    let query = QueryMetadata::new()
        .with(CteDeclaration::new(
            &c,
            vec![c.get("x", "Integer"), c.get("y", "Integer")],
            body,
        ))
        .from(&c)
        .select(&c);

    let out = trace(query);
    assert!(out.contains("bind(x)\nselect(a.x)\nbind(z)\nselect(a.y)\nbind(w)\nselect(a.w, ww)\nend"));
}

#[test]
fn test_whole_entity_expands_to_attribute_binds() {
    let metamodel = StaticMetamodel::new().with_entity(
        "Cat",
        vec![
            AttributeInfo::new("id"),
            AttributeInfo::new("name"),
            AttributeInfo::new("ownerId").columns(&["owner_id"]),
            AttributeInfo::new("owner.id").columns(&["owner_id"]),
            AttributeInfo::new("kittens").association(),
        ],
    );
    let k = Path::root("Cat", "k");
    let c = Path::root("CatCte", "c");
    let query = QueryMetadata::new()
        .with(CteDeclaration::new(
            &c,
            vec![],
            QueryMetadata::new().from(&k).select(&k),
        ))
        .from(&c)
        .select(c.get("name", "String"));

    let compiled = render_with(query, &metamodel).unwrap();
    assert_snapshot!(compiled.builder.trace(), @r"
    with(CatCte)
    from(Cat, k)
    bind(id)
    select(k.id)
    bind(name)
    select(k.name)
    bind(ownerId)
    select(k.ownerId)
    end
    from(CatCte, c)
    select(c.name)
    ");
}

#[test]
fn test_whole_entity_without_attributes_is_malformed() {
    let k = Path::root("Cat", "k");
    let c = Path::root("CatCte", "c");
    let query = QueryMetadata::new()
        .with(CteDeclaration::new(
            &c,
            vec![],
            QueryMetadata::new().from(&k).select(&k),
        ))
        .from(&c)
        .select(&c);

    assert!(matches!(
        render(query),
        Err(CompileError::MalformedCteProjection(_))
    ));
}

#[test]
fn test_unbound_select_item_is_malformed() {
    let a = Path::root("A", "a");
    let c = Path::root("Cte", "c");
    let body = QueryMetadata::new()
        .from(&a)
        .select_tuple(vec![a.get("x", "Integer").into(), a.get("y", "Integer").into()]);
    let query = QueryMetadata::new()
        .with(CteDeclaration::new(&c, vec![c.get("x", "Integer")], body))
        .from(&c)
        .select(&c);

    let err = render(query).unwrap_err();
    assert!(matches!(err, CompileError::MalformedCteProjection(ref msg) if msg.contains("select item 1")));
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn test_nested_declaration_rendered_first() {
    let a = Path::root("A", "a");
    let i = Path::root("Inner", "i");
    let o = Path::root("Outer", "o");
    let inner = CteDeclaration::new(
        &i,
        vec![i.get("id", "Long")],
        QueryMetadata::new().from(&a).select(a.get("id", "Long")),
    );
    let outer = CteDeclaration::new(
        &o,
        vec![o.get("id", "Long")],
        QueryMetadata::new().with(inner).from(&i).select(i.get("id", "Long")),
    );
    let query = QueryMetadata::new().with(outer).from(&o).select(&o);

    assert_snapshot!(trace(query), @r"
    with(Inner)
    from(A, a)
    bind(id)
    select(a.id)
    end
    with(Outer)
    from(Inner, i)
    bind(id)
    select(i.id)
    end
    from(Outer, o)
    select(o)
    ");
}

#[test]
fn test_shared_declaration_rendered_once() {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    let c = Path::root("Cte", "c");
    let cte = Arc::new(CteDeclaration::new(
        &c,
        vec![c.get("id", "Long")],
        QueryMetadata::new().from(&a).select(a.get("id", "Long")),
    ));
    let sub = QueryMetadata::new()
        .with_flag(QueryFlag::With(Arc::clone(&cte)))
        .from(&c)
        .select(c.get("id", "Long"));
    let query = QueryMetadata::new()
        .with_flag(QueryFlag::With(cte))
        .from(&b)
        .filter(b.get("id", "Long").in_(sub))
        .select(&b);

    let out = trace(query);
    assert_eq!(out.matches("with(Cte)").count(), 1);
    assert!(out.starts_with("with(Cte)"));
}

#[test]
fn test_declaration_inside_where_subquery_is_hoisted() {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    let c = Path::root("Cte", "c");
    let sub = QueryMetadata::new()
        .with(CteDeclaration::new(
            &c,
            vec![c.get("id", "Long")],
            QueryMetadata::new().from(&a).select(a.get("id", "Long")),
        ))
        .from(&c)
        .select(c.get("id", "Long"));
    let query = QueryMetadata::new()
        .from(&b)
        .filter(exists(sub))
        .select(&b);

    assert_snapshot!(trace(query), @r"
    with(Cte)
    from(A, a)
    bind(id)
    select(a.id)
    end
    from(Base, b)
    where_subqueries(EXISTS (generatedSubquery_1))
    with_subquery(generatedSubquery_1)
    from(Cte, c)
    select(c.id)
    end
    end_subqueries
    select(b)
    ");
}

// ============================================================================
// Recursive CTEs
// ============================================================================

fn tree_terms() -> (Path, Vec<Path>, QueryMetadata, QueryMetadata) {
    let t = Path::root("Tree", "t");
    let n = Path::root("Node", "n");
    let n2 = Path::root("Node", "n2");
    let columns = vec![t.get("id", "Long"), t.get("name", "String")];
    let base = QueryMetadata::new()
        .from(&n)
        .filter(n.get("parent", "Node").is_null())
        .select_tuple(vec![n.get("id", "Long").into(), n.get("name", "String").into()]);
    let recursive = QueryMetadata::new()
        .from(&n2)
        .join(
            JoinExpression::inner(&t)
                .on(t.get("id", "Long").eq(n2.get("parent", "Node").get("id", "Long"))),
        )
        .select_tuple(vec![n2.get("id", "Long").into(), n2.get("name", "String").into()]);
    (t, columns, base, recursive)
}

#[test]
fn test_recursive_cte_order() {
    let (t, columns, base, recursive) = tree_terms();
    let query = QueryMetadata::new()
        .with(CteDeclaration::recursive(&t, columns, union_all(base, recursive)))
        .from(&t)
        .select(t.get("name", "String"));

    assert_snapshot!(trace(query), @r"
    with_recursive(Tree)
    from(Node, n)
    where(n.parent IS NULL)
    bind(id)
    select(n.id)
    bind(name)
    select(n.name)
    union_all
    from(Node, n2)
    join_on(Tree, t, INNER)
    on(t.id = n2.parent.id)
    bind(id)
    select(n2.id)
    bind(name)
    select(n2.name)
    end
    from(Tree, t)
    select(t.name)
    ");
}

#[test]
fn test_recursive_body_as_set_operand() {
    let (t, columns, base, recursive) = tree_terms();
    let body = QueryMetadata::set_operand(union(base, recursive));
    let query = QueryMetadata::new()
        .with(CteDeclaration::recursive(&t, columns, body))
        .from(&t)
        .select(&t);

    let out = trace(query);
    assert!(out.starts_with("with_recursive(Tree)\nfrom(Node, n)"));
    assert!(out.contains("select(n.name)\nunion\nfrom(Node, n2)"));
}

#[test]
fn test_recursive_cte_rejects_intersect() {
    let (t, columns, base, recursive) = tree_terms();
    let query = QueryMetadata::new()
        .with(CteDeclaration::recursive(&t, columns, intersect(base, recursive)))
        .from(&t)
        .select(&t);

    let err = render(query).unwrap_err();
    assert!(matches!(err, CompileError::MalformedRecursiveCte(ref msg) if msg.contains("INTERSECT")));
}

#[test]
fn test_recursive_cte_rejects_plain_body() {
    let (t, columns, base, _) = tree_terms();
    let query = QueryMetadata::new()
        .with(CteDeclaration::recursive(&t, columns, base))
        .from(&t)
        .select(&t);

    assert!(matches!(
        render(query),
        Err(CompileError::MalformedRecursiveCte(_))
    ));
}

#[test]
fn test_recursive_cte_rejects_nested_term() {
    let (t, columns, base, recursive) = tree_terms();
    let nested = QueryMetadata::set_operand(union(recursive.clone(), recursive));
    let query = QueryMetadata::new()
        .with(CteDeclaration::recursive(&t, columns, union(base, nested)))
        .from(&t)
        .select(&t);

    assert!(matches!(
        render(query),
        Err(CompileError::MalformedRecursiveCte(_))
    ));
}
