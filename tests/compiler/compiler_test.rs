//! End-to-end tests for `QueryCompiler::render`: subquery placeholders,
//! bindings, labels and operator tables.

use criteria_compiler::prelude::*;
use insta::assert_snapshot;

fn render_with(
    expr: &Expr,
    templates: &JpqlTemplates,
    options: CompileOptions,
) -> CompileResult<CompiledQuery<RecordingBuilder>> {
    let metamodel = StaticMetamodel::new();
    QueryCompiler::new(templates, &metamodel)
        .with_options(options)
        .render(expr, RecordingBuilder::new())
}

fn render(expr: &Expr) -> CompiledQuery<RecordingBuilder> {
    let compiled = render_with(expr, &JpqlTemplates::default(), CompileOptions::default()).unwrap();
    assert!(compiled.builder.is_complete(), "builder left a scope open");
    compiled
}

// ============================================================================
// Subqueries
// ============================================================================

#[test]
fn test_subquery_in_select() {
    let a = Path::root("A", "a");
    let b = Path::root("B", "b");
    let sub = QueryMetadata::new().from(&a).select(a.get("x", "Integer"));
    let query = QueryMetadata::new().from(&b).select(sub).into_expr();

    assert_snapshot!(render(&query).builder.trace(), @r"
    from(B, b)
    select_subqueries(generatedSubquery_1)
    with_subquery(generatedSubquery_1)
    from(A, a)
    select(a.x)
    end
    end_subqueries
    ");
}

#[test]
fn test_correlated_exists_subquery() {
    let b = Path::root("Base", "b");
    let c = Path::root("Child", "c");
    let sub = QueryMetadata::new()
        .from_as(b.collection("children", "Child"), &c)
        .filter(c.get("age", "Integer").gt(10))
        .select(&c);
    let query = QueryMetadata::new().from(&b).filter(exists(sub)).select(&b).into_expr();

    assert_snapshot!(render(&query).builder.trace(), @r"
    from(Base, b)
    where_subqueries(EXISTS (generatedSubquery_1))
    with_subquery(generatedSubquery_1)
    from_path(b.children, c)
    where(c.age > :param_0)
    select(c)
    end
    end_subqueries
    select(b)
    ");
}

#[test]
fn test_subquery_labels_restart_per_clause() {
    let a = Path::root("A", "a");
    let b = Path::root("B", "b");
    let ids = || QueryMetadata::new().from(&a).select(a.get("id", "Long"));
    let query = QueryMetadata::new()
        .from(&b)
        .filter(b.get("id", "Long").in_(ids()))
        .select(ids())
        .into_expr();

    let trace = render(&query).builder.trace();
    assert!(trace.contains("where_subqueries(b.id IN generatedSubquery_1)"));
    assert!(trace.contains("select_subqueries(generatedSubquery_1)"));
    assert!(!trace.contains("generatedSubquery_2"));
}

#[test]
fn test_two_subqueries_in_one_clause() {
    let a = Path::root("A", "a");
    let b = Path::root("B", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .filter(
            exists(QueryMetadata::new().from(&a).select(&a))
                .or(b.get("id", "Long").in_(QueryMetadata::new().from(&a).select(a.get("id", "Long")))),
        )
        .select(&b)
        .into_expr();

    let trace = render(&query).builder.trace();
    let first = trace.find("with_subquery(generatedSubquery_1)").unwrap();
    let second = trace.find("with_subquery(generatedSubquery_2)").unwrap();
    assert!(first < second);
    assert_eq!(trace.matches("end_subqueries").count(), 1);
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn test_tuple_uses_constructor_projection() {
    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .select_tuple(vec![
            b.get("name", "String").into(),
            lower(b.get("email", "String")).alias(&Path::root("String", "mail")),
        ])
        .into_expr();

    assert_snapshot!(render(&query).builder.trace(), @r"
    from(Base, b)
    select_new(2)
    select(b.name)
    select(LOWER(b.email), mail)
    end_select_new
    ");
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn test_constants_and_parameters_are_collected() {
    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .filter(
            b.get("age", "Integer")
                .goe(param("minAge"))
                .and(b.get("name", "String").in_(constant(vec!["x", "y"]))),
        )
        .select(&b)
        .param("minAge", 18)
        .into_expr();

    let compiled = render(&query);
    assert!(compiled
        .builder
        .trace()
        .contains("where(b.age >= :minAge AND b.name IN (:param_0))"));
    assert_eq!(compiled.bindings.value("minAge"), Some(&Value::Int(18)));
    assert_eq!(
        compiled.bindings.value("param_0"),
        Some(&Value::List(vec![Value::from("x"), Value::from("y")]))
    );
}

#[test]
fn test_first_parameter_value_wins() {
    let a = Path::root("A", "a");
    let b = Path::root("B", "b");
    let sub = QueryMetadata::new()
        .from(&a)
        .filter(a.get("age", "Integer").gt(param("minAge")))
        .select(&a)
        .param("minAge", 21);
    let query = QueryMetadata::new()
        .from(&b)
        .filter(exists(sub))
        .select(&b)
        .param("minAge", 18)
        .into_expr();

    let compiled = render(&query);
    assert_eq!(compiled.bindings.parameters.len(), 1);
    assert_eq!(compiled.bindings.value("minAge"), Some(&Value::Int(18)));
}

#[test]
fn test_bindings_replay_as_set_parameter() {
    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .filter(b.get("age", "Integer").gt(18))
        .select(&b)
        .into_expr();

    let mut compiled = render(&query);
    compiled.bindings.apply(&mut compiled.builder).unwrap();
    assert!(compiled.builder.trace().ends_with("select(b)\nset_parameter(param_0, 18)"));
}

// ============================================================================
// Render calls are independent
// ============================================================================

fn sample_query() -> Expr {
    let a = Path::root("A", "a");
    let b = Path::root("Base", "b");
    QueryMetadata::new()
        .from(&b)
        .filter(b.get("age", "Integer").gt(18).and(exists(
            QueryMetadata::new().from(&a).filter(a.get("x", "Integer").eq(1)).select(&a),
        )))
        .select(&b)
        .into_expr()
}

#[test]
fn test_render_is_repeatable() {
    let query = sample_query();
    let before = query.clone();
    let templates = JpqlTemplates::default();
    let metamodel = StaticMetamodel::new();
    let compiler = QueryCompiler::new(&templates, &metamodel);

    let first = compiler.render(&query, RecordingBuilder::new()).unwrap();
    let second = compiler.render(&query, RecordingBuilder::new()).unwrap();
    assert_eq!(first.builder.trace(), second.builder.trace());
    assert_eq!(first.bindings, second.bindings);
    assert_eq!(query, before);
}

#[test]
fn test_concurrent_renders() {
    let query = sample_query();
    let templates = JpqlTemplates::default();
    let metamodel = StaticMetamodel::new();
    let compiler = QueryCompiler::new(&templates, &metamodel);
    let expected = compiler.render(&query, RecordingBuilder::new()).unwrap().builder.trace();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| compiler.render(&query, RecordingBuilder::new()).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().builder.trace(), expected);
        }
    });
}

#[test]
fn test_scopes_are_balanced() {
    let compiled = render(&sample_query());
    let calls = compiled.builder.calls();
    let opened = calls
        .iter()
        .filter(|call| matches!(call, BuilderCall::WithSubquery { .. }))
        .count();
    let closed = calls.iter().filter(|call| matches!(call, BuilderCall::End)).count();
    assert_eq!(opened, closed);
}

// ============================================================================
// Labels and operator tables
// ============================================================================

#[test]
fn test_custom_label_prefixes() {
    let options = CompileOptions::default().with_labels(LabelSettings {
        constant_prefix: "c".to_string(),
        subquery_prefix: "sq".to_string(),
    });
    let compiled = render_with(&sample_query(), &JpqlTemplates::default(), options).unwrap();

    let trace = compiled.builder.trace();
    assert!(trace.contains("where_subqueries(b.age > :c0 AND EXISTS (sq1))"));
    assert!(trace.contains("where(a.x = :c1)"));
    assert_eq!(compiled.bindings.value("c1"), Some(&Value::Int(1)));
}

#[test]
fn test_missing_template_is_unsupported() {
    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .select(lower(b.get("name", "String")))
        .into_expr();
    let mut templates = JpqlTemplates::default();
    templates.remove(Operator::Lower);

    let err = render_with(&query, &templates, CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOperator(ref name) if name == "LOWER"));
}

#[test]
fn test_template_override_from_settings() {
    let settings = CompilerSettings::from_toml_str(
        r#"
        [templates.CONCAT]
        pattern = "{0} || {1}"
        precedence = 30
        "#,
    )
    .unwrap();
    let templates = JpqlTemplates::from_settings(&settings).unwrap();

    let b = Path::root("Base", "b");
    let query = QueryMetadata::new()
        .from(&b)
        .select(b.get("first", "String").concat(b.get("last", "String")))
        .into_expr();
    let compiled = render_with(&query, &templates, CompileOptions::from_settings(&settings)).unwrap();
    assert_eq!(compiled.builder.trace(), "from(Base, b)\nselect(b.first || b.last)");
}

#[test]
fn test_non_query_root_is_rejected() {
    let b = Path::root("Base", "b");
    let err = render_with(&b.into(), &JpqlTemplates::default(), CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
}
