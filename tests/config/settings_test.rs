//! Settings loading and the collaborators built from it.

use std::fs;

use criteria_compiler::config::SettingsError;
use criteria_compiler::prelude::*;

const SETTINGS: &str = r#"
[labels]
constant_prefix = "p"
subquery_prefix = "sub"

[rendering]
apply_root_modifiers = false
wrap_collection_constants = false

[templates.LOWER]
pattern = "lcase({0})"

[entities.Person]
attributes = [
    { path = "id", columns = ["id"] },
    { path = "name", columns = ["name"] },
    { path = "employer", association = true, columns = ["employer_id"] },
]
"#;

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("criteria-settings-{}.toml", std::process::id()));
    fs::write(&path, SETTINGS).unwrap();
    let settings = CompilerSettings::from_file(&path);
    fs::remove_file(&path).unwrap();

    let settings = settings.unwrap();
    assert_eq!(settings.labels.constant_prefix, "p");
    assert_eq!(settings.labels.subquery_prefix, "sub");
    assert!(!settings.rendering.apply_root_modifiers);
    assert!(!settings.rendering.wrap_collection_constants);
    assert_eq!(settings.templates["LOWER"].pattern, "lcase({0})");
}

#[test]
fn test_missing_file() {
    let path = std::env::temp_dir().join("criteria-settings-does-not-exist.toml");
    let err = CompilerSettings::from_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::FileNotFound(ref missing) if missing == &path));
}

#[test]
fn test_malformed_toml() {
    let err = CompilerSettings::from_toml_str("[labels\nconstant_prefix = 1").unwrap_err();
    assert!(matches!(err, SettingsError::ParseError(_)));
}

#[test]
fn test_unknown_operator_override() {
    let settings = CompilerSettings::from_toml_str(
        r#"
        [templates.SOUNDEX]
        pattern = "SOUNDEX({0})"
        "#,
    )
    .unwrap();
    let err = JpqlTemplates::from_settings(&settings).unwrap_err();
    assert!(matches!(err, SettingsError::UnknownOperator(ref name) if name == "SOUNDEX"));
}

#[test]
fn test_entities_feed_the_metamodel() {
    let settings = CompilerSettings::from_toml_str(SETTINGS).unwrap();
    let metamodel = StaticMetamodel::from_settings(&settings);

    let paths: Vec<String> = metamodel
        .attributes("Person")
        .into_iter()
        .map(|attribute| attribute.path)
        .collect();
    assert_eq!(paths, vec!["id", "name", "employer"]);
    assert!(metamodel.attributes("Unknown").is_empty());
}

#[test]
fn test_settings_drive_a_render() {
    let settings = CompilerSettings::from_toml_str(SETTINGS).unwrap();
    let templates = JpqlTemplates::from_settings(&settings).unwrap();
    let metamodel = StaticMetamodel::from_settings(&settings);

    let p = Path::root("Person", "p");
    let query = QueryMetadata::new()
        .from(&p)
        .filter(p.get("id", "Long").in_(constant(vec![1, 2])))
        .select(lower(p.get("name", "String")))
        .limit(5)
        .into_expr();

    let compiled = QueryCompiler::new(&templates, &metamodel)
        .with_options(CompileOptions::from_settings(&settings))
        .render(&query, RecordingBuilder::new())
        .unwrap();

    assert_eq!(
        compiled.builder.trace(),
        "from(Person, p)\nwhere(p.id IN :p0)\nselect(lcase(p.name))"
    );
}
