use serde_json::json;

use fixtory::Registry;
use fixtory_manifest::{
    IssueSeverity, ManifestError, RegistryManifest, apply, from_json_str, manifest_json_schema,
    validate_manifest,
};

fn manifest(source: serde_json::Value) -> RegistryManifest {
    from_json_str(&source.to_string()).expect("parse manifest")
}

#[test]
fn broken_references_are_reported_with_paths() {
    let manifest = manifest(json!({
        "templates": [
            {
                "name": "widget",
                "items": [{ "name": "color" }, { "name": "color" }],
                "sequences": [
                    { "name": "made_on", "generator": { "kind": "date", "start": "yesterday" } }
                ],
                "presets": {
                    "painted": {
                        "colour": "red",
                        "color": { "$sequence": "paint_codes" }
                    }
                },
                "before": [{ "preset": "varnished" }]
            },
            { "name": "widget" }
        ]
    }));

    let report = validate_manifest(&manifest);
    assert!(!report.is_ok());
    for code in [
        "duplicate_field",
        "invalid_date",
        "unknown_field",
        "unknown_sequence",
        "unknown_preset",
        "duplicate_template",
    ] {
        assert!(report.has_code(code), "missing issue {code}");
    }

    let unknown_field = report
        .errors
        .iter()
        .find(|issue| issue.code == "unknown_field")
        .expect("unknown_field issue");
    assert_eq!(unknown_field.path, "/templates/0/presets/painted/colour");
    assert_eq!(unknown_field.severity, IssueSeverity::Error);
}

#[test]
fn external_subtemplates_only_warn() {
    let manifest = manifest(json!({
        "templates": [{
            "name": "order",
            "subtemplates": [{ "name": "lines", "collection": "list", "fallback": 1 }]
        }]
    }));

    let report = validate_manifest(&manifest);
    assert!(report.is_ok());
    assert!(report.has_code("external_template"));
    assert!(report.has_code("ignored_fallback"));
    assert!(
        report
            .warnings
            .iter()
            .all(|issue| issue.severity == IssueSeverity::Warning)
    );
}

#[test]
fn invalid_manifests_register_nothing() {
    let manifest = manifest(json!({
        "sequences": [{ "name": "ids", "generator": { "kind": "int" } }],
        "templates": [
            { "name": "good" },
            { "name": "bad", "before": [{ "preset": "missing" }] }
        ]
    }));

    let mut registry = Registry::new();
    let result = apply(&manifest, &mut registry);
    assert!(matches!(result, Err(ManifestError::Invalid(report)) if report.has_code("unknown_preset")));
    assert!(!registry.contains("good"));
    assert!(registry.sequence("ids").is_none());
}

#[test]
fn malformed_documents_fail_to_parse() {
    assert!(matches!(
        from_json_str("{ \"templates\": [{ \"items\": [] }] }"),
        Err(ManifestError::Json(_))
    ));
    assert!(matches!(
        fixtory_manifest::from_toml_str("templates = 3"),
        Err(ManifestError::Toml(_))
    ));
}

#[test]
fn json_schema_describes_the_manifest() {
    let schema = serde_json::to_value(manifest_json_schema()).expect("serialize schema");
    let definitions = schema["definitions"].as_object().expect("definitions");
    for name in ["SchemaManifest", "FieldManifest", "GeneratorSpec", "FieldValue", "SequenceRef"] {
        assert!(definitions.contains_key(name), "missing definition {name}");
    }
    assert_eq!(schema["title"], json!("RegistryManifest"));
}
