use std::collections::HashSet;

use chrono::NaiveDate;

use crate::errors::{ValidationIssue, ValidationReport};
use crate::model::{
    FieldManifest, FieldValue, GeneratorSpec, HookManifest, RegistryManifest, SchemaManifest,
    SequenceManifest,
};

/// Date format accepted by `date` generators.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Check names and cross references before anything is registered.
pub fn validate_manifest(manifest: &RegistryManifest) -> ValidationReport {
    let mut report = ValidationReport::default();

    let globals = validate_sequences(&manifest.sequences, "/sequences", &mut report);

    let mut dictionaries = HashSet::new();
    for (idx, name) in manifest.dictionaries.iter().enumerate() {
        if !dictionaries.insert(name.as_str()) {
            report.push(ValidationIssue::error(
                "duplicate_dictionary",
                format!("/dictionaries/{idx}"),
                format!("global dictionary '{name}' is declared twice"),
            ));
        }
    }

    let template_names: HashSet<&str> = manifest
        .templates
        .iter()
        .map(|template| template.name.as_str())
        .collect();
    let mut seen = HashSet::new();
    for (idx, template) in manifest.templates.iter().enumerate() {
        let path = format!("/templates/{idx}");
        if template.name.trim().is_empty() {
            report.push(ValidationIssue::error(
                "empty_name",
                format!("{path}/name"),
                "template name is empty",
            ));
        } else if !seen.insert(template.name.as_str()) {
            report.push(ValidationIssue::error(
                "duplicate_template",
                format!("{path}/name"),
                format!("template '{}' is declared twice", template.name),
            ));
        }
        validate_template(template, &path, &template_names, &globals, &mut report);
    }

    report
}

fn validate_template(
    template: &SchemaManifest,
    path: &str,
    template_names: &HashSet<&str>,
    globals: &HashSet<&str>,
    report: &mut ValidationReport,
) {
    let mut fields = HashSet::new();
    let mut invocable = HashSet::new();
    let groups = [("items", &template.items), ("subtemplates", &template.subtemplates)];
    for (group, declared) in groups {
        for (idx, field) in declared.iter().enumerate() {
            let field_path = format!("{path}/{group}/{idx}");
            if field.name.trim().is_empty() {
                report.push(ValidationIssue::error(
                    "empty_name",
                    format!("{field_path}/name"),
                    "field name is empty",
                ));
                continue;
            }
            if !fields.insert(field.name.as_str()) {
                report.push(ValidationIssue::error(
                    "duplicate_field",
                    format!("{field_path}/name"),
                    format!("field '{}' is declared twice in '{}'", field.name, template.name),
                ));
            }
            invocable.extend(invocable_names(field));
        }
    }

    for (idx, field) in template.subtemplates.iter().enumerate() {
        if field.fallback.is_some() {
            report.push(ValidationIssue::warning(
                "ignored_fallback",
                format!("{path}/subtemplates/{idx}/fallback"),
                format!("subtemplate field '{}' never uses a fallback value", field.name),
            ));
        }
        let resolvable = field_targets(field)
            .iter()
            .any(|target| template_names.contains(target));
        if !resolvable {
            report.push(
                ValidationIssue::warning(
                    "external_template",
                    format!("{path}/subtemplates/{idx}"),
                    format!(
                        "subtemplate field '{}' targets a template outside this manifest",
                        field.name
                    ),
                )
                .with_hint("register the target template before building"),
            );
        }
    }

    let locals = validate_sequences(&template.sequences, &format!("{path}/sequences"), report);

    let mut dictionaries = HashSet::new();
    for (idx, dictionary) in template.dictionaries.iter().enumerate() {
        if !dictionaries.insert(dictionary.name.as_str()) {
            report.push(ValidationIssue::error(
                "duplicate_dictionary",
                format!("{path}/dictionaries/{idx}"),
                format!("dictionary '{}' is declared twice", dictionary.name),
            ));
        }
    }

    for (preset, assignments) in &template.presets {
        for (field, value) in assignments {
            let value_path = format!("{path}/presets/{preset}/{field}");
            if !invocable.contains(field.as_str()) {
                report.push(ValidationIssue::error(
                    "unknown_field",
                    value_path.clone(),
                    format!("preset '{preset}' sets undeclared field '{field}'"),
                ));
            }
            if let FieldValue::Sequence(reference) = value {
                let declared = if reference.global {
                    globals.contains(reference.sequence.as_str())
                } else {
                    locals.contains(reference.sequence.as_str())
                };
                if !declared {
                    report.push(ValidationIssue::error(
                        "unknown_sequence",
                        value_path,
                        format!("sequence '{}' is not declared", reference.sequence),
                    ));
                }
            }
        }
    }

    let hooks = [("before", &template.before), ("after", &template.after)];
    for (stage, declared) in hooks {
        validate_hooks(template, stage, declared, path, report);
    }
}

fn validate_hooks(
    template: &SchemaManifest,
    stage: &str,
    hooks: &[HookManifest],
    path: &str,
    report: &mut ValidationReport,
) {
    for (idx, hook) in hooks.iter().enumerate() {
        if !template.presets.contains_key(&hook.preset) {
            report.push(ValidationIssue::error(
                "unknown_preset",
                format!("{path}/{stage}/{idx}/preset"),
                format!(
                    "{stage} hook references missing preset '{}' of '{}'",
                    hook.preset, template.name
                ),
            ));
        }
    }
}

fn validate_sequences<'a>(
    sequences: &'a [SequenceManifest],
    path: &str,
    report: &mut ValidationReport,
) -> HashSet<&'a str> {
    let mut names = HashSet::new();
    for (idx, sequence) in sequences.iter().enumerate() {
        if !names.insert(sequence.name.as_str()) {
            report.push(ValidationIssue::error(
                "duplicate_sequence",
                format!("{path}/{idx}/name"),
                format!("sequence '{}' is declared twice", sequence.name),
            ));
        }
        if let GeneratorSpec::Date { start } = &sequence.generator {
            if NaiveDate::parse_from_str(start, DATE_FORMAT).is_err() {
                report.push(
                    ValidationIssue::error(
                        "invalid_date",
                        format!("{path}/{idx}/generator/start"),
                        format!("'{start}' is not a date"),
                    )
                    .with_hint("use YYYY-MM-DD"),
                );
            }
        }
    }
    names
}

fn invocable_names(field: &FieldManifest) -> Vec<&str> {
    let options = &field.options;
    [Some(field.name.as_str()), options.alias.as_deref(), options.singular.as_deref()]
        .into_iter()
        .flatten()
        .collect()
}

fn field_targets(field: &FieldManifest) -> Vec<&str> {
    let options = &field.options;
    [
        Some(options.template.as_deref().unwrap_or(&field.name)),
        options.singular.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect()
}
