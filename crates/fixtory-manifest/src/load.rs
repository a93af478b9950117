use std::fs;
use std::path::Path;
use std::rc::Rc;

use chrono::NaiveDate;
use tracing::{info, warn};

use fixtory::generators::{counter_date, counter_email, counter_int, counter_uuid, formatted};
use fixtory::{
    GenerateOptions, Params, Registry, Schema, SequenceOptions, Template, Value,
};
use indexmap::IndexMap;

use crate::errors::{ManifestError, Result, ValidationIssue, ValidationReport};
use crate::model::{FieldValue, GeneratorSpec, RegistryManifest, SchemaManifest, SequenceManifest};
use crate::validate::{DATE_FORMAT, validate_manifest};

type Generator = Box<dyn Fn(i64, &Params) -> Value>;

pub fn from_json_str(source: &str) -> Result<RegistryManifest> {
    Ok(serde_json::from_str(source)?)
}

pub fn from_toml_str(source: &str) -> Result<RegistryManifest> {
    Ok(toml::from_str(source)?)
}

/// Read a manifest; `.toml` files are parsed as TOML, anything else as JSON.
pub fn load_path(path: &Path) -> Result<RegistryManifest> {
    let source = fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => from_toml_str(&source),
        _ => from_json_str(&source),
    }
}

/// Validate `manifest` and register everything it declares.
///
/// Nothing is registered when validation reports an error.
pub fn apply(manifest: &RegistryManifest, registry: &mut Registry) -> Result<Vec<Rc<Schema>>> {
    let report = validate_manifest(manifest);
    for issue in &report.warnings {
        warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
    }
    if !report.is_ok() {
        return Err(ManifestError::Invalid(report));
    }

    for sequence in &manifest.sequences {
        let options = SequenceOptions {
            scope: sequence.scope,
            seed: sequence.seed,
        };
        registry.define_sequence(sequence.name.clone(), options, generator(sequence)?);
    }
    for dictionary in &manifest.dictionaries {
        registry.define_dictionary(dictionary.clone());
    }

    let schemas = manifest
        .templates
        .iter()
        .map(|template| Ok(registry.register(template.to_schema()?)))
        .collect::<Result<Vec<_>>>()?;

    info!(
        templates = schemas.len(),
        sequences = manifest.sequences.len(),
        dictionaries = manifest.dictionaries.len(),
        "manifest applied"
    );
    Ok(schemas)
}

/// [`load_path`] followed by [`apply`].
pub fn load_into(path: &Path, registry: &mut Registry) -> Result<Vec<Rc<Schema>>> {
    let manifest = load_path(path)?;
    apply(&manifest, registry)
}

impl SchemaManifest {
    /// Declare this template on a fresh [`Schema`] without registering it, so
    /// code can add macros and instantiators first.
    pub fn to_schema(&self) -> Result<Schema> {
        let mut schema = Schema::new(self.name.clone());

        for item in &self.items {
            match item.fallback.clone() {
                Some(fallback) => {
                    let fallback = Value::from(fallback);
                    schema.define_item_with(item.name.clone(), item.options.clone(), move || {
                        fallback.clone()
                    });
                }
                None => {
                    schema.define_item(item.name.clone(), item.options.clone());
                }
            }
        }
        for subtemplate in &self.subtemplates {
            schema.define_subtemplate(subtemplate.name.clone(), subtemplate.options.clone());
        }
        for sequence in &self.sequences {
            let options = SequenceOptions {
                scope: sequence.scope,
                seed: sequence.seed,
            };
            schema.define_sequence(sequence.name.clone(), options, generator(sequence)?);
        }
        for dictionary in &self.dictionaries {
            schema.define_dictionary(dictionary.name.clone(), dictionary.options.clone());
        }
        for (name, assignments) in &self.presets {
            let assignments = assignments.clone();
            schema.define_preset(name.clone(), move |t| assign(t, &assignments));
        }
        for hook in &self.before {
            schema.define_before_preset(hook.options, hook.preset.clone());
        }
        for hook in &self.after {
            schema.define_after_preset(hook.options, hook.preset.clone());
        }

        Ok(schema)
    }
}

fn assign(t: &mut Template<'_>, assignments: &IndexMap<String, FieldValue>) -> fixtory::Result<()> {
    for (field, value) in assignments {
        let value = match value {
            FieldValue::Literal(literal) => Value::from(literal.clone()),
            FieldValue::Sequence(reference) => {
                let mut options = GenerateOptions::new();
                if let Some(key) = reference
                    .dimension
                    .clone()
                    .map(Value::from)
                    .and_then(|dimension| dimension.as_key())
                {
                    options = options.dimension(key);
                }
                if reference.global {
                    t.generate_global(&reference.sequence, options)?
                } else {
                    t.generate(&reference.sequence, options)?
                }
            }
        };
        t.set(field, value)?;
    }
    Ok(())
}

fn generator(sequence: &SequenceManifest) -> Result<Generator> {
    let generator: Generator = match &sequence.generator {
        GeneratorSpec::Format { pattern } => Box::new(formatted(pattern.clone())),
        GeneratorSpec::Int => Box::new(counter_int()),
        GeneratorSpec::Uuid => Box::new(counter_uuid()),
        GeneratorSpec::Email { domain } => Box::new(counter_email(domain.clone())),
        GeneratorSpec::Date { start } => {
            let base = NaiveDate::parse_from_str(start, DATE_FORMAT).map_err(|err| {
                let mut report = ValidationReport::default();
                report.push(ValidationIssue::error(
                    "invalid_date",
                    format!("/sequences/{}/generator/start", sequence.name),
                    err.to_string(),
                ));
                ManifestError::Invalid(report)
            })?;
            Box::new(counter_date(base))
        }
    };
    Ok(generator)
}
