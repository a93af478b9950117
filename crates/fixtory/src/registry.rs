use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::dictionary::{Dictionary, DictionaryOptions, DictionaryRef};
use crate::errors::{Error, Result};
use crate::options::BuildOptions;
use crate::record::{Built, Record};
use crate::schema::Schema;
use crate::sequence::{GenerateOptions, Params, Sequence, SequenceOptions};
use crate::template::{Body, BuildContext, Template};
use crate::value::Value;

/// Schemas plus the global sequences and dictionaries they can share.
#[derive(Default)]
pub struct Registry {
    templates: IndexMap<String, Rc<Schema>>,
    sequences: IndexMap<String, RefCell<Sequence>>,
    dictionaries: IndexMap<String, DictionaryRef>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a schema and register it, replacing any schema of the same name.
    pub fn define(&mut self, name: impl Into<String>, declare: impl FnOnce(&mut Schema)) -> Rc<Schema> {
        let mut schema = Schema::new(name);
        declare(&mut schema);
        self.register(schema)
    }

    /// Register a declared schema, replacing any schema of the same name.
    pub fn register(&mut self, schema: Schema) -> Rc<Schema> {
        let schema = Rc::new(schema);
        let replaced = self
            .templates
            .insert(schema.name().to_string(), Rc::clone(&schema))
            .is_some();
        info!(
            template = %schema.name(),
            items = schema.items().count(),
            subtemplates = schema.subtemplates().count(),
            macros = schema.macros().count(),
            presets = schema.presets().len(),
            replaced,
            "template registered"
        );
        schema
    }

    /// The schema registered as `name`.
    pub fn schema(&self, name: &str) -> Option<&Rc<Schema>> {
        self.templates.get(name)
    }

    /// Whether a template named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered template names in registration order.
    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Declare a registry-level sequence shared by every template.
    pub fn define_sequence(
        &mut self,
        name: impl Into<String>,
        options: SequenceOptions,
        generator: impl Fn(i64, &Params) -> Value + 'static,
    ) -> &mut Self {
        let name = name.into();
        debug!(sequence = %name, seed = options.seed, "global sequence declared");
        let sequence = Sequence::new(name.clone(), options, generator);
        self.sequences.insert(name, RefCell::new(sequence));
        self
    }

    /// Declare a registry-level dictionary shared by every template.
    pub fn define_dictionary(&mut self, name: impl Into<String>) -> DictionaryRef {
        let name = name.into();
        debug!(dictionary = %name, "global dictionary declared");
        let dictionary = Dictionary::new(name.clone(), DictionaryOptions::default()).shared();
        self.dictionaries.insert(name, Rc::clone(&dictionary));
        dictionary
    }

    /// The registry-level dictionary `name`.
    pub fn dictionary(&self, name: &str) -> Option<DictionaryRef> {
        self.dictionaries.get(name).cloned()
    }

    /// The registry-level sequence `name`.
    pub fn sequence(&self, name: &str) -> Option<&RefCell<Sequence>> {
        self.sequences.get(name)
    }

    // Building

    /// Build `name` with `body`. `body` is ignored when a preset or quantity is given.
    pub fn build(
        &self,
        name: &str,
        options: BuildOptions,
        body: impl Fn(&mut Template<'_>) -> Result<()>,
    ) -> Result<Built> {
        let schema = self.lookup(name)?;
        debug!(
            template = name,
            preset = ?options.preset,
            quantity = ?options.quantity,
            defaults = options.defaults,
            "building template"
        );
        let ctx = BuildContext { registry: self };
        schema.build(ctx, Body::Recipe(&body), &options)
    }

    /// Build a single record with default options.
    pub fn build_one(
        &self,
        name: &str,
        body: impl Fn(&mut Template<'_>) -> Result<()>,
    ) -> Result<Record> {
        let schema = self.lookup(name)?;
        let ctx = BuildContext { registry: self };
        schema.construct(ctx, Body::Recipe(&body), &BuildOptions::default())
    }

    /// Build `quantity` records from a preset (`Value::Null` for none).
    pub fn build_preset(
        &self,
        name: &str,
        preset: impl Into<Value>,
        quantity: impl Into<Value>,
    ) -> Result<Built> {
        let options = BuildOptions::new().preset(preset).quantity(quantity);
        self.build(name, options, |_| Ok(()))
    }

    /// Build, then save every resulting record.
    pub fn create(
        &self,
        name: &str,
        options: BuildOptions,
        body: impl Fn(&mut Template<'_>) -> Result<()>,
    ) -> Result<Built> {
        let built = self.build(name, options, body)?;
        match &built {
            Built::One(record) => record.save()?,
            Built::Many(records) => records.iter().try_for_each(Record::save)?,
        }
        info!(template = name, records = built.len(), "template created");
        Ok(built)
    }

    /// Build a single record, then save it.
    pub fn create_one(
        &self,
        name: &str,
        body: impl Fn(&mut Template<'_>) -> Result<()>,
    ) -> Result<Record> {
        let record = self.build_one(name, body)?;
        record.save()?;
        info!(template = name, records = 1, "template created");
        Ok(record)
    }

    /// Next value of the global sequence `name`.
    pub fn generate(&self, name: &str, options: GenerateOptions) -> Result<Value> {
        let sequence = self
            .sequences
            .get(name)
            .ok_or_else(|| Error::UnknownSequence(name.to_string()))?;
        Ok(sequence.borrow_mut().generate(&options, None))
    }

    /// Next value of the global sequence `name`, rendered by `generator`.
    pub fn generate_with(
        &self,
        name: &str,
        options: GenerateOptions,
        generator: impl Fn(i64, &Params) -> Value,
    ) -> Result<Value> {
        let sequence = self
            .sequences
            .get(name)
            .ok_or_else(|| Error::UnknownSequence(name.to_string()))?;
        Ok(sequence.borrow_mut().generate(&options, Some(&generator)))
    }

    // Lifecycle

    /// Forget every schema, sequence, and dictionary.
    pub fn clear(&mut self) {
        info!(
            templates = self.templates.len(),
            sequences = self.sequences.len(),
            dictionaries = self.dictionaries.len(),
            "registry cleared"
        );
        self.templates.clear();
        self.sequences.clear();
        self.dictionaries.clear();
    }

    /// Rewind all global and template sequences and clear all dictionaries.
    pub fn reset(&self) -> Result<()> {
        self.reset_sequences(&[])?;
        self.reset_dictionaries(&[])?;
        for schema in self.templates.values() {
            schema.reset_sequences(&[])?;
            schema.reset_dictionaries(&[])?;
        }
        info!(templates = self.templates.len(), "registry reset");
        Ok(())
    }

    /// Rewind global sequences; an empty `names` resets all of them.
    pub fn reset_sequences(&self, names: &[&str]) -> Result<()> {
        if names.is_empty() {
            self.sequences
                .values()
                .for_each(|sequence| sequence.borrow_mut().reset());
            return Ok(());
        }
        for name in names {
            self.sequences
                .get(*name)
                .ok_or_else(|| Error::UnknownSequence(name.to_string()))?
                .borrow_mut()
                .reset();
        }
        Ok(())
    }

    /// Clear global dictionaries; an empty `names` clears all of them.
    pub fn reset_dictionaries(&self, names: &[&str]) -> Result<()> {
        if names.is_empty() {
            self.dictionaries
                .values()
                .for_each(|dictionary| dictionary.borrow_mut().reset());
            return Ok(());
        }
        for name in names {
            self.dictionaries
                .get(*name)
                .ok_or_else(|| Error::UnknownDictionary(name.to_string()))?
                .borrow_mut()
                .reset();
        }
        Ok(())
    }

    /// Rewind sequences declared on `template`.
    pub fn reset_template_sequences(&self, template: &str, names: &[&str]) -> Result<()> {
        self.lookup(template)?.reset_sequences(names)
    }

    /// Clear dictionaries declared on `template`.
    pub fn reset_template_dictionaries(&self, template: &str, names: &[&str]) -> Result<()> {
        self.lookup(template)?.reset_dictionaries(names)
    }

    fn lookup(&self, name: &str) -> Result<&Rc<Schema>> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .field("sequences", &self.sequences.keys().collect::<Vec<_>>())
            .field("dictionaries", &self.dictionaries.keys().collect::<Vec<_>>())
            .finish()
    }
}
