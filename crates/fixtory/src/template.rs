//! Field population for one record under construction.
//!
//! A [`Template`] wraps the record being built and dispatches every invoked
//! name to the matching macro, subtemplate, item, or dictionary of its schema.
//! While default hooks run, the template is in default mode: fields the caller
//! already set are left alone, and fields a default set may be overwritten by
//! later defaults.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::dictionary::{Dictionary, DictionaryOptions, DictionaryRef};
use crate::errors::{Error, Result};
use crate::hooks::{DefaultHook, HookAction, HookClaims, HookContext, Stage};
use crate::invocation::{Block, Invocation, Invoked};
use crate::options::{BuildOptions, quantity_of};
use crate::preset::PresetMatch;
use crate::record::{Built, Record};
use crate::registry::Registry;
use crate::schema::{Collection, FieldDefinition, FieldKind, FieldMatch, Grammar, Schema};
use crate::sequence::{GenerateOptions, Params, Scope};
use crate::value::{Key, Value};

/// State shared by every template in one build tree.
#[derive(Clone, Copy)]
pub(crate) struct BuildContext<'a> {
    pub(crate) registry: &'a Registry,
}

/// Recipe a template is populated with.
pub(crate) enum Body<'r> {
    Empty,
    Recipe(&'r dyn Fn(&mut Template<'_>) -> Result<()>),
    Preset(&'r PresetMatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provenance {
    Default,
    Caller,
}

enum Slot {
    Replace(Value),
    Push(Value),
    Extend(Vec<Value>),
    Insert(Key, Value),
    Merge(IndexMap<Key, Value>),
}

enum Embed {
    One(Option<Value>),
    Push(Option<Value>),
    Keyed(Key, Option<Value>),
    Many(usize, Option<Value>),
    Verbatim(Vec<Value>),
}

/// A record under construction.
pub struct Template<'a> {
    ctx: BuildContext<'a>,
    record: Record,
    default_mode: bool,
    provenance: HashMap<String, Provenance>,
    transient_provenance: HashMap<String, Provenance>,
    claims: HookClaims,
}

impl<'a> Template<'a> {
    pub(crate) fn new(
        ctx: BuildContext<'a>,
        schema: Rc<Schema>,
        transients: IndexMap<String, Value>,
    ) -> Self {
        let transient_provenance = transients
            .keys()
            .map(|name| (name.clone(), Provenance::Caller))
            .collect();
        Self {
            ctx,
            record: Record::new(schema, transients),
            default_mode: false,
            provenance: HashMap::new(),
            transient_provenance,
            claims: HookClaims::default(),
        }
    }

    /// Before hooks, then the body, then after hooks.
    pub(crate) fn run(&mut self, body: Body<'_>, defaults: bool) -> Result<()> {
        if defaults {
            self.apply_defaults(Stage::Before, HookContext::All)?;
        }
        match body {
            Body::Empty => {}
            Body::Recipe(recipe) => recipe(self)?,
            Body::Preset(preset) => preset.apply(self)?,
        }
        if defaults {
            self.apply_defaults(Stage::After, HookContext::All)?;
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Record {
        self.record
    }

    pub fn schema(&self) -> &Rc<Schema> {
        self.record.schema()
    }

    pub fn registry(&self) -> &'a Registry {
        self.ctx.registry
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.get(field)
    }

    pub fn transient(&self, name: &str) -> Option<&Value> {
        self.record.transient(name)
    }

    /// True while default hooks are running.
    pub fn is_applying_defaults(&self) -> bool {
        self.default_mode
    }

    /// Set a transient. Returns false when a default tried to replace a caller's value.
    pub fn set_transient(&mut self, name: &str, value: impl Into<Value>) -> bool {
        self.set_transient_with(name, || value.into())
    }

    /// Like [`Template::set_transient`], but only computes the value when it will be stored.
    pub fn set_transient_with(&mut self, name: &str, produce: impl FnOnce() -> Value) -> bool {
        let previous = self.transient_provenance.get(name).copied();
        if self.default_mode
            && self.record.transients.contains_key(name)
            && previous != Some(Provenance::Default)
        {
            return false;
        }
        let value = produce();
        self.record.transients.insert(name.to_string(), value);
        self.transient_provenance
            .insert(name.to_string(), self.provenance_for(previous));
        true
    }

    // Dispatch

    /// Populate the field, run the macro, or fetch the dictionary `name` resolves to.
    pub fn invoke(&mut self, name: &str, invocation: Invocation<'_>) -> Result<Invoked> {
        let schema = Rc::clone(self.record.schema());
        let found = schema.find_field(name).ok_or_else(|| Error::UnknownField {
            template: schema.name().to_string(),
            field: name.to_string(),
        })?;
        let definition = match found {
            FieldMatch::Dictionary(dictionary) => {
                return self.dictionary(&dictionary).map(Invoked::Dictionary);
            }
            FieldMatch::Field(definition) => definition,
        };
        trace!(
            template = %schema.name(),
            field = %definition.name(),
            invoked = name,
            kind = ?definition.kind(),
            args = invocation.args.len(),
            default_mode = self.default_mode,
            "invoking field"
        );
        match definition.kind() {
            FieldKind::Macro => self.run_macro(&definition, invocation),
            FieldKind::Item => self.populate_item(&definition, name, invocation),
            FieldKind::Subtemplate => self.populate_subtemplate(&definition, name, invocation),
        }
    }

    /// Store a single value through `field` (primary, alias, or singular name).
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.invoke(field, Invocation::new().arg(value)).map(drop)
    }

    /// Store the value produced by `produce`; list fields call it once per item.
    pub fn set_with(&mut self, field: &str, produce: impl Fn() -> Value) -> Result<()> {
        self.invoke(field, Invocation::new().with_value(&produce))
            .map(drop)
    }

    /// Add a keyed entry to a named collection.
    pub fn put(
        &mut self,
        field: &str,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.invoke(field, Invocation::new().arg(key).arg(value))
            .map(drop)
    }

    /// Build a nested record for a subtemplate field with `recipe`.
    pub fn embed(
        &mut self,
        field: &str,
        recipe: impl Fn(&mut Template<'_>) -> Result<()>,
    ) -> Result<()> {
        self.invoke(field, Invocation::new().with_build(&recipe))
            .map(drop)
    }

    /// Build a nested record for a subtemplate field from a preset.
    pub fn embed_preset(&mut self, field: &str, preset: impl Into<Value>) -> Result<()> {
        self.invoke(field, Invocation::new().arg(preset)).map(drop)
    }

    /// Append `quantity` nested records built with `recipe` to a list subtemplate.
    pub fn embed_many(
        &mut self,
        field: &str,
        quantity: i64,
        recipe: impl Fn(&mut Template<'_>) -> Result<()>,
    ) -> Result<()> {
        self.invoke(field, Invocation::new().arg(quantity).with_build(&recipe))
            .map(drop)
    }

    /// Run a macro with arguments.
    pub fn call<I, V>(&mut self, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.invoke(name, Invocation::new().args(args)).map(drop)
    }

    fn run_macro(&mut self, definition: &FieldDefinition, invocation: Invocation<'_>) -> Result<Invoked> {
        let Some(recipe) = definition.recipe().cloned() else {
            return Ok(Invoked::Skipped);
        };
        recipe(self, &invocation.args)?;
        Ok(Invoked::Ran)
    }

    fn populate_item(
        &mut self,
        definition: &FieldDefinition,
        invoked: &str,
        invocation: Invocation<'_>,
    ) -> Result<Invoked> {
        if !self.can_set(definition.name()) {
            trace!(field = %definition.name(), "field already set; skipping default");
            return Ok(Invoked::Skipped);
        }
        let Invocation { args, block } = invocation;
        let produce = match block {
            None => None,
            Some(Block::Value(produce)) => Some(produce),
            Some(Block::Build(_)) => {
                return Err(Error::UnsupportedOperation(format!(
                    "item field '{}' takes a value block, not a build block",
                    definition.name()
                )));
            }
        };

        let slot = match definition.collection() {
            Collection::None => {
                let value = match produce {
                    Some(produce) => produce(),
                    None => args
                        .into_iter()
                        .next()
                        .or_else(|| generated(definition))
                        .unwrap_or_default(),
                };
                Slot::Replace(value)
            }
            Collection::List => match definition.grammar(invoked, &args, produce.is_some()) {
                Grammar::Singular => match single_item(definition, args, produce) {
                    Some(value) => Slot::Push(value),
                    None => return Ok(Invoked::Skipped),
                },
                Grammar::Plural => {
                    let values = many_items(definition, args, produce)?;
                    if values.is_empty() {
                        return Ok(Invoked::Skipped);
                    }
                    Slot::Extend(values)
                }
            },
            Collection::Map => match definition.grammar(invoked, &args, produce.is_some()) {
                Grammar::Singular => {
                    let (key, rest) = split_key(definition, args)?;
                    match single_item(definition, rest, produce) {
                        Some(value) => Slot::Insert(key, value),
                        None => {
                            trace!(field = %definition.name(), key = %key, "no value for keyed entry");
                            return Ok(Invoked::Skipped);
                        }
                    }
                }
                Grammar::Plural => {
                    let entries = map_argument(definition, args, produce.is_some())?;
                    if entries.is_empty() {
                        return Ok(Invoked::Skipped);
                    }
                    Slot::Merge(entries)
                }
            },
        };

        self.store(definition, slot);
        Ok(Invoked::Stored)
    }

    fn populate_subtemplate(
        &mut self,
        definition: &FieldDefinition,
        invoked: &str,
        invocation: Invocation<'_>,
    ) -> Result<Invoked> {
        if !self.can_set(definition.name()) {
            trace!(field = %definition.name(), "field already set; skipping default");
            return Ok(Invoked::Skipped);
        }
        let target = self.resolve_subtemplate(definition)?;
        let Invocation { args, block } = invocation;
        let recipe = match block {
            None => None,
            Some(Block::Build(recipe)) => Some(recipe),
            Some(Block::Value(_)) => {
                return Err(Error::UnsupportedOperation(format!(
                    "subtemplate field '{}' takes a build block, not a value block",
                    definition.name()
                )));
            }
        };

        let request = match (
            definition.collection(),
            definition.grammar(invoked, &args, recipe.is_some()),
        ) {
            (Collection::None, _) => Embed::One(first_present(args)),
            (Collection::List, Grammar::Singular) => Embed::Push(first_present(args)),
            (Collection::List, Grammar::Plural) => plural_embed(definition, args)?,
            (Collection::Map, Grammar::Singular) => {
                let (key, rest) = split_key(definition, args)?;
                Embed::Keyed(key, first_present(rest))
            }
            (Collection::Map, Grammar::Plural) => {
                return Err(Error::UnsupportedOperation(format!(
                    "named subtemplate field '{}' adds one entry at a time",
                    definition.name()
                )));
            }
        };

        self.apply_defaults(Stage::Before, HookContext::Embedded)?;
        let slot = match request {
            Embed::One(preset) => {
                Slot::Replace(Value::Record(self.embed_one(&target, preset.as_ref(), recipe)?))
            }
            Embed::Push(preset) => {
                Slot::Push(Value::Record(self.embed_one(&target, preset.as_ref(), recipe)?))
            }
            Embed::Keyed(key, preset) => Slot::Insert(
                key,
                Value::Record(self.embed_one(&target, preset.as_ref(), recipe)?),
            ),
            Embed::Many(quantity, preset) => Slot::Extend(
                self.embed_records(&target, quantity, preset.as_ref(), recipe)?
                    .into_iter()
                    .map(Value::Record)
                    .collect(),
            ),
            Embed::Verbatim(values) => Slot::Extend(values),
        };
        self.apply_defaults(Stage::After, HookContext::Embedded)?;

        self.store(definition, slot);
        Ok(Invoked::Stored)
    }

    fn resolve_subtemplate(&self, definition: &FieldDefinition) -> Result<Rc<Schema>> {
        definition
            .target_candidates()
            .into_iter()
            .find_map(|name| self.ctx.registry.schema(name).cloned())
            .ok_or_else(|| Error::UnresolvedSubtemplate {
                field: definition.name().to_string(),
                template: definition
                    .template()
                    .unwrap_or(definition.name())
                    .to_string(),
            })
    }

    fn nested_options(&self) -> BuildOptions {
        BuildOptions {
            transients: self.record.transients.clone(),
            ..BuildOptions::default()
        }
    }

    fn embed_one(
        &self,
        target: &Rc<Schema>,
        preset: Option<&Value>,
        recipe: Option<&dyn Fn(&mut Template<'_>) -> Result<()>>,
    ) -> Result<Record> {
        let options = self.nested_options();
        match recipe {
            Some(recipe) => target.construct(self.ctx, Body::Recipe(recipe), &options),
            None => target.build_preset_one(self.ctx, preset, &options),
        }
    }

    fn embed_records(
        &self,
        target: &Rc<Schema>,
        quantity: usize,
        preset: Option<&Value>,
        recipe: Option<&dyn Fn(&mut Template<'_>) -> Result<()>>,
    ) -> Result<Vec<Record>> {
        let options = self.nested_options();
        match recipe {
            Some(recipe) => (0..quantity)
                .map(|_| target.construct(self.ctx, Body::Recipe(recipe), &options))
                .collect(),
            None => target
                .build_preset(self.ctx, preset, quantity, &options)
                .map(Built::into_records),
        }
    }

    // Default mode

    fn can_set(&self, field: &str) -> bool {
        !self.default_mode
            || !self.record.contains(field)
            || self.provenance.get(field) == Some(&Provenance::Default)
    }

    fn provenance_for(&self, previous: Option<Provenance>) -> Provenance {
        if self.default_mode && previous != Some(Provenance::Caller) {
            Provenance::Default
        } else {
            Provenance::Caller
        }
    }

    fn store(&mut self, definition: &FieldDefinition, slot: Slot) {
        let name = definition.name();
        let fields = &mut self.record.fields;
        match slot {
            Slot::Replace(value) => {
                fields.insert(name.to_string(), value);
            }
            Slot::Push(value) => match fields.get_mut(name) {
                Some(Value::List(values)) => values.push(value),
                _ => {
                    fields.insert(name.to_string(), Value::List(vec![value]));
                }
            },
            Slot::Extend(new_values) => match fields.get_mut(name) {
                Some(Value::List(values)) => values.extend(new_values),
                _ => {
                    fields.insert(name.to_string(), Value::List(new_values));
                }
            },
            Slot::Insert(key, value) => match fields.get_mut(name) {
                Some(Value::Map(entries)) => {
                    entries.insert(key, value);
                }
                _ => {
                    fields.insert(name.to_string(), Value::Map(IndexMap::from([(key, value)])));
                }
            },
            Slot::Merge(new_entries) => match fields.get_mut(name) {
                Some(Value::Map(entries)) => entries.extend(new_entries),
                _ => {
                    fields.insert(name.to_string(), Value::Map(new_entries));
                }
            },
        }
        let provenance = self.provenance_for(self.provenance.get(name).copied());
        self.provenance.insert(name.to_string(), provenance);
    }

    fn apply_defaults(&mut self, stage: Stage, context: HookContext) -> Result<()> {
        let schema = Rc::clone(self.record.schema());
        let hooks = schema.hooks(stage).for_context(context);
        if hooks.is_empty() {
            return Ok(());
        }
        trace!(
            template = %schema.name(),
            %stage,
            context = ?context,
            hooks = hooks.len(),
            "applying defaults"
        );
        let previous = std::mem::replace(&mut self.default_mode, true);
        let outcome = hooks
            .iter()
            .try_for_each(|hook| self.run_hook(&schema, hook));
        self.default_mode = previous;
        outcome
    }

    fn run_hook(&mut self, schema: &Schema, hook: &DefaultHook) -> Result<()> {
        if !self.claims.claim(hook) {
            trace!(hook = ?hook.id(), "once hook already ran for this record");
            return Ok(());
        }
        match hook.action() {
            HookAction::Recipe(recipe) => recipe(self),
            HookAction::Preset(name) => {
                let preset = schema
                    .preset(&Value::from(name.as_str()))
                    .ok_or_else(|| Error::UnknownPreset {
                        template: schema.name().to_string(),
                        preset: name.clone(),
                    })?;
                preset.apply(self)
            }
        }
    }

    // Dictionaries and sequences

    /// The schema dictionary `name`; instance-scoped ones belong to this record.
    pub fn dictionary(&mut self, name: &str) -> Result<DictionaryRef> {
        let schema = Rc::clone(self.record.schema());
        let shared = schema
            .dictionary(name)
            .ok_or_else(|| Error::UnknownDictionary(name.to_string()))?;
        if shared.borrow().scope() != Scope::Instance {
            return Ok(Rc::clone(shared));
        }
        let local = self
            .record
            .dictionaries
            .entry(name.to_string())
            .or_insert_with(|| {
                Dictionary::new(name, DictionaryOptions::scoped(Scope::Instance)).shared()
            });
        Ok(Rc::clone(local))
    }

    /// Next value of the schema sequence `name`.
    pub fn generate(&mut self, name: &str, options: GenerateOptions) -> Result<Value> {
        self.generate_from(name, &options, None)
    }

    /// Next value of `name`, rendered by `generator` instead of the declared one.
    pub fn generate_with(
        &mut self,
        name: &str,
        options: GenerateOptions,
        generator: impl Fn(i64, &Params) -> Value,
    ) -> Result<Value> {
        self.generate_from(name, &options, Some(&generator))
    }

    /// Next value of the registry-level sequence `name`.
    pub fn generate_global(&self, name: &str, options: GenerateOptions) -> Result<Value> {
        self.ctx.registry.generate(name, options)
    }

    fn generate_from(
        &mut self,
        name: &str,
        options: &GenerateOptions,
        generator: Option<&dyn Fn(i64, &Params) -> Value>,
    ) -> Result<Value> {
        let schema = Rc::clone(self.record.schema());
        let sequence = schema
            .sequence(name)
            .ok_or_else(|| Error::UnknownSequence(name.to_string()))?;
        if sequence.borrow().scope() != Scope::Instance {
            return Ok(sequence.borrow_mut().generate(options, generator));
        }
        let local = self
            .record
            .sequences
            .entry(name.to_string())
            .or_insert_with(|| sequence.borrow().fresh());
        Ok(local.generate(options, generator))
    }
}

fn generated(definition: &FieldDefinition) -> Option<Value> {
    definition.generator().map(|generator| generator())
}

fn first_present(args: Vec<Value>) -> Option<Value> {
    args.into_iter().next().filter(|value| !value.is_null())
}

/// One item: block, a single non-null argument, several arguments as a list, or the generator.
fn single_item(
    definition: &FieldDefinition,
    mut args: Vec<Value>,
    produce: Option<&dyn Fn() -> Value>,
) -> Option<Value> {
    if let Some(produce) = produce {
        return Some(produce());
    }
    match args.len() {
        0 => generated(definition),
        1 => args.pop().filter(|value| !value.is_null()),
        _ => Some(Value::List(args)),
    }
}

fn many_items(
    definition: &FieldDefinition,
    mut args: Vec<Value>,
    produce: Option<&dyn Fn() -> Value>,
) -> Result<Vec<Value>> {
    if let Some(produce) = produce {
        let quantity = match args.as_slice() {
            [] => 1,
            [count @ Value::Int(_)] => quantity_of(count)?,
            _ => {
                return Err(Error::UnsupportedOperation(format!(
                    "field '{}' takes at most a quantity alongside a block",
                    definition.name()
                )));
            }
        };
        return Ok((0..quantity).map(|_| produce()).collect());
    }
    if args.len() == 1 {
        return match args.pop() {
            Some(Value::List(values)) => Ok(values),
            Some(Value::Map(_)) => Err(Error::UnsupportedOperation(format!(
                "list field '{}' cannot take a map",
                definition.name()
            ))),
            other => Ok(other.into_iter().filter(|value| !value.is_null()).collect()),
        };
    }
    if args.is_empty() {
        return Ok(generated(definition).into_iter().collect());
    }
    Ok(args)
}

fn split_key(definition: &FieldDefinition, args: Vec<Value>) -> Result<(Key, Vec<Value>)> {
    let mut args = args.into_iter();
    let first = args
        .next()
        .filter(|value| !value.is_null())
        .ok_or_else(|| Error::MissingFieldName(definition.name().to_string()))?;
    let key = first.as_key().ok_or_else(|| {
        Error::UnsupportedOperation(format!(
            "a {} cannot name an entry of '{}'",
            first.kind(),
            definition.name()
        ))
    })?;
    Ok((key, args.collect()))
}

fn map_argument(
    definition: &FieldDefinition,
    mut args: Vec<Value>,
    has_block: bool,
) -> Result<IndexMap<Key, Value>> {
    if !has_block && args.len() == 1 {
        if let Some(Value::Map(entries)) = args.pop() {
            return Ok(entries);
        }
    }
    Err(Error::UnsupportedOperation(format!(
        "named field '{}' expects a single map of entries",
        definition.name()
    )))
}

fn plural_embed(definition: &FieldDefinition, mut args: Vec<Value>) -> Result<Embed> {
    if args.len() == 1 {
        match args.pop() {
            Some(Value::List(values)) => return Ok(Embed::Verbatim(values)),
            Some(Value::Map(_)) => {
                return Err(Error::UnsupportedOperation(format!(
                    "list subtemplate field '{}' cannot take a map",
                    definition.name()
                )));
            }
            Some(other) => args.push(other),
            None => {}
        }
    }
    let count = args.iter().position(|value| matches!(value, Value::Int(_)));
    let quantity = match count {
        Some(index) => quantity_of(&args[index])?,
        None => 1,
    };
    let preset = args
        .into_iter()
        .enumerate()
        .find(|(index, value)| Some(*index) != count && !value.is_null())
        .map(|(_, value)| value);
    Ok(Embed::Many(quantity, preset))
}
