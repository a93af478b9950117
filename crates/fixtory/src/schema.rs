use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dictionary::{Dictionary, DictionaryOptions, DictionaryRef};
use crate::errors::{Error, Result};
use crate::hooks::{DefaultHook, HookAction, HookOptions, Hooks, Stage};
use crate::options::BuildOptions;
use crate::preset::{PresetMatch, Presets, pattern_recipe, recipe};
use crate::record::{Built, Record};
use crate::sequence::{Params, Sequence, SequenceOptions};
use crate::template::{Body, BuildContext, Template};
use crate::value::Value;

/// Item generator used when an invocation supplies neither a value nor a block.
pub type ValueFn = Rc<dyn Fn() -> Value>;

/// Macro recipe: receives the template and the invocation arguments.
pub type MacroFn = Rc<dyn Fn(&mut Template<'_>, &[Value]) -> Result<()>>;

/// Converts a finished record into domain value(s).
pub type InstantiatorFn = Rc<dyn Fn(&Record, &[Value]) -> Result<Value>>;

/// Shape of a field's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    #[default]
    None,
    /// Ordered list; invocations append.
    List,
    /// Named map keyed by the first argument of a singular invocation.
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Item,
    Subtemplate,
    Macro,
}

/// Which name form a collection field was invoked through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Singular,
    Plural,
}

/// Declaration options shared by item and subtemplate fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldOptions {
    #[serde(default)]
    pub collection: Collection,
    /// Shorthand for `collection = map`.
    #[serde(default)]
    pub named: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Name used to add a single entry to a collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singular: Option<String>,
    /// Target schema for subtemplates named differently from the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl FieldOptions {
    pub fn list() -> Self {
        Self {
            collection: Collection::List,
            ..Self::default()
        }
    }

    pub fn named() -> Self {
        Self {
            named: true,
            ..Self::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn singular(mut self, singular: impl Into<String>) -> Self {
        self.singular = Some(singular.into());
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn resolved_collection(&self) -> Collection {
        if self.named {
            Collection::Map
        } else {
            self.collection
        }
    }
}

/// One declared field of a schema. Immutable once registered.
pub struct FieldDefinition {
    name: String,
    kind: FieldKind,
    collection: Collection,
    alias: Option<String>,
    singular: Option<String>,
    template: Option<String>,
    generator: Option<ValueFn>,
    recipe: Option<MacroFn>,
}

impl FieldDefinition {
    fn new(name: String, kind: FieldKind, options: FieldOptions) -> Self {
        Self {
            name,
            kind,
            collection: options.resolved_collection(),
            alias: options.alias,
            singular: options.singular,
            template: options.template,
            generator: None,
            recipe: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn singular(&self) -> Option<&str> {
        self.singular.as_deref()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub(crate) fn generator(&self) -> Option<&ValueFn> {
        self.generator.as_ref()
    }

    pub(crate) fn recipe(&self) -> Option<&MacroFn> {
        self.recipe.as_ref()
    }

    /// Pick singular or plural handling for an invocation.
    ///
    /// Named maps without a distinct singular name use singular grammar unless
    /// the only argument is a map.
    pub fn grammar(&self, invoked: &str, args: &[Value], has_block: bool) -> Grammar {
        if self.singular.as_deref() == Some(invoked) {
            return Grammar::Singular;
        }
        match self.collection {
            Collection::Map if self.singular.is_none() => match (args, has_block) {
                ([Value::Map(_)], false) => Grammar::Plural,
                _ => Grammar::Singular,
            },
            _ => Grammar::Plural,
        }
    }

    /// Schema names a subtemplate field may resolve to, in lookup order.
    pub fn target_candidates(&self) -> Vec<&str> {
        let mut candidates = vec![self.template.as_deref().unwrap_or(&self.name)];
        if let Some(singular) = self.singular.as_deref() {
            candidates.push(singular);
        }
        candidates
    }
}

impl fmt::Debug for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("collection", &self.collection)
            .field("alias", &self.alias)
            .field("singular", &self.singular)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// Result of resolving an invoked name against a schema.
#[derive(Debug, Clone)]
pub enum FieldMatch {
    Field(Rc<FieldDefinition>),
    Dictionary(String),
}

/// Registered definition of one template kind.
pub struct Schema {
    name: String,
    items: IndexMap<String, Rc<FieldDefinition>>,
    subtemplates: IndexMap<String, Rc<FieldDefinition>>,
    macros: IndexMap<String, Rc<FieldDefinition>>,
    presets: Presets,
    sequences: IndexMap<String, RefCell<Sequence>>,
    dictionaries: IndexMap<String, DictionaryRef>,
    instantiators: IndexMap<String, InstantiatorFn>,
    before: Hooks,
    after: Hooks,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: IndexMap::new(),
            subtemplates: IndexMap::new(),
            macros: IndexMap::new(),
            presets: Presets::default(),
            sequences: IndexMap::new(),
            dictionaries: IndexMap::new(),
            instantiators: IndexMap::new(),
            before: Hooks::default(),
            after: Hooks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Registration

    /// Declare a plain value field.
    pub fn define_item(&mut self, name: impl Into<String>, options: FieldOptions) -> &mut Self {
        let definition = FieldDefinition::new(name.into(), FieldKind::Item, options);
        self.insert_field(definition)
    }

    /// Item field with a generator for invocations that supply no value.
    pub fn define_item_with(
        &mut self,
        name: impl Into<String>,
        options: FieldOptions,
        generator: impl Fn() -> Value + 'static,
    ) -> &mut Self {
        let mut definition = FieldDefinition::new(name.into(), FieldKind::Item, options);
        definition.generator = Some(Rc::new(generator));
        self.insert_field(definition)
    }

    /// Declare a field populated with records built from another template.
    pub fn define_subtemplate(
        &mut self,
        name: impl Into<String>,
        options: FieldOptions,
    ) -> &mut Self {
        let definition = FieldDefinition::new(name.into(), FieldKind::Subtemplate, options);
        self.insert_field(definition)
    }

    /// Declare a named recipe that populates other fields when invoked.
    pub fn define_macro(
        &mut self,
        name: impl Into<String>,
        recipe: impl Fn(&mut Template<'_>, &[Value]) -> Result<()> + 'static,
    ) -> &mut Self {
        let mut definition =
            FieldDefinition::new(name.into(), FieldKind::Macro, FieldOptions::default());
        definition.recipe = Some(Rc::new(recipe));
        self.insert_field(definition)
    }

    /// Single-valued item.
    pub fn has_one(&mut self, name: impl Into<String>) -> &mut Self {
        self.define_item(name, FieldOptions::default())
    }

    /// List item.
    pub fn has_many(&mut self, name: impl Into<String>) -> &mut Self {
        self.define_item(name, FieldOptions::list())
    }

    /// Single nested record.
    pub fn embeds_one(&mut self, name: impl Into<String>) -> &mut Self {
        self.define_subtemplate(name, FieldOptions::default())
    }

    /// List of nested records.
    pub fn embeds_many(&mut self, name: impl Into<String>) -> &mut Self {
        self.define_subtemplate(name, FieldOptions::list())
    }

    /// Preset selected by exact name.
    pub fn define_preset(
        &mut self,
        name: impl Into<String>,
        body: impl Fn(&mut Template<'_>) -> Result<()> + 'static,
    ) -> &mut Self {
        self.presets.insert_exact(name.into(), recipe(body));
        self
    }

    /// Preset selected by any key whose string form matches `pattern`.
    pub fn define_pattern_preset(
        &mut self,
        pattern: Regex,
        body: impl Fn(&mut Template<'_>, &Value) -> Result<()> + 'static,
    ) -> &mut Self {
        self.presets.insert_pattern(pattern, pattern_recipe(body));
        self
    }

    /// Declare a sequence. `Global` scope on a schema behaves like `Template`.
    pub fn define_sequence(
        &mut self,
        name: impl Into<String>,
        options: SequenceOptions,
        generator: impl Fn(i64, &Params) -> Value + 'static,
    ) -> &mut Self {
        let name = name.into();
        let sequence = Sequence::new(name.clone(), options, generator);
        self.sequences.insert(name, RefCell::new(sequence));
        self
    }

    /// Declare a dictionary. `Global` scope on a schema behaves like `Template`.
    pub fn define_dictionary(
        &mut self,
        name: impl Into<String>,
        options: DictionaryOptions,
    ) -> &mut Self {
        let name = name.into();
        let dictionary = Dictionary::new(name.clone(), options).shared();
        self.dictionaries.insert(name, dictionary);
        self
    }

    /// Named factory run against a finished record by [`Record::build`].
    pub fn define_instantiator(
        &mut self,
        name: impl Into<String>,
        recipe: impl Fn(&Record, &[Value]) -> Result<Value> + 'static,
    ) -> &mut Self {
        self.instantiators.insert(name.into(), Rc::new(recipe));
        self
    }

    /// Default hook run before the build body.
    pub fn define_before(
        &mut self,
        options: HookOptions,
        body: impl Fn(&mut Template<'_>) -> Result<()> + 'static,
    ) -> &mut Self {
        self.before
            .push(DefaultHook::new(options, HookAction::Recipe(recipe(body))));
        self
    }

    /// Before hook that applies the preset `preset` of this schema.
    pub fn define_before_preset(
        &mut self,
        options: HookOptions,
        preset: impl Into<String>,
    ) -> &mut Self {
        self.before
            .push(DefaultHook::new(options, HookAction::Preset(preset.into())));
        self
    }

    /// Default hook run after the build body.
    pub fn define_after(
        &mut self,
        options: HookOptions,
        body: impl Fn(&mut Template<'_>) -> Result<()> + 'static,
    ) -> &mut Self {
        self.after
            .push(DefaultHook::new(options, HookAction::Recipe(recipe(body))));
        self
    }

    /// After hook that applies the preset `preset` of this schema.
    pub fn define_after_preset(
        &mut self,
        options: HookOptions,
        preset: impl Into<String>,
    ) -> &mut Self {
        self.after
            .push(DefaultHook::new(options, HookAction::Preset(preset.into())));
        self
    }

    /// Shorthand for an `always` before hook around every build.
    pub fn before(&mut self, body: impl Fn(&mut Template<'_>) -> Result<()> + 'static) -> &mut Self {
        self.define_before(HookOptions::default(), body)
    }

    /// Shorthand for an `always` after hook around every build.
    pub fn after(&mut self, body: impl Fn(&mut Template<'_>) -> Result<()> + 'static) -> &mut Self {
        self.define_after(HookOptions::default(), body)
    }

    // Field names stay unique across kinds; the latest declaration wins.
    fn insert_field(&mut self, definition: FieldDefinition) -> &mut Self {
        let name = definition.name.clone();
        for fields in [&mut self.items, &mut self.subtemplates, &mut self.macros] {
            fields.shift_remove(&name);
        }
        trace!(template = %self.name, field = %name, kind = ?definition.kind, "field declared");
        let definition = Rc::new(definition);
        match definition.kind {
            FieldKind::Item => self.items.insert(name, definition),
            FieldKind::Subtemplate => self.subtemplates.insert(name, definition),
            FieldKind::Macro => self.macros.insert(name, definition),
        };
        self
    }

    // Lookup

    /// Resolve an invoked name: macros, then subtemplates, then items, then dictionaries.
    pub fn find_field(&self, invoked: &str) -> Option<FieldMatch> {
        [&self.macros, &self.subtemplates, &self.items]
            .into_iter()
            .find_map(|fields| find_in(fields, invoked))
            .map(FieldMatch::Field)
            .or_else(|| {
                self.dictionaries
                    .contains_key(invoked)
                    .then(|| FieldMatch::Dictionary(invoked.to_string()))
            })
    }

    pub fn items(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.items.values().map(|definition| definition.as_ref())
    }

    pub fn subtemplates(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.subtemplates.values().map(|definition| definition.as_ref())
    }

    pub fn macros(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.macros.values().map(|definition| definition.as_ref())
    }

    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    pub fn preset(&self, key: &Value) -> Option<PresetMatch> {
        self.presets.resolve(key)
    }

    pub fn sequence(&self, name: &str) -> Option<&RefCell<Sequence>> {
        self.sequences.get(name)
    }

    pub fn dictionary(&self, name: &str) -> Option<&DictionaryRef> {
        self.dictionaries.get(name)
    }

    pub fn instantiator(&self, name: &str) -> Option<&InstantiatorFn> {
        self.instantiators.get(name)
    }

    pub fn hooks(&self, stage: Stage) -> &Hooks {
        match stage {
            Stage::Before => &self.before,
            Stage::After => &self.after,
        }
    }

    /// Rewind template-scoped sequences; an empty `names` resets all of them.
    pub fn reset_sequences(&self, names: &[&str]) -> Result<()> {
        for name in selected(self.sequences.keys(), names) {
            let sequence = self
                .sequences
                .get(name)
                .ok_or_else(|| Error::UnknownSequence(name.to_string()))?;
            sequence.borrow_mut().reset();
        }
        Ok(())
    }

    /// Clear template-scoped dictionaries; an empty `names` clears all of them.
    pub fn reset_dictionaries(&self, names: &[&str]) -> Result<()> {
        for name in selected(self.dictionaries.keys(), names) {
            let dictionary = self
                .dictionaries
                .get(name)
                .ok_or_else(|| Error::UnknownDictionary(name.to_string()))?;
            dictionary.borrow_mut().reset();
        }
        Ok(())
    }

    // Construction

    /// Build one record, or fan out through presets when a preset or quantity is set.
    pub(crate) fn build(
        self: &Rc<Self>,
        ctx: BuildContext<'_>,
        body: Body<'_>,
        options: &BuildOptions,
    ) -> Result<Built> {
        if options.preset.is_none() && options.quantity.is_none() {
            return self.construct(ctx, body, options).map(Built::One);
        }
        let quantity = options.resolved_quantity()?;
        self.build_preset(ctx, options.preset.as_ref(), quantity, options)
    }

    pub(crate) fn build_preset(
        self: &Rc<Self>,
        ctx: BuildContext<'_>,
        key: Option<&Value>,
        quantity: usize,
        options: &BuildOptions,
    ) -> Result<Built> {
        let key = key.filter(|key| !key.is_null());
        debug!(
            template = %self.name,
            preset = ?key.map(|key| key.to_string()),
            quantity,
            "building from preset"
        );
        match quantity {
            0 => Err(Error::NonPositiveQuantity(0)),
            1 => self.build_preset_one(ctx, key, options).map(Built::One),
            _ => (0..quantity)
                .map(|_| self.build_preset_one(ctx, key, options))
                .collect::<Result<Vec<_>>>()
                .map(Built::Many),
        }
    }

    pub(crate) fn build_preset_one(
        self: &Rc<Self>,
        ctx: BuildContext<'_>,
        key: Option<&Value>,
        options: &BuildOptions,
    ) -> Result<Record> {
        let Some(key) = key.filter(|key| !key.is_null()) else {
            return self.construct(ctx, Body::Empty, options);
        };
        let preset = self.presets.resolve(key).ok_or_else(|| Error::UnknownPreset {
            template: self.name.clone(),
            preset: key.to_string(),
        })?;
        self.construct(ctx, Body::Preset(&preset), options)
    }

    pub(crate) fn construct(
        self: &Rc<Self>,
        ctx: BuildContext<'_>,
        body: Body<'_>,
        options: &BuildOptions,
    ) -> Result<Record> {
        let mut template = Template::new(ctx, Rc::clone(self), options.transients.clone());
        template.run(body, options.defaults)?;
        Ok(template.finish())
    }
}

fn find_in(fields: &IndexMap<String, Rc<FieldDefinition>>, invoked: &str) -> Option<Rc<FieldDefinition>> {
    fields
        .get(invoked)
        .or_else(|| {
            fields
                .values()
                .find(|definition| definition.alias.as_deref() == Some(invoked))
        })
        .or_else(|| {
            fields.values().find(|definition| {
                definition.kind != FieldKind::Macro && definition.singular.as_deref() == Some(invoked)
            })
        })
        .cloned()
}

fn selected<'a>(
    all: impl Iterator<Item = &'a String>,
    names: &'a [&'a str],
) -> Vec<&'a str> {
    if names.is_empty() {
        all.map(String::as_str).collect()
    } else {
        names.to_vec()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("items", &self.items.keys().collect::<Vec<_>>())
            .field("subtemplates", &self.subtemplates.keys().collect::<Vec<_>>())
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .field("presets", &self.presets.len())
            .field("sequences", &self.sequences.keys().collect::<Vec<_>>())
            .field("dictionaries", &self.dictionaries.keys().collect::<Vec<_>>())
            .field("instantiators", &self.instantiators.keys().collect::<Vec<_>>())
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Schema {
        let mut schema = Schema::new("widget");
        schema
            .define_item("doodads", FieldOptions::list().singular("doodad").alias("bits"))
            .define_subtemplate("parts", FieldOptions::named().singular("part"))
            .define_macro("make_shiny", |_, _| Ok(()))
            .define_dictionary("zips", DictionaryOptions::default());
        schema
    }

    #[test]
    fn resolves_primary_alias_and_singular_names() {
        let schema = widget();
        for invoked in ["doodads", "bits", "doodad"] {
            let Some(FieldMatch::Field(definition)) = schema.find_field(invoked) else {
                panic!("expected field for '{invoked}'");
            };
            assert_eq!(definition.name(), "doodads");
        }
        assert!(matches!(
            schema.find_field("zips"),
            Some(FieldMatch::Dictionary(name)) if name == "zips"
        ));
        assert!(schema.find_field("gizmo").is_none());
    }

    #[test]
    fn redeclaring_a_name_replaces_the_other_kind() {
        let mut schema = widget();
        schema.has_one("make_shiny");
        let Some(FieldMatch::Field(definition)) = schema.find_field("make_shiny") else {
            panic!("expected field");
        };
        assert_eq!(definition.kind(), FieldKind::Item);
        assert_eq!(schema.macros().count(), 0);
    }

    #[test]
    fn grammar_follows_the_invoked_name() {
        let schema = widget();
        let Some(FieldMatch::Field(doodads)) = schema.find_field("doodads") else {
            panic!("expected field");
        };
        assert_eq!(doodads.grammar("doodad", &[], false), Grammar::Singular);
        assert_eq!(doodads.grammar("doodads", &[], false), Grammar::Plural);

        let mut named = Schema::new("named");
        named.define_item("labels", FieldOptions::named());
        let Some(FieldMatch::Field(labels)) = named.find_field("labels") else {
            panic!("expected field");
        };
        let map = crate::value::map([("a", 1)]);
        assert_eq!(labels.grammar("labels", &[map], false), Grammar::Plural);
        assert_eq!(
            labels.grammar("labels", &[Value::from("a"), Value::Int(1)], false),
            Grammar::Singular
        );
    }

    #[test]
    fn subtemplate_targets_prefer_explicit_template() {
        let mut schema = Schema::new("widget");
        schema.define_subtemplate(
            "doodads",
            FieldOptions::list().singular("doodad").template("thingamabob"),
        );
        let Some(FieldMatch::Field(definition)) = schema.find_field("doodads") else {
            panic!("expected field");
        };
        assert_eq!(definition.target_candidates(), vec!["thingamabob", "doodad"]);
    }
}
