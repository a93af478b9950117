use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;
use tracing::trace;

use crate::errors::Result;
use crate::template::Template;
use crate::value::Value;

/// Recipe run against a template under construction.
pub type Recipe = Rc<dyn Fn(&mut Template<'_>) -> Result<()>>;

/// Pattern preset recipe; also receives the key that matched.
pub type PatternRecipe = Rc<dyn Fn(&mut Template<'_>, &Value) -> Result<()>>;

/// Wrap a closure as a shareable [`Recipe`].
pub fn recipe(f: impl Fn(&mut Template<'_>) -> Result<()> + 'static) -> Recipe {
    Rc::new(f)
}

/// Wrap a closure as a shareable [`PatternRecipe`].
pub fn pattern_recipe(
    f: impl Fn(&mut Template<'_>, &Value) -> Result<()> + 'static,
) -> PatternRecipe {
    Rc::new(f)
}

#[derive(Clone)]
pub enum PresetKey {
    Exact(String),
    Pattern(Regex),
}

impl fmt::Display for PresetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetKey::Exact(name) => f.write_str(name),
            PresetKey::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

#[derive(Clone)]
enum PresetRecipe {
    Exact(Recipe),
    Pattern(PatternRecipe),
}

/// Named alternate recipe for populating a record.
#[derive(Clone)]
pub struct PresetDefinition {
    key: PresetKey,
    recipe: PresetRecipe,
}

impl PresetDefinition {
    pub fn key(&self) -> &PresetKey {
        &self.key
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self.key, PresetKey::Pattern(_))
    }
}

impl fmt::Debug for PresetDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresetDefinition")
            .field("key", &self.key.to_string())
            .finish_non_exhaustive()
    }
}

/// A resolved preset together with the key that selected it.
#[derive(Debug, Clone)]
pub struct PresetMatch {
    definition: Rc<PresetDefinition>,
    key: Value,
}

impl PresetMatch {
    pub fn definition(&self) -> &PresetDefinition {
        &self.definition
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub(crate) fn apply(&self, template: &mut Template<'_>) -> Result<()> {
        trace!(preset = %self.definition.key, key = %self.key, "applying preset");
        match &self.definition.recipe {
            PresetRecipe::Exact(recipe) => recipe(template),
            PresetRecipe::Pattern(recipe) => recipe(template, &self.key),
        }
    }
}

/// Exact presets by name plus pattern presets in declaration order.
#[derive(Default, Clone)]
pub struct Presets {
    exact: IndexMap<String, Rc<PresetDefinition>>,
    patterns: Vec<Rc<PresetDefinition>>,
}

impl Presets {
    pub(crate) fn insert_exact(&mut self, name: String, recipe: Recipe) {
        let definition = PresetDefinition {
            key: PresetKey::Exact(name.clone()),
            recipe: PresetRecipe::Exact(recipe),
        };
        self.exact.insert(name, Rc::new(definition));
    }

    pub(crate) fn insert_pattern(&mut self, pattern: Regex, recipe: PatternRecipe) {
        self.patterns.retain(|existing| match &existing.key {
            PresetKey::Pattern(regex) => regex.as_str() != pattern.as_str(),
            PresetKey::Exact(_) => true,
        });
        self.patterns.push(Rc::new(PresetDefinition {
            key: PresetKey::Pattern(pattern),
            recipe: PresetRecipe::Pattern(recipe),
        }));
    }

    /// Exact key first, then the first pattern matching the stringified key.
    pub fn resolve(&self, key: &Value) -> Option<PresetMatch> {
        let name = preset_name(key);
        let definition = self.exact.get(&name).or_else(|| {
            self.patterns.iter().find(|definition| match &definition.key {
                PresetKey::Pattern(regex) => regex.is_match(&name),
                PresetKey::Exact(_) => false,
            })
        })?;
        Some(PresetMatch {
            definition: Rc::clone(definition),
            key: key.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresetDefinition> {
        self.exact
            .values()
            .chain(self.patterns.iter())
            .map(|definition| definition.as_ref())
    }
}

/// String form of a preset key used for lookup and pattern matching.
pub fn preset_name(key: &Value) -> String {
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Recipe {
        recipe(|_| Ok(()))
    }

    fn noop_pattern() -> PatternRecipe {
        pattern_recipe(|_, _| Ok(()))
    }

    #[test]
    fn exact_key_wins_over_pattern() {
        let mut presets = Presets::default();
        presets.insert_pattern(Regex::new("^sh").expect("regex"), noop_pattern());
        presets.insert_exact("shiny".to_string(), noop());

        let found = presets.resolve(&Value::from("shiny")).expect("preset");
        assert!(!found.definition().is_pattern());
    }

    #[test]
    fn patterns_match_in_declaration_order() {
        let mut presets = Presets::default();
        presets.insert_pattern(Regex::new(r"^\d+$").expect("regex"), noop_pattern());
        presets.insert_pattern(Regex::new(r"^\d").expect("regex"), noop_pattern());

        let found = presets.resolve(&Value::Int(42)).expect("preset");
        assert_eq!(found.definition().key().to_string(), r"/^\d+$/");
        assert_eq!(found.key(), &Value::Int(42));
        assert!(presets.resolve(&Value::from("rusty")).is_none());
    }
}
