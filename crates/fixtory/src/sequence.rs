use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::value::{Key, Value};

/// Extra generator options, passed through to the generator untouched.
pub type Params = BTreeMap<String, Value>;

/// Sequence generator: `(counter, params) -> value`.
pub type SequenceFn = Rc<dyn Fn(i64, &Params) -> Value>;

/// Lifetime of sequence cursors and dictionary entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Shared process-wide through the registry.
    #[default]
    Global,
    /// Shared by every record built from one schema.
    Template,
    /// Fresh for every built record.
    Instance,
}

/// Declaration options for a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceOptions {
    #[serde(default)]
    pub scope: Scope,
    /// Starting counter value.
    #[serde(default)]
    pub seed: i64,
}

impl SequenceOptions {
    pub fn scoped(scope: Scope) -> Self {
        Self { scope, seed: 0 }
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }
}

/// Per-call options for `generate`.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Explicit counter; leaves the cursor untouched.
    pub seed: Option<i64>,
    /// Cursor dimension; `None` is the default dimension.
    pub dimension: Option<Key>,
    pub params: Params,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn dimension(mut self, dimension: impl Into<Key>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Per-dimension monotonic counter driving a value generator.
#[derive(Clone)]
pub struct Sequence {
    name: String,
    scope: Scope,
    seed: i64,
    generator: SequenceFn,
    cursors: HashMap<Option<Key>, i64>,
}

impl Sequence {
    pub fn new(
        name: impl Into<String>,
        options: SequenceOptions,
        generator: impl Fn(i64, &Params) -> Value + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            scope: options.scope,
            seed: options.seed,
            generator: Rc::new(generator),
            cursors: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Current counter for a dimension; untouched dimensions start at the seed.
    pub fn cursor(&self, dimension: Option<&Key>) -> i64 {
        self.cursors
            .get(&dimension.cloned())
            .copied()
            .unwrap_or(self.seed)
    }

    /// Produce the next value. An explicit `options.seed` never advances the cursor.
    pub fn generate(
        &mut self,
        options: &GenerateOptions,
        generator: Option<&dyn Fn(i64, &Params) -> Value>,
    ) -> Value {
        let counter = options
            .seed
            .unwrap_or_else(|| self.cursor(options.dimension.as_ref()));
        let value = match generator {
            Some(generator) => generator(counter, &options.params),
            None => (self.generator)(counter, &options.params),
        };

        if options.seed.is_none() {
            self.cursors
                .insert(options.dimension.clone(), counter.saturating_add(1));
        }

        trace!(
            sequence = %self.name,
            counter,
            dimension = ?options.dimension,
            explicit_seed = options.seed.is_some(),
            "sequence generated"
        );
        value
    }

    /// Rewind every dimension back to the declared seed.
    pub fn reset(&mut self) {
        self.cursors.clear();
    }

    /// Copy of this sequence with fresh cursors.
    pub fn fresh(&self) -> Self {
        Self {
            cursors: HashMap::new(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("seed", &self.seed)
            .field("cursors", &self.cursors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadway(seed: i64) -> Sequence {
        Sequence::new(
            "address",
            SequenceOptions::default().seed(seed),
            |n, _| Value::from(format!("{} BROADWAY", 2 * n + 2)),
        )
    }

    #[test]
    fn nth_call_uses_seed_plus_n_minus_one() {
        let mut sequence = broadway(5);
        let options = GenerateOptions::new();
        assert_eq!(sequence.generate(&options, None), Value::from("12 BROADWAY"));
        assert_eq!(sequence.generate(&options, None), Value::from("14 BROADWAY"));
        assert_eq!(sequence.cursor(None), 7);
    }

    #[test]
    fn explicit_seed_leaves_cursor_alone() {
        let mut sequence = broadway(0);
        for _ in 0..3 {
            let value = sequence.generate(&GenerateOptions::new().seed(10), None);
            assert_eq!(value, Value::from("22 BROADWAY"));
        }
        assert_eq!(sequence.cursor(None), 0);
    }

    #[test]
    fn reset_and_fresh_rewind_all_dimensions() {
        let mut sequence = broadway(3);
        sequence.generate(&GenerateOptions::new(), None);
        sequence.generate(&GenerateOptions::new().dimension("LAS VEGAS"), None);

        let fresh = sequence.fresh();
        assert_eq!(fresh.cursor(None), 3);
        assert_eq!(fresh.cursor(Some(&Key::from("LAS VEGAS"))), 3);

        sequence.reset();
        assert_eq!(sequence.cursor(None), 3);
        assert_eq!(sequence.cursor(Some(&Key::from("LAS VEGAS"))), 3);
    }
}
