use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::sequence::Scope;
use crate::value::{Key, Value};

/// Shared handle to a dictionary; template and global dictionaries outlive builds.
pub type DictionaryRef = Rc<RefCell<Dictionary>>;

/// Declaration options for a dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DictionaryOptions {
    #[serde(default)]
    pub scope: Scope,
}

impl DictionaryOptions {
    pub fn scoped(scope: Scope) -> Self {
        Self { scope }
    }
}

/// Caller-managed lookup cache. The engine never inserts entries on its own.
#[derive(Debug, Clone)]
pub struct Dictionary {
    name: String,
    scope: Scope,
    entries: HashMap<Key, Value>,
}

impl Dictionary {
    pub fn new(name: impl Into<String>, options: DictionaryOptions) -> Self {
        Self {
            name: name.into(),
            scope: options.scope,
            entries: HashMap::new(),
        }
    }

    pub fn shared(self) -> DictionaryRef {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn entry(&mut self, key: impl Into<Key>) -> Entry<'_, Key, Value> {
        self.entries.entry(key.into())
    }

    /// Memoize: return the cached value for `key`, computing it on a miss.
    pub fn get_or_insert_with(
        &mut self,
        key: impl Into<Key>,
        compute: impl FnOnce() -> Value,
    ) -> Value {
        self.entries.entry(key.into()).or_insert_with(compute).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
