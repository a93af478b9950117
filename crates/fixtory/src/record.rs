use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::dictionary::DictionaryRef;
use crate::errors::{Error, Result};
use crate::persist;
use crate::schema::Schema;
use crate::sequence::Sequence;
use crate::value::Value;

/// A built template: ordered field values plus the build-time context that produced them.
#[derive(Clone)]
pub struct Record {
    schema: Rc<Schema>,
    pub(crate) fields: IndexMap<String, Value>,
    pub(crate) transients: IndexMap<String, Value>,
    pub(crate) sequences: HashMap<String, Sequence>,
    pub(crate) dictionaries: HashMap<String, DictionaryRef>,
}

impl Record {
    pub(crate) fn new(schema: Rc<Schema>, transients: IndexMap<String, Value>) -> Self {
        Self {
            schema,
            fields: IndexMap::new(),
            transients,
            sequences: HashMap::new(),
            dictionaries: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn schema_name(&self) -> &str {
        self.schema.name()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn transient(&self, name: &str) -> Option<&Value> {
        self.transients.get(name)
    }

    pub fn transients(&self) -> &IndexMap<String, Value> {
        &self.transients
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Persist every saveable value reachable from this record.
    pub fn save(&self) -> Result<()> {
        persist::save_record(self)
    }

    /// Convert the record into domain value(s) with a named instantiator.
    pub fn build(&self, instantiator: &str, args: &[Value]) -> Result<Value> {
        let recipe = self.schema.instantiator(instantiator).ok_or_else(|| {
            Error::UnknownInstantiator {
                template: self.schema.name().to_string(),
                instantiator: instantiator.to_string(),
            }
        })?;
        debug!(
            template = %self.schema.name(),
            instantiator,
            args = args.len(),
            "instantiating record"
        );
        recipe(self, args)
    }

    /// Like [`Record::build`], then persist whatever the instantiator returned.
    pub fn create(&self, instantiator: &str, args: &[Value]) -> Result<Value> {
        let value = self.build(instantiator, args)?;
        persist::save_instantiated(&value)?;
        Ok(value)
    }

    /// Rewind instance-scoped sequences; an empty `names` resets all of them.
    pub fn reset_sequences(&mut self, names: &[&str]) {
        for (name, sequence) in self.sequences.iter_mut() {
            if names.is_empty() || names.contains(&name.as_str()) {
                sequence.reset();
            }
        }
    }

    /// Clear instance-scoped dictionaries; an empty `names` clears all of them.
    pub fn reset_dictionaries(&mut self, names: &[&str]) {
        for (name, dictionary) in &self.dictionaries {
            if names.is_empty() || names.contains(&name.as_str()) {
                dictionary.borrow_mut().reset();
            }
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("schema", &self.schema.name())
            .field("fields", &self.fields)
            .finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Result of a schema build: one record, or a list when a quantity fanned out.
#[derive(Debug, Clone, PartialEq)]
pub enum Built {
    One(Record),
    Many(Vec<Record>),
}

impl Built {
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Built::One(record) => vec![record],
            Built::Many(records) => records,
        }
    }

    /// The single record, or the first one of a fan-out.
    pub fn into_record(self) -> Option<Record> {
        self.into_records().into_iter().next()
    }

    pub fn len(&self) -> usize {
        match self {
            Built::One(_) => 1,
            Built::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Built::One(record) => record.to_json(),
            Built::Many(records) => {
                serde_json::Value::Array(records.iter().map(Record::to_json).collect())
            }
        }
    }
}

impl From<Built> for Value {
    fn from(built: Built) -> Self {
        match built {
            Built::One(record) => Value::Record(record),
            Built::Many(records) => Value::List(records.into_iter().map(Value::Record).collect()),
        }
    }
}
