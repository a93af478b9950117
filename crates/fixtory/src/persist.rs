//! Recursive save walk over built records.

use tracing::{debug, trace};

use crate::errors::Result;
use crate::record::Record;
use crate::schema::Collection;
use crate::value::Value;

/// Save item fields, then subtemplate fields, in declaration order.
pub fn save_record(record: &Record) -> Result<()> {
    let schema = record.schema();
    debug!(template = %schema.name(), fields = record.len(), "saving record");

    for definition in schema.items().chain(schema.subtemplates()) {
        let Some(value) = record.get(definition.name()) else {
            continue;
        };
        match (definition.collection(), value) {
            (Collection::List, Value::List(values)) => {
                for value in values {
                    save_value(value)?;
                }
            }
            (Collection::Map, Value::Map(entries)) => {
                for value in entries.values() {
                    save_value(value)?;
                }
            }
            _ => save_value(value)?,
        }
    }

    Ok(())
}

/// Persist one value if it can be persisted; anything else is skipped.
pub fn save_value(value: &Value) -> Result<()> {
    match value {
        Value::Record(record) => save_record(record),
        Value::Entity(entity) => match entity.as_saveable() {
            Some(saveable) => {
                trace!(entity = ?entity, "saving entity");
                saveable.save()
            }
            None => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Persist an instantiator result: each element of a list or map, or the value itself.
pub fn save_instantiated(value: &Value) -> Result<()> {
    match value {
        Value::List(values) => values.iter().try_for_each(save_value),
        Value::Map(entries) => entries.values().try_for_each(save_value),
        other => save_value(other),
    }
}
