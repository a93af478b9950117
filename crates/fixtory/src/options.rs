use indexmap::IndexMap;

use crate::errors::{Error, Result};
use crate::value::Value;

/// Options for a top-level build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Preset key; `Null` behaves like no preset.
    pub preset: Option<Value>,
    /// Number of records; must be a positive integer when present.
    pub quantity: Option<Value>,
    /// Whether the schema's default hooks run. Nested builds always run them.
    pub defaults: bool,
    /// Build-time inputs visible to every template in the tree.
    pub transients: IndexMap<String, Value>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            preset: None,
            quantity: None,
            defaults: true,
            transients: IndexMap::new(),
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preset(mut self, preset: impl Into<Value>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    pub fn quantity(mut self, quantity: impl Into<Value>) -> Self {
        self.quantity = Some(quantity.into());
        self
    }

    pub fn without_defaults(mut self) -> Self {
        self.defaults = false;
        self
    }

    pub fn transient(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.transients.insert(name.into(), value.into());
        self
    }

    /// Validated quantity, defaulting to one.
    pub(crate) fn resolved_quantity(&self) -> Result<usize> {
        match &self.quantity {
            Some(quantity) => quantity_of(quantity),
            None => Ok(1),
        }
    }
}

/// Interpret a value as a record count.
pub(crate) fn quantity_of(value: &Value) -> Result<usize> {
    match value {
        Value::Int(count) if *count > 0 => {
            usize::try_from(*count).map_err(|_| Error::InvalidQuantity(count.to_string()))
        }
        Value::Int(count) => Err(Error::NonPositiveQuantity(*count)),
        other => Err(Error::InvalidQuantity(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_a_positive_integer() {
        assert_eq!(quantity_of(&Value::Int(3)).expect("quantity"), 3);
        assert!(matches!(
            quantity_of(&Value::Int(0)),
            Err(Error::NonPositiveQuantity(0))
        ));
        assert!(matches!(
            quantity_of(&Value::Int(-2)),
            Err(Error::NonPositiveQuantity(-2))
        ));
        assert!(matches!(
            quantity_of(&Value::from("two")),
            Err(Error::InvalidQuantity(_))
        ));
    }

    #[test]
    fn defaults_are_on_and_quantity_defaults_to_one() {
        let options = BuildOptions::new().transient("kind", "round");
        assert!(options.defaults);
        assert_eq!(options.resolved_quantity().expect("quantity"), 1);
        assert!(!options.without_defaults().defaults);
    }
}
