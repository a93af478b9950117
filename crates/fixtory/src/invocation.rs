use crate::dictionary::DictionaryRef;
use crate::errors::Result;
use crate::template::Template;
use crate::value::Value;

/// Block attached to a field invocation.
#[derive(Clone, Copy)]
pub enum Block<'b> {
    /// Produces an item value; called once per produced item.
    Value(&'b dyn Fn() -> Value),
    /// Populates a nested template for a subtemplate field.
    Build(&'b dyn Fn(&mut Template<'_>) -> Result<()>),
}

/// Arguments and optional block passed to [`Template::invoke`].
#[derive(Clone, Default)]
pub struct Invocation<'b> {
    pub args: Vec<Value>,
    pub block: Option<Block<'b>>,
}

impl<'b> Invocation<'b> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_value<F>(mut self, produce: &'b F) -> Self
    where
        F: Fn() -> Value,
    {
        self.block = Some(Block::Value(produce));
        self
    }

    pub fn with_build<F>(mut self, recipe: &'b F) -> Self
    where
        F: Fn(&mut Template<'_>) -> Result<()>,
    {
        self.block = Some(Block::Build(recipe));
        self
    }

    pub fn has_block(&self) -> bool {
        self.block.is_some()
    }
}

/// What an invocation did to the template.
#[derive(Debug, Clone)]
pub enum Invoked {
    /// A field value was written.
    Stored,
    /// Nothing was written: the field was already set outside default mode,
    /// or the invocation produced no value.
    Skipped,
    /// A macro ran.
    Ran,
    /// The name resolved to a dictionary.
    Dictionary(DictionaryRef),
}

impl Invoked {
    pub fn is_stored(&self) -> bool {
        matches!(self, Invoked::Stored)
    }

    pub fn into_dictionary(self) -> Option<DictionaryRef> {
        match self {
            Invoked::Dictionary(dictionary) => Some(dictionary),
            _ => None,
        }
    }
}
