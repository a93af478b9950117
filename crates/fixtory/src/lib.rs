//! Declarative fixture templates.
//!
//! A [`Registry`] holds named [`Schema`]s. Building a schema runs a recipe
//! against a [`Template`], which routes each invoked name to a field, macro,
//! or dictionary of the schema and produces a [`Record`]. Default hooks fill
//! whatever the caller left unset, presets provide named alternate recipes,
//! sequences hand out deterministic counters, and [`Record::save`] persists
//! every saveable value in the resulting tree.

pub mod dictionary;
pub mod errors;
pub mod generators;
pub mod hooks;
pub mod invocation;
pub mod logging;
pub mod options;
pub mod persist;
pub mod preset;
pub mod record;
pub mod registry;
pub mod schema;
pub mod sequence;
pub mod template;
pub mod value;

pub use dictionary::{Dictionary, DictionaryOptions, DictionaryRef};
pub use errors::{Error, Result};
pub use hooks::{HookContext, HookOptions, RunPolicy, Stage};
pub use invocation::{Block, Invocation, Invoked};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use options::BuildOptions;
pub use preset::{PresetMatch, Presets, Recipe};
pub use record::{Built, Record};
pub use registry::Registry;
pub use schema::{Collection, FieldDefinition, FieldKind, FieldMatch, FieldOptions, Schema};
pub use sequence::{GenerateOptions, Params, Scope, Sequence, SequenceOptions};
pub use template::Template;
pub use value::{Entity, Key, Saveable, Value, map};
