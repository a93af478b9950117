//! Declarative JSON/TOML manifests for fixture templates.
//!
//! A manifest declares template shapes (fields, sequences, dictionaries,
//! value presets and preset-backed default hooks) and registers them into a
//! [`fixtory::Registry`]. Closures such as macros and instantiators stay in code.

pub mod errors;
pub mod load;
pub mod model;
pub mod schema;
pub mod validate;

pub use errors::{IssueSeverity, ManifestError, Result, ValidationIssue, ValidationReport};
pub use load::{apply, from_json_str, from_toml_str, load_into, load_path};
pub use model::{
    DictionaryManifest, FieldManifest, FieldValue, GeneratorSpec, HookManifest, RegistryManifest,
    SchemaManifest, SequenceManifest, SequenceRef,
};
pub use schema::manifest_json_schema;
pub use validate::validate_manifest;
