use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use fixtory::{DictionaryOptions, FieldOptions, HookOptions, Scope};

/// Top-level manifest: global sequences and dictionaries plus template shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegistryManifest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<SequenceManifest>,
    /// Names of global dictionaries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dictionaries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<SchemaManifest>,
}

/// Declarative shape of one template.
///
/// Macros and instantiators are closures and can only be added in code; see
/// [`SchemaManifest::to_schema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<FieldManifest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtemplates: Vec<FieldManifest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<SequenceManifest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dictionaries: Vec<DictionaryManifest>,
    /// Preset name to field assignments, applied in document order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub presets: IndexMap<String, IndexMap<String, FieldValue>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<HookManifest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<HookManifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldManifest {
    pub name: String,
    #[serde(flatten)]
    pub options: FieldOptions,
    /// Item value used when an invocation supplies nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SequenceManifest {
    pub name: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub seed: i64,
    pub generator: GeneratorSpec,
}

/// Built-in counter generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorSpec {
    /// `{n}` becomes the counter; `{param}` becomes a generate-time param.
    Format { pattern: String },
    Int,
    Uuid,
    Email { domain: String },
    /// `start` (`YYYY-MM-DD`) plus `n` days.
    Date { start: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DictionaryManifest {
    pub name: String,
    #[serde(flatten)]
    pub options: DictionaryOptions,
}

/// Default hook that applies a preset of the same template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HookManifest {
    pub preset: String,
    #[serde(flatten)]
    pub options: HookOptions,
}

/// A literal value, or the next value of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Sequence(SequenceRef),
    Literal(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SequenceRef {
    #[serde(rename = "$sequence")]
    pub sequence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<serde_json::Value>,
    /// Read the registry-level sequence instead of the template's.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub global: bool,
}
