use thiserror::Error;

/// Errors raised while registering, building, or persisting templates.
#[derive(Debug, Error)]
pub enum Error {
    /// A build or create referenced a schema that is not registered.
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    /// A preset key matched neither an exact nor a pattern preset.
    #[error("missing preset matching '{preset}' for template '{template}'")]
    UnknownPreset { template: String, preset: String },
    /// Quantity was not an integer.
    #[error("quantity must be an integer, got {0}")]
    InvalidQuantity(String),
    /// Quantity was zero or negative.
    #[error("can't build {0} items; quantity must be positive")]
    NonPositiveQuantity(i64),
    /// A named-collection singular invocation omitted its key.
    #[error("must provide a name when adding to named field '{0}'")]
    MissingFieldName(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("unknown sequence '{0}'")]
    UnknownSequence(String),
    #[error("unknown dictionary '{0}'")]
    UnknownDictionary(String),
    #[error("unknown instantiator '{instantiator}' for template '{template}'")]
    UnknownInstantiator {
        template: String,
        instantiator: String,
    },
    /// An invocation matched no field, macro, or dictionary.
    #[error("template '{template}' has no field named '{field}'")]
    UnknownField { template: String, field: String },
    /// An embedded field points at a schema missing from the registry.
    #[error("could not find a template matching '{template}' for field '{field}'")]
    UnresolvedSubtemplate { field: String, template: String },
    /// A saveable value failed to persist.
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("logging error: {0}")]
    Logging(String),
}

/// Convenience alias for results returned by the engine.
pub type Result<T> = std::result::Result<T, Error>;
