//! Error taxonomy for the catalog.

/// Catalog errors raised to callers.
///
/// Data-quality problems in source layers are never surfaced here; the
/// validator absorbs them and reports counts instead.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid model spec '{0}': expected \"provider:model\"")]
    InvalidSpec(String),

    #[error("invalid provider id '{0}': expected [a-z0-9][a-z0-9_.-]*")]
    InvalidProviderId(String),

    #[error("filter eliminated every model ({summary})")]
    FilterEliminatedAll { summary: String },

    #[error("no packaged dataset found at {0}")]
    MissingArtifact(String),

    #[error("invalid dataset artifact: {0}")]
    Artifact(String),

    #[error("invalid load configuration: {0}")]
    Config(String),

    #[error("source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Typed resolution failures returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("no snapshot has been loaded")]
    NoSnapshot,

    #[error("invalid model spec '{0}'")]
    InvalidSpec(String),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("unknown model '{model}' for provider '{provider}'")]
    UnknownModel { provider: String, model: String },
}
