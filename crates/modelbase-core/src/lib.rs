//! Modelbase Core Library
//!
//! Layered provider/model catalog. The build pipeline turns ordered source
//! layers into one canonical dataset; the runtime side filters, indexes and
//! publishes it as an immutable snapshot with capability-based selection.

pub mod artifact;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod pattern;
pub mod pipeline;
pub mod runtime;
pub mod telemetry;

pub use artifact::{load_artifact, read_artifact, read_artifact_if_present, write_artifact};

pub use domain::{
    canonical_provider_id, Capabilities, CanonicalDataset, CatalogError, IdSpace, LookupError,
    Model, ModelKey, ModelSpec, Provider, ProviderEntry, ProviderId, Result, SCHEMA_VERSION,
};

pub use pattern::ModelPattern;

pub use pipeline::{
    BuildOutput, BuildPipeline, BuildReport, JsonFileSource, LayerSource, MergeStrategy,
    MergedDataset, RawLayer, StaticSource, Viability, MODEL_MERGE_RULES,
};

pub use runtime::{
    Capability, Catalog, CompiledFilter, FilterConfig, FilterWarning, LoadConfig, LoadOutcome,
    Predicate, ProviderRules, Rules, SelectQuery, Snapshot, SnapshotMeta,
};

pub use telemetry::init_tracing;

/// Modelbase version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
