//! Build-time pipeline: raw layers in, one canonical dataset out.
//!
//! # Modules
//!
//! - [`source`]: `LayerSource` adapters and concurrent fetch
//! - [`normalize`]: shape detection and field canonicalization
//! - [`validate`]: schema checks with per-layer drop counts
//! - [`merge`]: precedence merge driven by `MODEL_MERGE_RULES`
//! - [`finalize`]: typed records, derived fields, canonical order
//! - [`viability`]: non-fatal empty-dataset check
//! - [`build`]: `BuildPipeline` tying the stages together

pub mod build;
pub mod finalize;
pub mod merge;
pub mod normalize;
pub mod source;
pub mod validate;
pub mod viability;

pub use build::{layers_digest, prepare_layers, BuildOutput, BuildPipeline, BuildReport};
pub use finalize::{finalize, FinalizeReport, Provenance};
pub use merge::{
    merge_layers, strategy_for, Exclusions, MergeStrategy, MergedDataset, MODEL_MERGE_RULES,
};
pub use normalize::{normalize_layer, ModelRecord, NormalizedLayer, ProviderRecord};
pub use source::{fetch_all, JsonFileSource, LayerSource, RawLayer, StaticSource};
pub use validate::{validate_layer, DropReport, ValidatedLayer};
pub use viability::{check_viability, Viability};
