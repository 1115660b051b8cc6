//! Domain model for the catalog.
//!
//! - `ids`: interned provider ids, the closed `IdSpace`, model keys and specs
//! - `model`: `Provider`, `Model` and the capability tree
//! - `dataset`: the finalized `CanonicalDataset`
//! - `digest`: canonical JSON content digests
//! - `error`: `CatalogError` / `LookupError`

pub mod dataset;
pub mod digest;
pub mod error;
pub mod ids;
pub mod model;

pub use dataset::{CanonicalDataset, LayerProvenance, ProviderEntry, SCHEMA_VERSION};
pub use digest::{canonical_json, content_digest};
pub use error::{CatalogError, LookupError, Result};
pub use ids::{canonical_provider_id, IdSpace, ModelKey, ModelSpec, ProviderId};
pub use model::{
    Capabilities, Cost, Dates, Extra, JsonCaps, Limits, Modalities, Model, Provider,
    ReasoningCaps, StreamingCaps, ToolCaps,
};
