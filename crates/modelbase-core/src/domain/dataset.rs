//! The canonical dataset produced by one build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::IdSpace;
use crate::domain::model::{Model, Provider};

/// Current packaged-artifact schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Provenance of one source layer that fed the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerProvenance {
    pub name: String,
    /// Position in the precedence order (0 = lowest).
    pub rank: usize,
    /// Provider records kept after validation.
    pub providers: usize,
    /// Model records kept after validation.
    pub models: usize,
    /// Records dropped by the validator.
    pub dropped: usize,
}

/// A provider together with its models, sorted by `model_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(flatten)]
    pub provider: Provider,
    #[serde(default)]
    pub models: Vec<Model>,
}

/// Immutable output of the build pipeline.
///
/// # Invariants
///
/// - `providers` is sorted by id and ids are unique.
/// - Each entry's `models` is sorted by `model_id` and ids are unique within
///   the provider.
/// - No alias equals a canonical model id of the same provider, and no alias
///   is claimed by two models of the same provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDataset {
    pub schema_version: u32,
    /// Build provenance. Distinct from any later load timestamp.
    pub generated_at: DateTime<Utc>,
    /// Digest over the validated layer inputs.
    pub source_digest: String,
    #[serde(default)]
    pub layers: Vec<LayerProvenance>,
    pub providers: Vec<ProviderEntry>,
}

impl CanonicalDataset {
    /// A dataset with no providers, used when no artifact is available.
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            source_digest: String::new(),
            layers: Vec::new(),
            providers: Vec::new(),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn model_count(&self) -> usize {
        self.providers.iter().map(|p| p.models.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.model_count() == 0
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderEntry> {
        self.providers
            .binary_search_by(|entry| entry.provider.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.providers[idx])
    }

    pub fn model(&self, provider: &str, model_id: &str) -> Option<&Model> {
        self.provider(provider)?
            .models
            .iter()
            .find(|m| m.model_id == model_id)
    }

    /// Iterate every model in canonical order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.providers.iter().flat_map(|p| p.models.iter())
    }

    /// The identifier space covered by this dataset.
    pub fn id_space(&self) -> IdSpace {
        let mut ids = IdSpace::new();
        for entry in &self.providers {
            ids.insert(entry.provider.id.clone());
        }
        ids
    }
}
