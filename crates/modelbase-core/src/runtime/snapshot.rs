//! Snapshot indexer: the filtered, indexed, read-only view served to readers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::dataset::CanonicalDataset;
use crate::domain::digest::content_digest;
use crate::domain::error::{CatalogError, Result};
use crate::domain::ids::{IdSpace, ModelKey, ProviderId};
use crate::domain::model::{Model, Provider};
use crate::runtime::filter::{CompiledFilter, FilterConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotMeta {
    /// Build provenance of the dataset the snapshot was derived from.
    pub source_generated_at: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
    /// Digest over the filtered content and prefer order.
    pub digest: String,
    pub providers: usize,
    pub models: usize,
}

/// A runtime snapshot. Never mutated after construction; a reload builds a
/// new one.
#[derive(Debug, Clone)]
pub struct Snapshot {
    providers: Vec<Arc<Provider>>,
    models_by_provider: HashMap<ProviderId, Vec<Arc<Model>>>,
    providers_by_id: HashMap<ProviderId, Arc<Provider>>,
    models_by_key: HashMap<ModelKey, Arc<Model>>,
    /// `(provider, alias)` to canonical model id.
    aliases_by_key: HashMap<ModelKey, String>,
    base: Arc<CanonicalDataset>,
    filter: CompiledFilter,
    ids: IdSpace,
    meta: SnapshotMeta,
}

#[derive(Serialize)]
struct ContentFingerprint<'a> {
    providers: Vec<&'a Provider>,
    models: Vec<&'a Model>,
    prefer: &'a [ProviderId],
}

impl Snapshot {
    /// Filter and index `base`.
    ///
    /// Fails with [`CatalogError::FilterEliminatedAll`] when `base` has
    /// models but none survive the filter.
    pub fn build(base: Arc<CanonicalDataset>, config: &FilterConfig) -> Result<Self> {
        let ids = base.id_space();
        let filter = CompiledFilter::compile(config, &ids);

        let mut providers = Vec::new();
        let mut models_by_provider = HashMap::new();
        let mut providers_by_id = HashMap::new();
        let mut models_by_key = HashMap::new();
        let mut aliases_by_key = HashMap::new();

        for entry in &base.providers {
            let id = &entry.provider.id;
            let kept: Vec<Arc<Model>> = entry
                .models
                .iter()
                .filter(|m| filter.is_allowed(id.as_str(), &m.model_id))
                .map(|m| Arc::new(m.clone()))
                .collect();
            if kept.is_empty() {
                continue;
            }

            for model in &kept {
                models_by_key.insert(model.key(), Arc::clone(model));
                for alias in &model.aliases {
                    aliases_by_key.insert(ModelKey::new(id.clone(), alias.clone()), model.model_id.clone());
                }
            }
            let provider = Arc::new(entry.provider.clone());
            providers_by_id.insert(id.clone(), Arc::clone(&provider));
            providers.push(provider);
            models_by_provider.insert(id.clone(), kept);
        }

        if models_by_key.is_empty() && !base.is_empty() {
            return Err(CatalogError::FilterEliminatedAll {
                summary: filter.summary(),
            });
        }

        let fingerprint = ContentFingerprint {
            providers: providers.iter().map(|p| p.as_ref()).collect(),
            models: providers
                .iter()
                .flat_map(|p| models_by_provider[&p.id].iter().map(|m| m.as_ref()))
                .collect(),
            prefer: filter.prefer(),
        };
        let digest = content_digest(&fingerprint)?;

        let meta = SnapshotMeta {
            source_generated_at: base.generated_at,
            loaded_at: Utc::now(),
            digest,
            providers: providers.len(),
            models: models_by_key.len(),
        };

        Ok(Self {
            providers,
            models_by_provider,
            providers_by_id,
            models_by_key,
            aliases_by_key,
            base,
            filter,
            ids,
            meta,
        })
    }

    /// Zero providers, zero models. Served when no dataset is available.
    pub fn empty() -> Self {
        let base = Arc::new(CanonicalDataset::empty());
        let fingerprint = ContentFingerprint {
            providers: Vec::new(),
            models: Vec::new(),
            prefer: &[],
        };
        let digest = content_digest(&fingerprint).unwrap_or_default();
        Self {
            providers: Vec::new(),
            models_by_provider: HashMap::new(),
            providers_by_id: HashMap::new(),
            models_by_key: HashMap::new(),
            aliases_by_key: HashMap::new(),
            meta: SnapshotMeta {
                source_generated_at: base.generated_at,
                loaded_at: Utc::now(),
                digest,
                providers: 0,
                models: 0,
            },
            base,
            filter: CompiledFilter::permissive(),
            ids: IdSpace::new(),
        }
    }

    /// Apply a different filter to the retained base dataset.
    pub fn refilter(&self, config: &FilterConfig) -> Result<Self> {
        Self::build(Arc::clone(&self.base), config)
    }

    /// Filtered providers in canonical order.
    pub fn providers(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&Arc<Provider>> {
        let id = self.ids.resolve(id)?;
        self.providers_by_id.get(&id)
    }

    /// Filtered models of one provider in canonical order.
    pub fn models_of(&self, provider: &ProviderId) -> &[Arc<Model>] {
        self.models_by_provider
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every filtered model in canonical order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.providers
            .iter()
            .flat_map(|p| self.models_of(&p.id).iter())
    }

    pub fn model_by_key(&self, key: &ModelKey) -> Option<&Arc<Model>> {
        self.models_by_key.get(key)
    }

    /// Canonical id an alias points to, if any.
    pub fn alias_target(&self, key: &ModelKey) -> Option<&str> {
        self.aliases_by_key.get(key).map(String::as_str)
    }

    pub fn alias_count(&self) -> usize {
        self.aliases_by_key.len()
    }

    /// The unfiltered dataset this snapshot was derived from.
    pub fn base(&self) -> &Arc<CanonicalDataset> {
        &self.base
    }

    pub fn filter(&self) -> &CompiledFilter {
        &self.filter
    }

    pub fn ids(&self) -> &IdSpace {
        &self.ids
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    pub fn digest(&self) -> &str {
        &self.meta.digest
    }

    pub fn is_empty(&self) -> bool {
        self.models_by_key.is_empty()
    }
}
