//! Published state: the process-wide holder of the current snapshot.
//!
//! Readers load an `Arc` without locking and keep using it for as long as
//! they like. Reloads build a new snapshot off to the side, then swap it in
//! under a strictly increasing version. A failed reload leaves the current
//! publication in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use arc_swap::ArcSwapOption;
use serde_json::Value;

use crate::domain::dataset::CanonicalDataset;
use crate::domain::digest::content_digest;
use crate::domain::error::{LookupError, Result};
use crate::domain::ids::{IdSpace, ModelKey};
use crate::domain::model::{Capabilities, Model};
use crate::metrics::METRICS;
use crate::obs;
use crate::pipeline::build::{assemble, layers_digest, prepare_layers};
use crate::pipeline::merge::MergedDataset;
use crate::pipeline::source::RawLayer;
use crate::pipeline::validate::ValidatedLayer;
use crate::runtime::config::LoadConfig;
use crate::runtime::query::SelectQuery;
use crate::runtime::snapshot::Snapshot;

/// One publication: a snapshot and the version it was published under.
#[derive(Debug)]
pub struct Published {
    pub version: u64,
    pub snapshot: Arc<Snapshot>,
}

/// Result of a successful `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A new snapshot was swapped in.
    Published { version: u64, digest: String },
    /// The rebuilt snapshot matched the current digest; nothing changed.
    Unchanged { version: u64 },
    /// No packaged dataset was given; an empty (or custom-only) snapshot
    /// is being served.
    Fallback { version: u64 },
}

impl LoadOutcome {
    pub fn version(&self) -> u64 {
        match self {
            LoadOutcome::Published { version, .. }
            | LoadOutcome::Unchanged { version }
            | LoadOutcome::Fallback { version } => *version,
        }
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    current: ArcSwapOption<Published>,
    last_version: AtomicU64,
    attempts: AtomicU64,
    writer: Mutex<()>,
}

static GLOBAL: OnceLock<Catalog> = OnceLock::new();

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide instance. Tests should prefer [`Catalog::new`].
    pub fn global() -> &'static Catalog {
        GLOBAL.get_or_init(Catalog::new)
    }

    /// Build a snapshot from `artifact` (or an empty base when `None`),
    /// overlay `config.custom`, filter, and publish if the content changed.
    pub fn load(
        &self,
        artifact: Option<Arc<CanonicalDataset>>,
        config: &LoadConfig,
    ) -> Result<LoadOutcome> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let _span = obs::ReloadSpan::enter(attempt);

        let fallback = artifact.is_none();
        let base = artifact.unwrap_or_else(|| {
            obs::emit_snapshot_fallback("no packaged dataset available");
            Arc::new(CanonicalDataset::empty())
        });
        let base = match &config.custom {
            Some(custom) => Arc::new(overlay_custom(&base, custom)),
            None => base,
        };

        let snapshot = Snapshot::build(base, &config.filter()).map_err(|e| {
            obs::emit_reload_failed(&e);
            e
        })?;

        if let Some(current) = self.current.load_full() {
            if current.snapshot.digest() == snapshot.digest() {
                METRICS.inc_reloads_skipped();
                obs::emit_snapshot_unchanged(current.version, snapshot.digest());
                return Ok(if fallback {
                    LoadOutcome::Fallback {
                        version: current.version,
                    }
                } else {
                    LoadOutcome::Unchanged {
                        version: current.version,
                    }
                });
            }
        }

        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let digest = snapshot.digest().to_string();
        obs::emit_snapshot_published(version, snapshot.meta().providers, snapshot.meta().models, &digest);
        self.current.store(Some(Arc::new(Published {
            version,
            snapshot: Arc::new(snapshot),
        })));
        METRICS.inc_snapshots_published();

        Ok(if fallback {
            LoadOutcome::Fallback { version }
        } else {
            LoadOutcome::Published { version, digest }
        })
    }

    pub fn current(&self) -> Option<Arc<Published>> {
        self.current.load_full()
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.load().as_ref().map(|p| Arc::clone(&p.snapshot))
    }

    /// Version of the current publication, 0 before the first load.
    pub fn version(&self) -> u64 {
        self.current.load().as_ref().map(|p| p.version).unwrap_or(0)
    }

    pub fn lookup(&self, provider: &str, model: &str) -> std::result::Result<Arc<Model>, LookupError> {
        self.snapshot()
            .ok_or(LookupError::NoSnapshot)?
            .lookup(provider, model)
    }

    pub fn lookup_spec(&self, spec: &str) -> std::result::Result<Arc<Model>, LookupError> {
        self.snapshot().ok_or(LookupError::NoSnapshot)?.lookup_spec(spec)
    }

    pub fn capabilities(&self, spec: &str) -> Option<Capabilities> {
        self.snapshot()?.capabilities(spec)
    }

    pub fn is_allowed(&self, spec: &str) -> bool {
        self.snapshot().map(|s| s.is_allowed(spec)).unwrap_or(false)
    }

    pub fn select(&self, query: &SelectQuery) -> Option<ModelKey> {
        self.snapshot()?.select(query)
    }

    pub fn candidates(&self, query: &SelectQuery) -> Vec<ModelKey> {
        self.snapshot()
            .map(|s| s.candidates(query))
            .unwrap_or_default()
    }
}

/// Merge `custom` over `base` as the highest-precedence layer.
///
/// Providers the custom layer declares are registered; its models under a
/// provider that is neither in `base` nor declared are dropped.
fn overlay_custom(base: &CanonicalDataset, custom: &Value) -> CanonicalDataset {
    let known = base.id_space();
    let mut ids = known.clone();
    let raw = RawLayer::new("custom", custom.clone());
    let mut layers = prepare_layers(std::slice::from_ref(&raw), base.layers.len(), &mut ids);
    for layer in &mut layers {
        restrict_to_registered(layer, &known);
    }

    let overlay_digest = layers_digest(&layers);
    let source_digest = content_digest(&[base.source_digest.as_str(), overlay_digest.as_str()])
        .unwrap_or_default();
    assemble(
        MergedDataset::from_dataset(base),
        &layers,
        base.layers.clone(),
        base.generated_at,
        source_digest,
    )
    .dataset
}

fn restrict_to_registered(layer: &mut ValidatedLayer, known: &IdSpace) {
    let mut registered = known.clone();
    for record in layer.providers.iter().filter(|r| !r.synthesized) {
        registered.insert(record.id.clone());
    }

    layer.providers.retain(|r| registered.contains(r.id.as_str()));
    let before = layer.models.len();
    layer.models.retain(|record| {
        let keep = registered.contains(record.provider.as_str());
        if !keep {
            tracing::warn!(
                provider = %record.provider,
                model = %record.model_id,
                "custom model references an unregistered provider; dropped"
            );
        }
        keep
    });
    let dropped = before - layer.models.len();
    if dropped > 0 {
        layer.dropped.models += dropped;
        *layer
            .dropped
            .reasons
            .entry("unregistered_provider".to_string())
            .or_insert(0) += dropped;
    }
}
