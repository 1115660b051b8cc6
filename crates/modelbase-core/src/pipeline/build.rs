//! Build orchestration: normalize → validate → merge → exclude → finalize →
//! viability.
//!
//! The build is a pure function of its layers (plus the `generated_at`
//! stamp); only [`BuildPipeline::build_from_sources`] touches I/O.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::dataset::{CanonicalDataset, LayerProvenance};
use crate::domain::digest::content_digest;
use crate::domain::error::Result;
use crate::domain::ids::{IdSpace, ModelKey};
use crate::metrics::METRICS;
use crate::obs;
use crate::pipeline::finalize::{finalize, FinalizeReport, Provenance};
use crate::pipeline::merge::{Exclusions, MergedDataset};
use crate::pipeline::normalize::{normalize_layer, ModelRecord, ProviderRecord};
use crate::pipeline::source::{fetch_all, LayerSource, RawLayer};
use crate::pipeline::validate::{validate_layer, ValidatedLayer};
use crate::pipeline::viability::{check_viability, Viability};

/// Everything the build learned besides the dataset itself.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub layers: Vec<LayerProvenance>,
    /// Records dropped by validation across all layers.
    pub dropped: usize,
    /// Models removed by provider `exclude_models`.
    pub excluded: Vec<ModelKey>,
    /// Aliases stripped because they named an excluded id.
    pub aliases_excluded: usize,
    pub finalize: FinalizeReport,
    pub viability: Viability,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub dataset: CanonicalDataset,
    pub report: BuildReport,
}

#[derive(Debug, Clone, Default)]
pub struct BuildPipeline {
    generated_at: Option<DateTime<Utc>>,
}

impl BuildPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the provenance timestamp (otherwise the build time is used).
    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Build from layers ordered lowest precedence first.
    pub fn build(&self, layers: &[RawLayer]) -> BuildOutput {
        let mut ids = IdSpace::new();
        let validated = prepare_layers(layers, 0, &mut ids);
        let source_digest = layers_digest(&validated);
        let assembled = assemble(
            MergedDataset::default(),
            &validated,
            Vec::new(),
            self.generated_at.unwrap_or_else(Utc::now),
            source_digest,
        );

        for layer in &assembled.layers {
            METRICS.add_records_dropped(layer.dropped as u64);
            METRICS.inc_layers_built();
        }
        METRICS.add_models_excluded(assembled.exclusions.models.len() as u64);

        let dataset = assembled.dataset;
        let viability = check_viability(&dataset);
        obs::emit_build_finished(
            assembled.layers.len(),
            dataset.provider_count(),
            dataset.model_count(),
            assembled.dropped,
            assembled.exclusions.models.len(),
        );

        BuildOutput {
            dataset,
            report: BuildReport {
                layers: assembled.layers,
                dropped: assembled.dropped,
                excluded: assembled.exclusions.models,
                aliases_excluded: assembled.exclusions.aliases,
                finalize: assembled.finalize,
                viability,
            },
        }
    }

    pub async fn build_from_sources(&self, sources: &[Box<dyn LayerSource>]) -> Result<BuildOutput> {
        let layers = fetch_all(sources).await?;
        Ok(self.build(&layers))
    }
}

/// Normalize and validate `layers`, ranking them from `first_rank` upward.
pub fn prepare_layers(layers: &[RawLayer], first_rank: usize, ids: &mut IdSpace) -> Vec<ValidatedLayer> {
    layers
        .iter()
        .enumerate()
        .map(|(offset, raw)| validate_layer(normalize_layer(raw, first_rank + offset, ids)))
        .collect()
}

/// A merged and finalized dataset before any build-level reporting.
pub(crate) struct Assembled {
    pub dataset: CanonicalDataset,
    pub layers: Vec<LayerProvenance>,
    pub dropped: usize,
    pub exclusions: Exclusions,
    pub finalize: FinalizeReport,
}

/// Merge `layers` over `base` and finalize.
///
/// Emits no build-level metrics or events; load-time overlays go through
/// here on every reload.
pub(crate) fn assemble(
    base: MergedDataset,
    layers: &[ValidatedLayer],
    mut provenance: Vec<LayerProvenance>,
    generated_at: DateTime<Utc>,
    source_digest: String,
) -> Assembled {
    let mut merged = base;
    let mut dropped = 0;
    for layer in layers {
        merged.absorb(&MergedDataset::from_layer(layer));
        dropped += layer.dropped.total();
        provenance.push(LayerProvenance {
            name: layer.name.clone(),
            rank: layer.rank,
            providers: layer.providers.len(),
            models: layer.models.len(),
            dropped: layer.dropped.total(),
        });
    }

    let exclusions = merged.apply_exclusions();
    let (dataset, finalize_report) = finalize(
        merged,
        Provenance {
            generated_at,
            source_digest,
            layers: provenance.clone(),
        },
    );

    Assembled {
        dataset,
        layers: provenance,
        dropped,
        exclusions,
        finalize: finalize_report,
    }
}

#[derive(Serialize)]
struct LayerFingerprint<'a> {
    name: &'a str,
    rank: usize,
    providers: &'a [ProviderRecord],
    models: &'a [ModelRecord],
}

/// Digest over the validated inputs. Identical inputs give identical digests.
pub fn layers_digest(layers: &[ValidatedLayer]) -> String {
    let fingerprint: Vec<LayerFingerprint<'_>> = layers
        .iter()
        .map(|layer| LayerFingerprint {
            name: &layer.name,
            rank: layer.rank,
            providers: &layer.providers,
            models: &layer.models,
        })
        .collect();
    content_digest(&fingerprint).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not fingerprint layers");
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_build_still_produces_a_dataset() {
        let output = BuildPipeline::new().build(&[]);
        assert!(output.dataset.is_empty());
        assert!(!output.report.viability.is_viable());
    }

    #[test]
    fn provenance_records_every_layer() {
        let output = BuildPipeline::new().build(&[
            RawLayer::new("base", json!({"models": [{"provider_id": "openai", "model_id": "gpt-4"}]})),
            RawLayer::new("patch", json!({"models": [{"provider_id": "openai", "model_id": "bad", "cost": {"input": -2}}]})),
        ]);
        let names: Vec<_> = output.report.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["base", "patch"]);
        assert_eq!(output.report.layers[1].rank, 1);
        assert_eq!(output.report.layers[1].dropped, 1);
        assert_eq!(output.report.dropped, 1);
        assert_eq!(output.dataset.layers, output.report.layers);
    }

    #[test]
    fn source_digest_tracks_inputs() {
        let layer = |name: &str| RawLayer::new("base", json!({"models": [{"provider_id": "openai", "model_id": name}]}));
        let a = BuildPipeline::new().build(&[layer("gpt-4")]);
        let b = BuildPipeline::new().build(&[layer("gpt-4")]);
        let c = BuildPipeline::new().build(&[layer("gpt-4o")]);
        assert_eq!(a.dataset.source_digest, b.dataset.source_digest);
        assert_ne!(a.dataset.source_digest, c.dataset.source_digest);
    }
}
