//! Structured observability hooks for builds and snapshot publication.
//!
//! Every hook emits one event with an `event = "..."` field so log
//! pipelines can key on it. Verbosity follows `MODELBASE_LOG` / `RUST_LOG`
//! (see [`crate::telemetry::init_tracing`]).

use tracing::{debug, info, warn};

use crate::pipeline::validate::DropReport;

/// RAII guard for a reload-scoped span.
pub struct ReloadSpan {
    _span: tracing::span::EnteredSpan,
}

impl ReloadSpan {
    pub fn enter(attempt: u64) -> Self {
        let span = tracing::info_span!("modelbase.reload", attempt = attempt);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: one layer finished validation. Escalates to `warn!` when
/// records were dropped.
pub fn emit_layer_validated(layer: &str, providers: usize, models: usize, dropped: &DropReport) {
    if dropped.total() > 0 {
        warn!(
            event = "layer.validated",
            layer = %layer,
            providers = providers,
            models = models,
            dropped = dropped.total(),
            reasons = ?dropped.reasons,
        );
    } else {
        debug!(event = "layer.validated", layer = %layer, providers = providers, models = models);
    }
}

/// Emit event: provider exclusions removed models (and aliases naming them)
/// after merge.
pub fn emit_models_excluded(provider: &str, count: usize, aliases: usize) {
    info!(event = "merge.excluded", provider = %provider, count = count, aliases = aliases);
}

pub fn emit_build_finished(
    layers: usize,
    providers: usize,
    models: usize,
    dropped: usize,
    excluded: usize,
) {
    info!(
        event = "build.finished",
        layers = layers,
        providers = providers,
        models = models,
        dropped = dropped,
        excluded = excluded,
    );
}

/// Emit event: the finalized dataset has zero models.
pub fn emit_build_empty(providers: usize) {
    warn!(
        event = "build.empty",
        providers = providers,
        "catalog build produced zero models"
    );
}

pub fn emit_filter_warning(warning: &dyn std::fmt::Display) {
    warn!(event = "filter.warning", warning = %warning);
}

pub fn emit_snapshot_published(version: u64, providers: usize, models: usize, digest: &str) {
    info!(
        event = "snapshot.published",
        version = version,
        providers = providers,
        models = models,
        digest = %short(digest),
    );
}

/// Emit event: reload produced the digest already published.
pub fn emit_snapshot_unchanged(version: u64, digest: &str) {
    debug!(event = "snapshot.unchanged", version = version, digest = %short(digest));
}

/// Emit event: no packaged dataset; an empty snapshot is served instead.
pub fn emit_snapshot_fallback(reason: &str) {
    warn!(event = "snapshot.fallback", reason = %reason, "serving empty catalog");
}

pub fn emit_reload_failed(error: &dyn std::fmt::Display) {
    warn!(event = "reload.failed", error = %error);
}

fn short(digest: &str) -> &str {
    &digest[..12.min(digest.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_span_enters() {
        let _span = ReloadSpan::enter(1);
    }

    #[test]
    fn short_digest_handles_short_input() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short("0123456789abcdef"), "0123456789ab");
    }
}
