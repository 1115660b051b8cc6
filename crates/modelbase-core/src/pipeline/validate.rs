//! Validator: drop records that do not conform to the provider/model schema.
//!
//! Validation never fails a build. Each rejected record is counted under a
//! short reason key and the per-layer totals are logged once.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::model::{Model, Provider};
use crate::obs;
use crate::pipeline::normalize::{ModelRecord, NormalizedLayer, ProviderRecord};

/// Per-layer drop counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropReport {
    pub providers: usize,
    pub models: usize,
    /// Records skipped by the normalizer for lack of a usable identity.
    pub unidentified: usize,
    pub reasons: BTreeMap<String, usize>,
}

impl DropReport {
    pub fn total(&self) -> usize {
        self.providers + self.models + self.unidentified
    }

    fn record(&mut self, reason: &str) {
        *self.reasons.entry(reason.to_string()).or_insert(0) += 1;
    }
}

/// A layer whose records all conform to the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLayer {
    pub name: String,
    pub rank: usize,
    pub providers: Vec<ProviderRecord>,
    pub models: Vec<ModelRecord>,
    pub dropped: DropReport,
}

pub fn validate_layer(layer: NormalizedLayer) -> ValidatedLayer {
    let mut dropped = DropReport {
        unidentified: layer.skipped,
        ..DropReport::default()
    };
    if layer.skipped > 0 {
        dropped
            .reasons
            .insert("unidentified".to_string(), layer.skipped);
    }

    let mut providers = Vec::with_capacity(layer.providers.len());
    for record in layer.providers {
        match check_provider(&record) {
            Ok(()) => providers.push(record),
            Err(reason) => {
                tracing::debug!(layer = %layer.name, provider = %record.id, reason, "provider dropped");
                dropped.providers += 1;
                dropped.record(reason);
            }
        }
    }

    let mut models = Vec::with_capacity(layer.models.len());
    for record in layer.models {
        match check_model(&record) {
            Ok(()) => models.push(record),
            Err(reason) => {
                tracing::debug!(
                    layer = %layer.name,
                    provider = %record.provider,
                    model = %record.model_id,
                    reason,
                    "model dropped"
                );
                dropped.models += 1;
                dropped.record(reason);
            }
        }
    }

    obs::emit_layer_validated(&layer.name, providers.len(), models.len(), &dropped);

    ValidatedLayer {
        name: layer.name,
        rank: layer.rank,
        providers,
        models,
        dropped,
    }
}

fn with_identity(fields: &Map<String, Value>, identity: &[(&str, &str)]) -> Value {
    let mut candidate = fields.clone();
    for (key, value) in identity {
        candidate.insert((*key).to_string(), Value::String((*value).to_string()));
    }
    Value::Object(candidate)
}

fn check_provider(record: &ProviderRecord) -> Result<(), &'static str> {
    let candidate = with_identity(&record.fields, &[("id", record.id.as_str())]);
    let provider: Provider = serde_json::from_value(candidate).map_err(|_| "schema")?;
    if provider.exclude_models.iter().any(|m| m.trim().is_empty()) {
        return Err("empty_exclusion");
    }
    Ok(())
}

fn check_model(record: &ModelRecord) -> Result<(), &'static str> {
    let candidate = with_identity(
        &record.fields,
        &[
            ("provider_id", record.provider.as_str()),
            ("model_id", &record.model_id),
        ],
    );
    let model: Model = serde_json::from_value(candidate).map_err(|_| "schema")?;
    if model
        .cost
        .channels()
        .iter()
        .any(|(_, v)| !v.is_finite() || *v < 0.0)
    {
        return Err("negative_cost");
    }
    if model.aliases.iter().any(|a| a.trim().is_empty()) {
        return Err("empty_alias");
    }
    if model
        .modalities
        .input
        .iter()
        .chain(&model.modalities.output)
        .any(|m| m.is_empty())
    {
        return Err("empty_modality");
    }
    Ok(())
}
