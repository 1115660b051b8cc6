//! Finalizer: typed records, derived fields, alias hygiene, canonical order.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::dataset::{CanonicalDataset, LayerProvenance, ProviderEntry, SCHEMA_VERSION};
use crate::domain::ids::ProviderId;
use crate::domain::model::{Model, Provider};
use crate::pipeline::merge::MergedDataset;

/// What the finalizer changed or gave up on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub aliases_removed: usize,
    pub synthesized_providers: usize,
    pub models_rejected: usize,
}

/// Build provenance stamped onto the finalized dataset.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub generated_at: DateTime<Utc>,
    pub source_digest: String,
    pub layers: Vec<LayerProvenance>,
}

pub fn finalize(merged: MergedDataset, provenance: Provenance) -> (CanonicalDataset, FinalizeReport) {
    let mut report = FinalizeReport::default();

    let mut grouped: BTreeMap<ProviderId, Vec<Model>> = BTreeMap::new();
    for (key, fields) in merged.models {
        match build_model(&key.provider, &key.model, fields) {
            Ok(model) => grouped.entry(key.provider).or_default().push(model),
            Err(e) => {
                tracing::warn!(model = %key, error = %e, "merged model rejected");
                report.models_rejected += 1;
            }
        }
    }

    let mut providers: BTreeMap<ProviderId, Provider> = BTreeMap::new();
    for (id, fields) in merged.providers {
        let provider = build_provider(&id, fields).unwrap_or_else(|e| {
            tracing::warn!(provider = %id, error = %e, "merged provider rejected; keeping identity only");
            Provider::bare(id.clone())
        });
        providers.insert(id, provider);
    }
    for id in grouped.keys() {
        if !providers.contains_key(id) {
            tracing::debug!(provider = %id, "synthesizing provider for orphaned models");
            providers.insert(id.clone(), Provider::bare(id.clone()));
            report.synthesized_providers += 1;
        }
    }

    let entries = providers
        .into_iter()
        .map(|(id, provider)| {
            let mut models = grouped.remove(&id).unwrap_or_default();
            models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
            report.aliases_removed += scrub_aliases(&id, &mut models);
            ProviderEntry { provider, models }
        })
        .collect();

    let dataset = CanonicalDataset {
        schema_version: SCHEMA_VERSION,
        generated_at: provenance.generated_at,
        source_digest: provenance.source_digest,
        layers: provenance.layers,
        providers: entries,
    };
    (dataset, report)
}

fn build_provider(id: &ProviderId, mut fields: Map<String, Value>) -> serde_json::Result<Provider> {
    fields.insert("id".to_string(), Value::String(id.to_string()));
    let mut provider: Provider = serde_json::from_value(Value::Object(fields))?;
    if provider.name.is_empty() {
        provider.name = id.to_string();
    }
    Ok(provider)
}

fn build_model(
    provider: &ProviderId,
    model_id: &str,
    mut fields: Map<String, Value>,
) -> serde_json::Result<Model> {
    derive_chat(&mut fields);
    fields.insert("provider_id".to_string(), Value::String(provider.to_string()));
    fields.insert("model_id".to_string(), Value::String(model_id.to_string()));

    let mut model: Model = serde_json::from_value(Value::Object(fields))?;
    if model.provider_model_id.is_empty() {
        model.provider_model_id = model.model_id.clone();
    }
    if model.name.is_empty() {
        model.name = model.model_id.clone();
    }
    model.capabilities.canonicalize();
    Ok(model)
}

/// `capabilities.chat` defaults to true for models that emit text or that
/// declare no output modalities at all.
pub(crate) fn default_chat<S: AsRef<str>>(outputs: &[S]) -> bool {
    outputs.is_empty() || outputs.iter().any(|m| m.as_ref() == "text")
}

fn derive_chat(fields: &mut Map<String, Value>) {
    let declared = fields
        .get("capabilities")
        .and_then(|caps| caps.get("chat"))
        .is_some();
    if declared {
        return;
    }
    let outputs: Vec<&str> = fields
        .get("modalities")
        .and_then(|m| m.get("output"))
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let chat = default_chat(&outputs);
    match fields.get_mut("capabilities") {
        Some(Value::Object(caps)) => {
            caps.insert("chat".to_string(), Value::Bool(chat));
        }
        Some(_) => {}
        None => {
            let mut caps = Map::new();
            caps.insert("chat".to_string(), Value::Bool(chat));
            fields.insert("capabilities".to_string(), Value::Object(caps));
        }
    }
}

/// Drop aliases that shadow a canonical id or that an earlier model (in
/// canonical order) already claimed. Returns how many were removed.
pub(crate) fn scrub_aliases(provider: &ProviderId, models: &mut [Model]) -> usize {
    let canonical: HashSet<String> = models.iter().map(|m| m.model_id.clone()).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut removed = 0;
    for model in models.iter_mut() {
        let before = model.aliases.len();
        model.aliases.retain(|alias| {
            let keep = alias != &model.model_id
                && !canonical.contains(alias)
                && claimed.insert(alias.clone());
            if !keep {
                tracing::warn!(
                    provider = %provider,
                    model = %model.model_id,
                    alias = %alias,
                    "alias collides with a canonical id or another model's alias; dropped"
                );
            }
            keep
        });
        removed += before - model.aliases.len();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{IdSpace, ModelKey};
    use serde_json::json;

    fn provenance() -> Provenance {
        Provenance {
            generated_at: Utc::now(),
            source_digest: "test".to_string(),
            layers: Vec::new(),
        }
    }

    fn merged(models: Vec<(&str, &str, Value)>) -> MergedDataset {
        let mut ids = IdSpace::new();
        let mut merged = MergedDataset::default();
        for (provider, model, fields) in models {
            let id = ids.intern(provider).expect("intern");
            let Value::Object(fields) = fields else {
                panic!("fields must be an object")
            };
            merged.models.insert(ModelKey::new(id, model), fields);
        }
        merged
    }

    #[test]
    fn models_are_sorted_and_grouped() {
        let (dataset, report) = finalize(
            merged(vec![
                ("openai", "gpt-4o", json!({})),
                ("anthropic", "claude-3-haiku", json!({})),
                ("openai", "gpt-3.5-turbo", json!({})),
            ]),
            provenance(),
        );
        let ids: Vec<_> = dataset.providers.iter().map(|p| p.provider.id.as_str()).collect();
        assert_eq!(ids, vec!["anthropic", "openai"]);
        let openai: Vec<_> = dataset.providers[1].models.iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(openai, vec!["gpt-3.5-turbo", "gpt-4o"]);
        assert_eq!(report.synthesized_providers, 2);
    }

    #[test]
    fn defaults_are_derived() {
        let (dataset, _) = finalize(
            merged(vec![
                ("openai", "gpt-4o", json!({})),
                ("openai", "dall-e-3", json!({"modalities": {"output": ["image"]}})),
                ("openai", "tts-1", json!({"name": "TTS", "provider_model_id": "tts-1-2024"})),
            ]),
            provenance(),
        );
        let gpt = dataset.model("openai", "gpt-4o").expect("gpt-4o");
        assert_eq!(gpt.provider_model_id, "gpt-4o");
        assert_eq!(gpt.name, "gpt-4o");
        assert!(gpt.capabilities.chat);

        let dalle = dataset.model("openai", "dall-e-3").expect("dall-e-3");
        assert!(!dalle.capabilities.chat);

        let tts = dataset.model("openai", "tts-1").expect("tts-1");
        assert_eq!(tts.provider_model_id, "tts-1-2024");
        assert_eq!(tts.name, "TTS");
    }

    #[test]
    fn explicit_chat_flag_wins() {
        let (dataset, _) = finalize(
            merged(vec![(
                "openai",
                "text-embedding-3-small",
                json!({"capabilities": {"chat": false}}),
            )]),
            provenance(),
        );
        let model = dataset
            .model("openai", "text-embedding-3-small")
            .expect("model");
        assert!(!model.capabilities.chat);
    }

    #[test]
    fn aliases_shadowing_canonical_ids_are_removed() {
        let (dataset, report) = finalize(
            merged(vec![
                ("openai", "gpt-4", json!({"aliases": ["gpt-4-turbo", "gpt4"]})),
                ("openai", "gpt-4-turbo", json!({"aliases": ["gpt4", "turbo"]})),
            ]),
            provenance(),
        );
        let gpt4 = dataset.model("openai", "gpt-4").expect("gpt-4");
        assert_eq!(gpt4.aliases, vec!["gpt4"]);
        let turbo = dataset.model("openai", "gpt-4-turbo").expect("turbo");
        assert_eq!(turbo.aliases, vec!["turbo"]);
        assert_eq!(report.aliases_removed, 2);
    }

    #[test]
    fn capability_shorthand_is_canonicalized() {
        let (dataset, _) = finalize(
            merged(vec![(
                "openai",
                "gpt-4o",
                json!({"capabilities": {"tools": true, "json": {"strict": true}}}),
            )]),
            provenance(),
        );
        let caps = dataset.model("openai", "gpt-4o").expect("model").capabilities;
        assert!(caps.chat);
        assert!(caps.tools.enabled);
        assert!(caps.json.schema);
    }
}
