//! Merger: fold validated layers into one dataset.
//!
//! Providers merge shallowly by id, each top-level field last-wins. Models
//! merge by `(provider_id, model_id)` through one recursive routine that
//! consults [`MODEL_MERGE_RULES`] for the strategy at each field path:
//!
//! | Path                | Strategy |
//! |---------------------|----------|
//! | `aliases`           | union    |
//! | `tags`              | union    |
//! | `modalities.input`  | union    |
//! | `modalities.output` | union    |
//! | anything else       | replace  |
//!
//! Under `replace`, two objects recurse key by key and everything else takes
//! the higher layer's value. Under `union`, two lists concatenate lower then
//! higher and keep the first occurrence of each element; if either side is
//! not a list the rule degrades to `replace`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::dataset::CanonicalDataset;
use crate::domain::ids::{ModelKey, ProviderId};
use crate::domain::model::Model;
use crate::obs;
use crate::pattern::ModelPattern;
use crate::pipeline::finalize::default_chat;
use crate::pipeline::validate::ValidatedLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Replace,
    Union,
}

/// Field paths merged by order-preserving union. Every other path replaces.
pub const MODEL_MERGE_RULES: &[(&str, MergeStrategy)] = &[
    ("aliases", MergeStrategy::Union),
    ("tags", MergeStrategy::Union),
    ("modalities.input", MergeStrategy::Union),
    ("modalities.output", MergeStrategy::Union),
];

pub fn strategy_for(path: &str) -> MergeStrategy {
    MODEL_MERGE_RULES
        .iter()
        .find(|(rule, _)| *rule == path)
        .map(|(_, strategy)| *strategy)
        .unwrap_or(MergeStrategy::Replace)
}

/// Merge `higher` into `lower` field by field, starting at path `prefix`.
pub fn merge_fields(lower: &mut Map<String, Value>, higher: &Map<String, Value>, prefix: &str) {
    for (key, incoming) in higher {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match lower.get_mut(key) {
            Some(existing) => merge_value(&path, existing, incoming),
            None => {
                lower.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn merge_value(path: &str, lower: &mut Value, higher: &Value) {
    match strategy_for(path) {
        MergeStrategy::Union => {
            if let (Value::Array(existing), Value::Array(incoming)) = (&mut *lower, higher) {
                union_into(existing, incoming);
                return;
            }
        }
        MergeStrategy::Replace => {
            if let (Value::Object(existing), Value::Object(incoming)) = (&mut *lower, higher) {
                merge_fields(existing, incoming, path);
                return;
            }
        }
    }
    *lower = higher.clone();
}

fn union_into(existing: &mut Vec<Value>, incoming: &[Value]) {
    let mut merged: Vec<Value> = Vec::with_capacity(existing.len() + incoming.len());
    for value in existing.drain(..).chain(incoming.iter().cloned()) {
        if !merged.contains(&value) {
            merged.push(value);
        }
    }
    *existing = merged;
}

/// Merged but not yet finalized records, keyed by identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDataset {
    pub providers: BTreeMap<ProviderId, Map<String, Value>>,
    pub models: BTreeMap<ModelKey, Map<String, Value>>,
}

/// What [`MergedDataset::apply_exclusions`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    pub models: Vec<ModelKey>,
    /// Aliases stripped from surviving models because they name an
    /// excluded id.
    pub aliases: usize,
}

impl MergedDataset {
    /// A single layer as a dataset. Repeated ids inside the layer merge in
    /// record order.
    pub fn from_layer(layer: &ValidatedLayer) -> Self {
        let mut merged = Self::default();
        for record in &layer.providers {
            merged.absorb_provider(record.id.clone(), &record.fields);
        }
        for record in &layer.models {
            let key = ModelKey::new(record.provider.clone(), record.model_id.clone());
            merged.absorb_model(key, &record.fields);
        }
        merged
    }

    /// Re-open a finalized dataset so another layer can be merged over it.
    ///
    /// Values the finalizer would fill in anyway are left absent, so they
    /// are derived again from the merged result.
    pub fn from_dataset(dataset: &CanonicalDataset) -> Self {
        let mut merged = Self::default();
        for entry in &dataset.providers {
            if let Ok(Value::Object(mut fields)) = serde_json::to_value(&entry.provider) {
                fields.remove("id");
                if entry.provider.name == entry.provider.id.as_str() {
                    fields.remove("name");
                }
                merged.providers.insert(entry.provider.id.clone(), fields);
            }
            for model in &entry.models {
                if let Ok(Value::Object(mut fields)) = serde_json::to_value(model) {
                    fields.remove("provider_id");
                    fields.remove("model_id");
                    strip_derived(model, &mut fields);
                    merged.models.insert(model.key(), fields);
                }
            }
        }
        merged
    }

    /// `lower` with `higher` merged over it.
    pub fn merge(mut lower: Self, higher: &Self) -> Self {
        lower.absorb(higher);
        lower
    }

    pub fn absorb(&mut self, higher: &Self) {
        for (id, fields) in &higher.providers {
            self.absorb_provider(id.clone(), fields);
        }
        for (key, fields) in &higher.models {
            self.absorb_model(key.clone(), fields);
        }
    }

    fn absorb_provider(&mut self, id: ProviderId, fields: &Map<String, Value>) {
        let existing = self.providers.entry(id).or_default();
        for (key, value) in fields {
            existing.insert(key.clone(), value.clone());
        }
    }

    fn absorb_model(&mut self, key: ModelKey, fields: &Map<String, Value>) {
        match self.models.get_mut(&key) {
            Some(existing) => merge_fields(existing, fields, ""),
            None => {
                self.models.insert(key, fields.clone());
            }
        }
    }

    /// Remove every model matched by its provider's `exclude_models`, and
    /// every alias of the provider's remaining models that the same patterns
    /// match, so an excluded id cannot resolve through another model.
    ///
    /// Runs after merge so it also suppresses models that only exist because
    /// of merging.
    pub fn apply_exclusions(&mut self) -> Exclusions {
        let mut outcome = Exclusions::default();
        for (provider, fields) in &self.providers {
            let patterns = exclusion_patterns(provider, fields);
            if patterns.is_empty() {
                continue;
            }
            let excluded = |id: &str| patterns.iter().any(|p| p.is_match(id));
            let doomed: Vec<ModelKey> = self
                .models
                .keys()
                .filter(|key| &key.provider == provider && excluded(&key.model))
                .cloned()
                .collect();
            for key in &doomed {
                self.models.remove(key);
            }

            let mut aliases = 0;
            for (key, fields) in self.models.iter_mut() {
                if &key.provider != provider {
                    continue;
                }
                let Some(Value::Array(list)) = fields.get_mut("aliases") else {
                    continue;
                };
                let before = list.len();
                list.retain(|alias| !alias.as_str().is_some_and(|a| excluded(a)));
                aliases += before - list.len();
            }

            if !doomed.is_empty() || aliases > 0 {
                obs::emit_models_excluded(provider.as_str(), doomed.len(), aliases);
            }
            outcome.models.extend(doomed);
            outcome.aliases += aliases;
        }
        outcome
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }
}

fn strip_derived(model: &Model, fields: &mut Map<String, Value>) {
    if model.provider_model_id == model.model_id {
        fields.remove("provider_model_id");
    }
    if model.name == model.model_id {
        fields.remove("name");
    }
    if model.capabilities.chat == default_chat(&model.modalities.output) {
        if let Some(Value::Object(caps)) = fields.get_mut("capabilities") {
            caps.remove("chat");
        }
    }
}

fn exclusion_patterns(provider: &ProviderId, fields: &Map<String, Value>) -> Vec<ModelPattern> {
    let Some(Value::Array(entries)) = fields.get("exclude_models") else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|raw| match ModelPattern::compile(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(provider = %provider, pattern = raw, error = %e, "invalid exclusion pattern ignored");
                None
            }
        })
        .collect()
}

/// Left fold of `layers`, lowest precedence first.
pub fn merge_layers(layers: &[ValidatedLayer]) -> MergedDataset {
    layers
        .iter()
        .map(MergedDataset::from_layer)
        .fold(MergedDataset::default(), |acc, layer| {
            MergedDataset::merge(acc, &layer)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn table_lookup() {
        assert_eq!(strategy_for("aliases"), MergeStrategy::Union);
        assert_eq!(strategy_for("modalities.output"), MergeStrategy::Union);
        assert_eq!(strategy_for("modalities"), MergeStrategy::Replace);
        assert_eq!(strategy_for("extra.aliases"), MergeStrategy::Replace);
    }

    #[test]
    fn union_keeps_first_occurrence() {
        let mut lower = obj(json!({"aliases": ["a"]}));
        merge_fields(&mut lower, &obj(json!({"aliases": ["b", "a"]})), "");
        assert_eq!(lower["aliases"], json!(["a", "b"]));
    }

    #[test]
    fn union_dedupes_within_the_lower_layer_too() {
        let mut lower = obj(json!({"tags": ["x", "x", "y"]}));
        merge_fields(&mut lower, &obj(json!({"tags": ["y", "z"]})), "");
        assert_eq!(lower["tags"], json!(["x", "y", "z"]));
    }

    #[test]
    fn nested_objects_recurse_and_leaves_replace() {
        let mut lower = obj(json!({
            "cost": {"input": 1.0, "output": 2.0},
            "modalities": {"input": ["text"], "output": ["text"]}
        }));
        let higher = obj(json!({
            "cost": {"input": 0.5},
            "modalities": {"input": ["image"]}
        }));
        merge_fields(&mut lower, &higher, "");
        assert_eq!(lower["cost"], json!({"input": 0.5, "output": 2.0}));
        assert_eq!(lower["modalities"]["input"], json!(["text", "image"]));
        assert_eq!(lower["modalities"]["output"], json!(["text"]));
    }

    #[test]
    fn lists_outside_the_table_replace() {
        let mut lower = obj(json!({"extra": {"regions": ["us", "eu"]}}));
        merge_fields(&mut lower, &obj(json!({"extra": {"regions": ["ap"]}})), "");
        assert_eq!(lower["extra"]["regions"], json!(["ap"]));
    }

    #[test]
    fn type_mismatch_degrades_to_replace() {
        let mut lower = obj(json!({"aliases": ["a"], "limits": {"context_window": 8192}}));
        merge_fields(
            &mut lower,
            &obj(json!({"aliases": "solo", "limits": 4096})),
            "",
        );
        assert_eq!(lower["aliases"], json!("solo"));
        assert_eq!(lower["limits"], json!(4096));
    }

    #[test]
    fn exclusions_strip_matching_aliases_from_survivors() {
        let mut ids = crate::domain::ids::IdSpace::new();
        let openai = ids.intern("openai").expect("intern");
        let anthropic = ids.intern("anthropic").expect("intern");
        let mut merged = MergedDataset::default();
        merged
            .providers
            .insert(openai.clone(), obj(json!({"exclude_models": ["*-preview"]})));
        merged.models.insert(ModelKey::new(openai.clone(), "o1-preview"), Map::new());
        merged.models.insert(
            ModelKey::new(openai.clone(), "o1"),
            obj(json!({"aliases": ["o1-preview", "o1-2024"]})),
        );
        merged.models.insert(
            ModelKey::new(anthropic.clone(), "claude"),
            obj(json!({"aliases": ["claude-preview"]})),
        );

        let outcome = merged.apply_exclusions();
        assert_eq!(outcome.models, vec![ModelKey::new(openai.clone(), "o1-preview")]);
        assert_eq!(outcome.aliases, 1);
        assert_eq!(merged.models[&ModelKey::new(openai, "o1")]["aliases"], json!(["o1-2024"]));
        // Other providers' patterns do not apply.
        assert_eq!(
            merged.models[&ModelKey::new(anthropic, "claude")]["aliases"],
            json!(["claude-preview"])
        );
    }
}
