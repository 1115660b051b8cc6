//! Normalizer: canonicalize one raw layer into provider and model records.
//!
//! Records stay as JSON objects so that a field a layer does not mention is
//! *absent* rather than defaulted; the merger depends on that distinction.
//!
//! Accepted shapes:
//! - `{"providers": [{"id": .., "models": [{"id": ..}]}]}`
//! - `{"providers": {"openai": {"models": {"gpt-4": {..}}}}}`
//! - `{"models": [{"provider_id": .., "model_id": ..}]}` or a bare array of
//!   such records (flattened)

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::domain::ids::{IdSpace, ProviderId};
use crate::pipeline::source::RawLayer;

/// Model fields the schema knows by name. Anything else moves into `extra`.
const MODEL_FIELDS: &[&str] = &[
    "provider_model_id",
    "name",
    "family",
    "dates",
    "limits",
    "cost",
    "modalities",
    "capabilities",
    "tags",
    "deprecated",
    "aliases",
    "extra",
];

const PROVIDER_FIELDS: &[&str] = &["name", "base_url", "env", "doc", "exclude_models", "extra"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRecord {
    pub id: ProviderId,
    pub fields: Map<String, Value>,
    /// Created from a flattened model record rather than declared.
    #[serde(skip)]
    pub synthesized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    pub provider: ProviderId,
    pub model_id: String,
    pub fields: Map<String, Value>,
}

/// Output of normalizing one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLayer {
    pub name: String,
    pub rank: usize,
    pub providers: Vec<ProviderRecord>,
    pub models: Vec<ModelRecord>,
    /// Records with no usable identity (missing or malformed ids).
    pub skipped: usize,
}

/// Normalize `raw` at precedence `rank`, interning provider ids into `ids`.
pub fn normalize_layer(raw: &RawLayer, rank: usize, ids: &mut IdSpace) -> NormalizedLayer {
    let mut out = Normalizer {
        ids,
        layer: NormalizedLayer {
            name: raw.name.clone(),
            rank,
            providers: Vec::new(),
            models: Vec::new(),
            skipped: 0,
        },
        declared: HashSet::new(),
    };

    match &raw.data {
        Value::Array(records) => out.flattened(records),
        Value::Object(root) => {
            match root.get("providers") {
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        out.nested_provider(None, entry);
                    }
                }
                Some(Value::Object(entries)) => {
                    for (key, entry) in entries {
                        out.nested_provider(Some(key), entry);
                    }
                }
                Some(_) => out.layer.skipped += 1,
                None => {}
            }
            if let Some(Value::Array(records)) = root.get("models") {
                out.flattened(records);
            }
        }
        _ => {
            tracing::warn!(layer = %raw.name, "layer is neither an object nor an array");
        }
    }

    out.layer
}

struct Normalizer<'a> {
    ids: &'a mut IdSpace,
    layer: NormalizedLayer,
    declared: HashSet<ProviderId>,
}

impl Normalizer<'_> {
    fn nested_provider(&mut self, key: Option<&String>, entry: &Value) {
        let Some(obj) = entry.as_object() else {
            self.layer.skipped += 1;
            return;
        };
        let raw_id = str_field(obj, &["id", "provider_id"]).or(key.map(String::as_str));
        let Some(provider) = raw_id.and_then(|raw| self.ids.intern(raw).ok()) else {
            self.layer.skipped += 1;
            return;
        };

        self.declared.insert(provider.clone());
        self.layer.providers.push(ProviderRecord {
            id: provider.clone(),
            fields: provider_fields(obj),
            synthesized: false,
        });

        match obj.get("models") {
            Some(Value::Array(models)) => {
                for model in models {
                    self.model(&provider, None, model);
                }
            }
            Some(Value::Object(models)) => {
                for (model_key, model) in models {
                    self.model(&provider, Some(model_key), model);
                }
            }
            _ => {}
        }
    }

    fn flattened(&mut self, records: &[Value]) {
        for record in records {
            let provider = record
                .as_object()
                .and_then(|obj| str_field(obj, &["provider_id", "provider"]))
                .and_then(|raw| self.ids.intern(raw).ok());
            let Some(provider) = provider else {
                self.layer.skipped += 1;
                continue;
            };
            if self.declared.insert(provider.clone()) {
                self.layer.providers.push(ProviderRecord {
                    id: provider.clone(),
                    fields: Map::new(),
                    synthesized: true,
                });
            }
            self.model(&provider, None, record);
        }
    }

    fn model(&mut self, provider: &ProviderId, key: Option<&String>, record: &Value) {
        let Some(obj) = record.as_object() else {
            self.layer.skipped += 1;
            return;
        };
        let model_id = str_field(obj, &["model_id", "id"])
            .or(key.map(String::as_str))
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let Some(model_id) = model_id else {
            self.layer.skipped += 1;
            return;
        };
        self.layer.models.push(ModelRecord {
            provider: provider.clone(),
            model_id: model_id.to_string(),
            fields: model_fields(obj),
        });
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn provider_fields(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = Map::new();
    let mut extra = Map::new();
    for (key, value) in obj {
        if value.is_null() || matches!(key.as_str(), "id" | "provider_id" | "models") {
            continue;
        }
        match key.as_str() {
            "env" | "exclude_models" => {
                fields.insert(key.clone(), string_list(value, false));
            }
            "extra" => merge_extra(&mut extra, value),
            k if PROVIDER_FIELDS.contains(&k) => {
                fields.insert(key.clone(), drop_nulls(value));
            }
            _ => {
                extra.insert(key.clone(), drop_nulls(value));
            }
        }
    }
    if !extra.is_empty() {
        fields.insert("extra".to_string(), Value::Object(extra));
    }
    fields
}

fn model_fields(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = Map::new();
    let mut extra = Map::new();
    for (key, value) in obj {
        if value.is_null()
            || matches!(key.as_str(), "id" | "model_id" | "provider" | "provider_id")
        {
            continue;
        }
        let normalized = match key.as_str() {
            "cost" => map_object(value, coerce_number),
            "limits" => map_object(value, coerce_integer),
            "aliases" => string_list(value, false),
            "tags" => string_list(value, true),
            "modalities" => modalities(value),
            "capabilities" => capabilities(value),
            "deprecated" => coerce_bool(value),
            "extra" => {
                merge_extra(&mut extra, value);
                continue;
            }
            k if MODEL_FIELDS.contains(&k) => drop_nulls(value),
            _ => {
                extra.insert(key.clone(), drop_nulls(value));
                continue;
            }
        };
        fields.insert(key.clone(), normalized);
    }
    if !extra.is_empty() {
        fields.insert("extra".to_string(), Value::Object(extra));
    }
    fields
}

/// Capability sub-objects in object form, so a boolean shorthand in one
/// layer and a partial object in another merge leaf by leaf.
fn capabilities(value: &Value) -> Value {
    let Value::Object(caps) = value else {
        return drop_nulls(value);
    };
    let expand = |leaf: &str, flag: bool| {
        let mut obj = Map::new();
        obj.insert(leaf.to_string(), Value::Bool(flag));
        Value::Object(obj)
    };
    Value::Object(
        caps.iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(key, v)| {
                let flag = match coerce_bool(v) {
                    Value::Bool(flag) => Some(flag),
                    _ => None,
                };
                let expanded = match (key.as_str(), flag) {
                    ("chat", Some(flag)) => Value::Bool(flag),
                    ("tools" | "reasoning", Some(flag)) => expand("enabled", flag),
                    ("json", Some(flag)) => expand("native", flag),
                    ("streaming", Some(flag)) => expand("text", flag),
                    _ => drop_nulls(v),
                };
                (key.clone(), expanded)
            })
            .collect(),
    )
}

fn merge_extra(extra: &mut Map<String, Value>, value: &Value) {
    if let Value::Object(obj) = value {
        for (k, v) in obj {
            if !v.is_null() {
                extra.insert(k.clone(), drop_nulls(v));
            }
        }
    }
}

/// Remove `null` members recursively so that they read as absent.
fn drop_nulls(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), drop_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(drop_nulls).collect()),
        other => other.clone(),
    }
}

fn map_object(value: &Value, coerce: fn(&Value) -> Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), coerce(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A scalar string becomes a one-element list; entries are trimmed and
/// (optionally) lowercased. Non-string entries are left for the validator.
fn string_list(value: &Value, lowercase: bool) -> Value {
    let fold = |s: &str| {
        let s = s.trim();
        if lowercase {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    };
    match value {
        Value::String(s) => Value::Array(vec![Value::String(fold(s))]),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| match v {
                    Value::String(s) => Value::String(fold(s)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn modalities(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), string_list(v, true)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn parse_numeric(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn coerce_number(value: &Value) -> Value {
    match value {
        Value::String(s) => parse_numeric(s)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

fn coerce_integer(value: &Value) -> Value {
    let as_float = match value {
        Value::String(s) => parse_numeric(s),
        Value::Number(n) if !n.is_u64() && !n.is_i64() => n.as_f64(),
        _ => None,
    };
    match as_float {
        Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= u64::MAX as f64 => {
            Value::Number(Number::from(f as u64))
        }
        _ => value.clone(),
    }
}

fn coerce_bool(value: &Value) -> Value {
    match value {
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Value::Bool(true),
            "false" | "no" | "0" => Value::Bool(false),
            _ => value.clone(),
        },
        Value::Number(n) if n.as_u64() == Some(0) => Value::Bool(false),
        Value::Number(n) if n.as_u64() == Some(1) => Value::Bool(true),
        other => other.clone(),
    }
}
