//! Packaged dataset artifact: one JSON document per build.
//!
//! Two shapes are read:
//!
//! ```json
//! {"schema_version": 1, "generated_at": "...", "source_digest": "...",
//!  "providers": [{"id": "openai", "models": [{"model_id": "gpt-4"}]}]}
//! ```
//!
//! and the flattened form, where `providers` carry no models and every
//! model sits in a top-level `models` list with its `provider_id`. Only the
//! nested shape is written.

use std::path::Path;

use serde_json::{Map, Value};

use crate::domain::dataset::{CanonicalDataset, ProviderEntry, SCHEMA_VERSION};
use crate::domain::error::{CatalogError, Result};
use crate::pipeline::finalize::scrub_aliases;

/// Parse an artifact document in either shape.
pub fn load_artifact(value: Value) -> Result<CanonicalDataset> {
    let Value::Object(mut root) = value else {
        return Err(CatalogError::Artifact("document is not an object".into()));
    };

    match root.get("schema_version").map(Value::as_u64) {
        None => {
            root.insert("schema_version".into(), Value::from(SCHEMA_VERSION));
        }
        Some(Some(version)) if version <= u64::from(SCHEMA_VERSION) => {}
        Some(Some(version)) => {
            return Err(CatalogError::Artifact(format!(
                "unsupported schema_version {version} (this build reads up to {SCHEMA_VERSION})"
            )))
        }
        Some(None) => {
            return Err(CatalogError::Artifact("schema_version is not an integer".into()));
        }
    }
    root.entry("source_digest")
        .or_insert_with(|| Value::String(String::new()));

    let flat_models = match root.remove("models") {
        Some(Value::Array(models)) => models,
        Some(_) => return Err(CatalogError::Artifact("`models` must be a list".into())),
        None => Vec::new(),
    };
    if !root.contains_key("providers") {
        if flat_models.is_empty() {
            return Err(CatalogError::Artifact("missing `providers`".into()));
        }
        root.insert("providers".into(), Value::Array(Vec::new()));
    }
    let Some(Value::Array(providers)) = root.get_mut("providers") else {
        return Err(CatalogError::Artifact("`providers` must be a list".into()));
    };

    adopt_models(providers, flat_models)?;

    let mut dataset: CanonicalDataset = serde_json::from_value(Value::Object(root))
        .map_err(|e| CatalogError::Artifact(e.to_string()))?;
    dataset.schema_version = SCHEMA_VERSION;
    canonicalize(&mut dataset);
    Ok(dataset)
}

/// Restore canonical order and identity rules on a loaded document.
///
/// Repeated provider entries fold into the first, a repeated model key keeps
/// its first record, and aliases go through the same hygiene as a build.
/// Each repair is logged.
fn canonicalize(dataset: &mut CanonicalDataset) {
    let mut providers = std::mem::take(&mut dataset.providers);
    providers.sort_by(|a, b| a.provider.id.cmp(&b.provider.id));

    let mut entries: Vec<ProviderEntry> = Vec::with_capacity(providers.len());
    for entry in providers {
        match entries.last_mut() {
            Some(last) if last.provider.id == entry.provider.id => {
                tracing::warn!(
                    provider = %entry.provider.id,
                    "duplicate provider entry in artifact; models folded into the first"
                );
                last.models.extend(entry.models);
            }
            _ => entries.push(entry),
        }
    }

    for entry in &mut entries {
        let id = &entry.provider.id;
        for model in entry.models.iter_mut().filter(|m| &m.provider_id != id) {
            tracing::warn!(
                provider = %id,
                model = %model.model_id,
                declared = %model.provider_id,
                "nested model declares another provider; using its enclosing entry"
            );
            model.provider_id = id.clone();
        }

        entry.models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        let before = entry.models.len();
        entry.models.dedup_by(|later, first| later.model_id == first.model_id);
        let repeated = before - entry.models.len();
        if repeated > 0 {
            tracing::warn!(
                provider = %id,
                count = repeated,
                "duplicate model ids in artifact; first record kept"
            );
        }

        scrub_aliases(id, &mut entry.models);
    }
    dataset.providers = entries;
}

/// Stamp each nested model with its provider id and move flattened models
/// under their provider, creating bare entries where needed.
fn adopt_models(providers: &mut Vec<Value>, flat_models: Vec<Value>) -> Result<()> {
    for entry in providers.iter_mut() {
        let Value::Object(entry) = entry else {
            return Err(CatalogError::Artifact("provider entry is not an object".into()));
        };
        let id = entry.get("id").cloned().unwrap_or(Value::Null);
        if let Some(Value::Array(models)) = entry.get_mut("models") {
            for model in models.iter_mut().filter_map(Value::as_object_mut) {
                model.entry("provider_id").or_insert_with(|| id.clone());
            }
        }
    }

    for model in flat_models {
        let Some(provider) = model.get("provider_id").and_then(Value::as_str).map(str::to_string) else {
            return Err(CatalogError::Artifact("flattened model without provider_id".into()));
        };
        let position = providers
            .iter()
            .position(|p| p.get("id").and_then(Value::as_str) == Some(provider.as_str()));
        let entry = match position {
            Some(idx) => &mut providers[idx],
            None => {
                let mut bare = Map::new();
                bare.insert("id".into(), Value::String(provider.clone()));
                bare.insert("name".into(), Value::String(provider));
                providers.push(Value::Object(bare));
                let last = providers.len() - 1;
                &mut providers[last]
            }
        };
        if let Value::Object(entry) = entry {
            match entry
                .entry("models")
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                Value::Array(models) => models.push(model),
                _ => return Err(CatalogError::Artifact("provider `models` must be a list".into())),
            }
        }
    }
    Ok(())
}

/// Read an artifact file. A missing file is [`CatalogError::MissingArtifact`].
pub fn read_artifact(path: impl AsRef<Path>) -> Result<CanonicalDataset> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CatalogError::MissingArtifact(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let value: Value =
        serde_json::from_str(&raw).map_err(|e| CatalogError::Artifact(e.to_string()))?;
    load_artifact(value)
}

/// Like [`read_artifact`] but maps a missing file to `None`.
pub fn read_artifact_if_present(path: impl AsRef<Path>) -> Result<Option<CanonicalDataset>> {
    match read_artifact(path) {
        Ok(dataset) => Ok(Some(dataset)),
        Err(CatalogError::MissingArtifact(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write the nested shape, pretty-printed.
pub fn write_artifact(dataset: &CanonicalDataset, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(dataset)?;
    std::fs::write(path, json)?;
    Ok(())
}
