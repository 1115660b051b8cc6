//! Provider identity, model keys, and the closed identifier namespace.
//!
//! Provider ids are interned into an [`IdSpace`] while the build pipeline
//! runs. At query time untrusted strings are only ever *resolved* against
//! that space, so arbitrary input cannot grow the set of known identifiers.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::error::{CatalogError, Result};

/// Interned provider identifier.
///
/// Cloning is a reference-count bump; ordering and hashing follow the
/// underlying string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(Arc<str>);

impl ProviderId {
    /// Validate and wrap an already-canonical id.
    pub(crate) fn from_canonical(raw: &str) -> Result<Self> {
        let canonical = canonical_provider_id(raw)
            .ok_or_else(|| CatalogError::InvalidProviderId(raw.to_string()))?;
        Ok(ProviderId(Arc::from(canonical.as_str())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ProviderId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ProviderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProviderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProviderId::from_canonical(&raw).map_err(serde::de::Error::custom)
    }
}

/// Lowercase and trim a raw provider id, returning `None` when the result is
/// not of the form `[a-z0-9][a-z0-9_.-]*`.
pub fn canonical_provider_id(raw: &str) -> Option<String> {
    let id = raw.trim().to_ascii_lowercase();
    let mut chars = id.chars();
    let first = chars.next()?;
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return None;
    }
    if chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
    {
        Some(id)
    } else {
        None
    }
}

/// The set of provider identifiers known to one build or one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSpace {
    ids: HashSet<ProviderId>,
}

impl IdSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `raw`, registering it if it is new.
    ///
    /// Only the build pipeline and explicit registration (the load-time
    /// `custom` layer) call this.
    pub fn intern(&mut self, raw: &str) -> Result<ProviderId> {
        if let Some(existing) = self.resolve(raw) {
            return Ok(existing);
        }
        let id = ProviderId::from_canonical(raw)?;
        self.ids.insert(id.clone());
        Ok(id)
    }

    /// Look up an existing identifier without creating one.
    pub fn resolve(&self, raw: &str) -> Option<ProviderId> {
        let trimmed = raw.trim();
        if let Some(hit) = self.ids.get(trimmed) {
            return Some(hit.clone());
        }
        self.ids.get(trimmed.to_ascii_lowercase().as_str()).cloned()
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.resolve(raw).is_some()
    }

    /// Register an id that was produced by another space (e.g. when
    /// re-indexing a packaged dataset).
    pub fn insert(&mut self, id: ProviderId) {
        self.ids.insert(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All known ids in lexicographic order.
    pub fn sorted(&self) -> Vec<ProviderId> {
        let mut ids: Vec<_> = self.ids.iter().cloned().collect();
        ids.sort();
        ids
    }
}

/// Global identity of a model: the `(provider_id, model_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub provider: ProviderId,
    pub model: String,
}

impl ModelKey {
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// A `"provider:model"` reference as supplied by a caller.
///
/// Unlike [`ModelKey`] the provider half is an unresolved string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
}

impl ModelSpec {
    /// Parse `"provider:model"`, splitting on the first colon so that
    /// model ids such as `anthropic.claude-v2:1` survive intact.
    pub fn parse(spec: &str) -> Result<Self> {
        let (provider, model) = spec
            .split_once(':')
            .ok_or_else(|| CatalogError::InvalidSpec(spec.to_string()))?;
        let (provider, model) = (provider.trim(), model.trim());
        if provider.is_empty() || model.is_empty() {
            return Err(CatalogError::InvalidSpec(spec.to_string()));
        }
        Ok(Self {
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent_and_case_folds() {
        let mut ids = IdSpace::new();
        let a = ids.intern("OpenAI").expect("intern");
        let b = ids.intern(" openai ").expect("intern");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "openai");
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn resolve_never_creates() {
        let mut ids = IdSpace::new();
        ids.intern("anthropic").expect("intern");
        assert!(ids.resolve("mystery").is_none());
        assert!(ids.resolve("Anthropic").is_some());
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn rejects_malformed_ids() {
        let mut ids = IdSpace::new();
        assert!(ids.intern("").is_err());
        assert!(ids.intern("-leading-dash").is_err());
        assert!(ids.intern("has space").is_err());
        assert!(ids.intern("google_vertex").is_ok());
        assert!(ids.intern("amazon-bedrock").is_ok());
    }

    #[test]
    fn spec_splits_on_first_colon() {
        let spec = ModelSpec::parse("bedrock:anthropic.claude-v2:1").expect("parse");
        assert_eq!(spec.provider, "bedrock");
        assert_eq!(spec.model, "anthropic.claude-v2:1");
    }

    #[test]
    fn spec_requires_both_halves() {
        assert!(ModelSpec::parse("openai").is_err());
        assert!(ModelSpec::parse(":gpt-4").is_err());
        assert!(ModelSpec::parse("openai: ").is_err());
    }

    #[test]
    fn provider_id_deserialize_validates() {
        let ok: ProviderId = serde_json::from_str("\"mistral\"").expect("valid");
        assert_eq!(ok.as_str(), "mistral");
        assert!(serde_json::from_str::<ProviderId>("\"not valid!\"").is_err());
    }
}
