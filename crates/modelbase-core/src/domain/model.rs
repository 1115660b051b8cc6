//! Provider and model records.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::ids::{ModelKey, ProviderId};

/// Opaque bag for fields the schema does not know about yet.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// An upstream API provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variables the provider's credentials are read from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    /// Model ids (or glob patterns) to drop after merge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_models: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Provider {
    /// A provider carrying nothing but its identity.
    pub fn bare(id: ProviderId) -> Self {
        Self {
            name: id.to_string(),
            id,
            base_url: None,
            env: Vec::new(),
            doc: None,
            exclude_models: Vec::new(),
            extra: Extra::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_cutoff: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
}

/// Per-unit pricing. Every channel is optional and non-negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_video: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_video: Option<f64>,
}

impl Cost {
    /// All populated channels as `(name, value)` pairs.
    pub fn channels(&self) -> Vec<(&'static str, f64)> {
        [
            ("input", self.input),
            ("output", self.output),
            ("cache_read", self.cache_read),
            ("cache_write", self.cache_write),
            ("reasoning", self.reasoning),
            ("input_audio", self.input_audio),
            ("output_audio", self.output_audio),
            ("input_video", self.input_video),
            ("output_video", self.output_video),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modalities {
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCaps {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub parallel: bool,
}

impl From<bool> for ToolCaps {
    fn from(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonCaps {
    #[serde(default)]
    pub native: bool,
    #[serde(default)]
    pub schema: bool,
    #[serde(default)]
    pub strict: bool,
}

impl From<bool> for JsonCaps {
    fn from(native: bool) -> Self {
        Self {
            native,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingCaps {
    #[serde(default)]
    pub text: bool,
    #[serde(default)]
    pub tool_calls: bool,
}

impl From<bool> for StreamingCaps {
    fn from(text: bool) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningCaps {
    #[serde(default)]
    pub enabled: bool,
}

impl From<bool> for ReasoningCaps {
    fn from(enabled: bool) -> Self {
        Self { enabled }
    }
}

/// Canonical capability tree.
///
/// Each sub-object also accepts a bare boolean on input, e.g.
/// `"tools": true` reads as `{"enabled": true}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub chat: bool,
    #[serde(default, deserialize_with = "flag_or_object")]
    pub tools: ToolCaps,
    #[serde(default, deserialize_with = "flag_or_object")]
    pub json: JsonCaps,
    #[serde(default, deserialize_with = "flag_or_object")]
    pub streaming: StreamingCaps,
    #[serde(default, deserialize_with = "flag_or_object")]
    pub reasoning: ReasoningCaps,
}

impl Capabilities {
    /// Clear flags that cannot hold without their parent flag.
    pub fn canonicalize(&mut self) {
        if !self.tools.enabled {
            self.tools = ToolCaps::default();
            self.streaming.tool_calls = false;
        }
        if self.json.strict {
            self.json.schema = true;
        }
    }
}

fn flag_or_object<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + From<bool>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shorthand<T> {
        Flag(bool),
        Full(T),
    }

    Ok(match Shorthand::<T>::deserialize(deserializer)? {
        Shorthand::Flag(flag) => T::from(flag),
        Shorthand::Full(full) => full,
    })
}

/// A single model offered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub provider_id: ProviderId,
    pub model_id: String,

    /// Upstream-native id; defaults to `model_id`.
    #[serde(default)]
    pub provider_model_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default)]
    pub dates: Dates,

    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub cost: Cost,

    #[serde(default)]
    pub modalities: Modalities,

    #[serde(default)]
    pub capabilities: Capabilities,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Model {
    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.provider_id.clone(), self.model_id.clone())
    }
}
