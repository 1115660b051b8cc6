//! Lookup and capability-based selection over a [`Snapshot`].

use std::fmt;
use std::sync::Arc;

use crate::domain::error::LookupError;
use crate::domain::ids::{ModelKey, ModelSpec, ProviderId};
use crate::domain::model::{Capabilities, Model};
use crate::runtime::snapshot::Snapshot;

/// A capability predicate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Chat,
    Tools,
    ToolsStreaming,
    ToolsStrict,
    ToolsParallel,
    JsonNative,
    JsonSchema,
    JsonStrict,
    StreamingText,
    StreamingToolCalls,
    Reasoning,
    /// Unrecognized key. Never matches.
    Unknown,
}

impl Capability {
    pub fn parse(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().replace(['.', '-'], "_").as_str() {
            "chat" => Capability::Chat,
            "tools" | "tools_enabled" => Capability::Tools,
            "tools_streaming" => Capability::ToolsStreaming,
            "tools_strict" => Capability::ToolsStrict,
            "tools_parallel" => Capability::ToolsParallel,
            "json_native" | "json" => Capability::JsonNative,
            "json_schema" => Capability::JsonSchema,
            "json_strict" => Capability::JsonStrict,
            "streaming_text" | "streaming" => Capability::StreamingText,
            "streaming_tool_calls" => Capability::StreamingToolCalls,
            "reasoning" | "reasoning_enabled" => Capability::Reasoning,
            _ => Capability::Unknown,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Tools => "tools",
            Capability::ToolsStreaming => "tools_streaming",
            Capability::ToolsStrict => "tools_strict",
            Capability::ToolsParallel => "tools_parallel",
            Capability::JsonNative => "json_native",
            Capability::JsonSchema => "json_schema",
            Capability::JsonStrict => "json_strict",
            Capability::StreamingText => "streaming_text",
            Capability::StreamingToolCalls => "streaming_tool_calls",
            Capability::Reasoning => "reasoning",
            Capability::Unknown => "unknown",
        }
    }

    /// The flag at this capability's path.
    pub fn test(self, caps: &Capabilities) -> bool {
        match self {
            Capability::Chat => caps.chat,
            Capability::Tools => caps.tools.enabled,
            Capability::ToolsStreaming => caps.tools.streaming,
            Capability::ToolsStrict => caps.tools.strict,
            Capability::ToolsParallel => caps.tools.parallel,
            Capability::JsonNative => caps.json.native,
            Capability::JsonSchema => caps.json.schema,
            Capability::JsonStrict => caps.json.strict,
            Capability::StreamingText => caps.streaming.text,
            Capability::StreamingToolCalls => caps.streaming.tool_calls,
            Capability::Reasoning => caps.reasoning.enabled,
            Capability::Unknown => false,
        }
    }
}

/// `key`, `key:true`, `key:false` (or `=` in place of `:`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    raw: String,
    capability: Capability,
    expected: bool,
}

impl Predicate {
    pub fn parse(raw: &str) -> Self {
        let (capability, expected) = match raw.split_once([':', '=']) {
            Some((key, value)) => match parse_flag(value) {
                Some(expected) => (Capability::parse(key), expected),
                None => (Capability::Unknown, true),
            },
            None => (Capability::parse(raw), true),
        };
        Self {
            raw: raw.trim().to_string(),
            capability,
            expected,
        }
    }

    pub fn new(capability: Capability, expected: bool) -> Self {
        let raw = if expected {
            capability.key().to_string()
        } else {
            format!("{}:false", capability.key())
        };
        Self {
            raw,
            capability,
            expected,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Unknown keys never hold, whatever the expected value.
    pub fn holds(&self, caps: &Capabilities) -> bool {
        self.capability != Capability::Unknown && self.capability.test(caps) == self.expected
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

impl From<&str> for Predicate {
    fn from(raw: &str) -> Self {
        Predicate::parse(raw)
    }
}

impl From<Capability> for Predicate {
    fn from(capability: Capability) -> Self {
        Predicate::new(capability, true)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Selection request.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub require: Vec<Predicate>,
    pub forbid: Vec<Predicate>,
    /// Overrides the snapshot's compiled prefer order.
    pub prefer: Option<Vec<String>>,
    /// Restrict the scan to one provider.
    pub scope: Option<String>,
    pub exclude_deprecated: bool,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, predicate: impl Into<Predicate>) -> Self {
        self.require.push(predicate.into());
        self
    }

    pub fn forbid(mut self, predicate: impl Into<Predicate>) -> Self {
        self.forbid.push(predicate.into());
        self
    }

    pub fn prefer<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefer = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    pub fn scope(mut self, provider: impl Into<String>) -> Self {
        self.scope = Some(provider.into());
        self
    }

    pub fn exclude_deprecated(mut self, exclude: bool) -> Self {
        self.exclude_deprecated = exclude;
        self
    }

    pub fn matches(&self, model: &Model) -> bool {
        if self.exclude_deprecated && model.deprecated {
            return false;
        }
        let caps = &model.capabilities;
        self.require.iter().all(|p| p.holds(caps)) && !self.forbid.iter().any(|p| p.holds(caps))
    }
}

impl Snapshot {
    /// Resolve `model` as a canonical id, then as an alias (one hop).
    pub fn lookup(&self, provider: &str, model: &str) -> Result<Arc<Model>, LookupError> {
        let id = self
            .ids()
            .resolve(provider)
            .ok_or_else(|| LookupError::UnknownProvider(provider.to_string()))?;
        let key = ModelKey::new(id, model.trim());
        if let Some(found) = self.model_by_key(&key) {
            return Ok(Arc::clone(found));
        }
        self.alias_target(&key)
            .and_then(|canonical| self.model_by_key(&ModelKey::new(key.provider.clone(), canonical)))
            .cloned()
            .ok_or_else(|| LookupError::UnknownModel {
                provider: key.provider.to_string(),
                model: key.model.clone(),
            })
    }

    pub fn lookup_spec(&self, spec: &str) -> Result<Arc<Model>, LookupError> {
        let spec = ModelSpec::parse(spec).map_err(|_| LookupError::InvalidSpec(spec.to_string()))?;
        self.lookup(&spec.provider, &spec.model)
    }

    pub fn capabilities(&self, spec: &str) -> Option<Capabilities> {
        self.lookup_spec(spec).ok().map(|m| m.capabilities)
    }

    pub fn is_allowed(&self, spec: &str) -> bool {
        self.lookup_spec(spec).is_ok()
    }

    /// First match in scan order.
    pub fn select(&self, query: &SelectQuery) -> Option<ModelKey> {
        self.scan(query).next().map(|m| m.key())
    }

    /// Every match in scan order.
    pub fn candidates(&self, query: &SelectQuery) -> Vec<ModelKey> {
        self.scan(query).map(|m| m.key()).collect()
    }

    /// Provider scan order: the scope alone if given, otherwise preferred
    /// providers followed by the rest in canonical order.
    pub fn scan_order(&self, query: &SelectQuery) -> Vec<ProviderId> {
        if let Some(scope) = &query.scope {
            return self.ids().resolve(scope).into_iter().collect();
        }

        let mut order: Vec<ProviderId> = match &query.prefer {
            Some(raw) => raw.iter().filter_map(|p| self.ids().resolve(p)).collect(),
            None => self.filter().prefer().to_vec(),
        };
        let mut seen = std::collections::HashSet::new();
        order.retain(|id| seen.insert(id.clone()));
        for provider in self.providers() {
            if seen.insert(provider.id.clone()) {
                order.push(provider.id.clone());
            }
        }
        order
    }

    fn scan<'a>(&'a self, query: &'a SelectQuery) -> impl Iterator<Item = &'a Arc<Model>> + 'a {
        self.scan_order(query)
            .into_iter()
            .flat_map(move |provider| self.models_of(&provider).iter())
            .filter(move |model| query.matches(model))
    }
}
