//! Runtime load configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::{CatalogError, Result};
use crate::runtime::filter::{FilterConfig, Rules};

/// Options for one `load` / reload call.
///
/// ```toml
/// prefer = ["anthropic", "openai"]
///
/// [allow]
/// openai = ["gpt-4*", "o1*"]
/// anthropic = "all"
///
/// [deny]
/// openai = ["gpt-4-0613"]
///
/// [[custom.models]]
/// provider_id = "openai"
/// model_id = "gpt-4o-internal"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "Rules::all")]
    pub allow: Rules,
    #[serde(default = "Rules::none")]
    pub deny: Rules,
    #[serde(default)]
    pub prefer: Vec<String>,
    /// Inline layer merged over the packaged dataset at load time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            allow: Rules::All,
            deny: Rules::None,
            prefer: Vec::new(),
            custom: None,
        }
    }
}

impl LoadConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| CatalogError::Config(e.to_string()))
    }

    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| CatalogError::Config(e.to_string()))
    }

    /// Read a `.json` or TOML file; anything not ending in `.json` is TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            let value: Value =
                serde_json::from_str(&raw).map_err(|e| CatalogError::Config(e.to_string()))?;
            Self::from_json(value)
        } else {
            Self::from_toml_str(&raw)
        }
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.allow = filter.allow;
        self.deny = filter.deny;
        self.prefer = filter.prefer;
        self
    }

    pub fn with_custom(mut self, custom: Value) -> Self {
        self.custom = Some(custom);
        self
    }

    /// The governance half of the configuration.
    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            allow: self.allow.clone(),
            deny: self.deny.clone(),
            prefer: self.prefer.clone(),
        }
    }
}
