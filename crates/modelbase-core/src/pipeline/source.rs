//! Source adapters: anything that can hand the pipeline one raw layer.
//!
//! Fetching is the only I/O in a build. Layers are fetched concurrently and
//! returned in declared order, so precedence is the position in the source
//! list regardless of which fetch finishes first.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;

use crate::domain::error::{CatalogError, Result};

/// One source's contribution before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLayer {
    pub name: String,
    pub data: Value,
}

impl RawLayer {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Produces a list of providers with nested models, in any supported shape.
#[async_trait]
pub trait LayerSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<RawLayer>;
}

/// A layer held in memory (inline data, test fixtures, embedded defaults).
#[derive(Debug, Clone)]
pub struct StaticSource {
    layer: RawLayer,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            layer: RawLayer::new(name, data),
        }
    }
}

#[async_trait]
impl LayerSource for StaticSource {
    fn name(&self) -> &str {
        &self.layer.name
    }

    async fn fetch(&self) -> Result<RawLayer> {
        Ok(self.layer.clone())
    }
}

/// A layer stored as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
}

impl JsonFileSource {
    /// The layer is named after the file stem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl LayerSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<RawLayer> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CatalogError::Source {
                source_name: self.name.clone(),
                reason: format!("{}: {}", self.path.display(), e),
            })?;
        let data = serde_json::from_slice(&bytes).map_err(|e| CatalogError::Source {
            source_name: self.name.clone(),
            reason: format!("{}: {}", self.path.display(), e),
        })?;
        Ok(RawLayer::new(self.name.clone(), data))
    }
}

/// Fetch every source concurrently, preserving declared order.
pub async fn fetch_all(sources: &[Box<dyn LayerSource>]) -> Result<Vec<RawLayer>> {
    let layers = try_join_all(sources.iter().map(|source| source.fetch())).await?;
    tracing::debug!(layers = layers.len(), "sources fetched");
    Ok(layers)
}
