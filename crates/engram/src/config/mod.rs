use std::path::Path;

use serde::Deserialize;

use crate::error::{EngramError, Result};

/// Main configuration structure for the engine
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// TTL defaults for the engine-managed tiers
    #[serde(default)]
    pub ttl: TtlConfig,
    /// Retrieval and ranking defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Cross-tier fan-out behavior
    #[serde(default)]
    pub fanout: FanoutConfig,
    /// Embedding dimensionality
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl EngineConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| EngramError::Configuration(format!("invalid config: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngramError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }
}

/// Per-tier TTL defaults (seconds). Only the short-term and working tiers
/// carry an engine-managed TTL; the remaining tiers rely on their backing
/// store's own retention policy.
#[derive(Debug, Clone, Deserialize)]
pub struct TtlConfig {
    /// Default TTL for short-term memories (7 days)
    #[serde(default = "default_short_term_ttl")]
    pub short_term_seconds: u64,
    /// Default TTL for working memories (1 hour)
    #[serde(default = "default_working_ttl")]
    pub working_seconds: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            short_term_seconds: default_short_term_ttl(),
            working_seconds: default_working_ttl(),
        }
    }
}

fn default_short_term_ttl() -> u64 {
    604_800
}

fn default_working_ttl() -> u64 {
    3_600
}

/// Retrieval and ranking defaults
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum results returned per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Minimum relevance score for a candidate to survive ranking
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

fn default_max_results() -> usize {
    10
}

fn default_relevance_threshold() -> f32 {
    0.7
}

/// Cross-tier fan-out behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Per-store-call timeout budget in milliseconds. A tier that exceeds
    /// the budget contributes an empty result, flagged as degraded.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

/// Embedding dimensionality configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Fixed vector length for semantic-tier embeddings
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

fn default_dimension() -> usize {
    768
}
