//! Test support
//!
//! Fixtures wiring the engine to the in-memory store adapters, plus
//! misbehaving store implementations for degraded-path tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::embedding::HashEmbedder;
use crate::engine::{MemoryEngine, MemoryStores};
use crate::error::{EngramError, Result};
use crate::scope::ScopeFilter;
use crate::store::{
    DocumentStore, InMemoryDocumentStore, InMemoryKeyValueStore, InMemoryObjectStore,
    InMemorySearchIndex, KeyValueStore, SearchHit, SearchIndex,
};

/// A full set of in-memory stores wired with the production key
/// attributes.
pub fn in_memory_stores() -> MemoryStores {
    MemoryStores {
        key_value: Arc::new(InMemoryKeyValueStore::new()),
        episodic_index: Arc::new(InMemoryDocumentStore::new("memory_id")),
        long_term: Arc::new(InMemoryDocumentStore::new("pk")),
        procedural: Arc::new(InMemoryDocumentStore::new("id")),
        objects: Arc::new(InMemoryObjectStore::new()),
        search: Arc::new(InMemorySearchIndex::new()),
    }
}

/// An engine on in-memory stores with default configuration and the
/// deterministic hash embedder.
pub fn test_engine() -> MemoryEngine {
    test_engine_with(EngineConfig::default(), in_memory_stores())
}

/// An engine on the given stores and configuration, with a hash embedder
/// sized to the configured dimension.
pub fn test_engine_with(config: EngineConfig, stores: MemoryStores) -> MemoryEngine {
    let embedder = Arc::new(HashEmbedder::with_dimension(config.embedding.dimension));
    MemoryEngine::new(config, stores, embedder).expect("embedder dimension matches config")
}

/// A search index whose every call fails, for degraded-recall tests.
#[derive(Default)]
pub struct FailingSearchIndex;

#[async_trait]
impl SearchIndex for FailingSearchIndex {
    async fn add_document(&self, _id: &str, _document: Value) -> Result<bool> {
        Err(EngramError::Store("search index unavailable".to_string()))
    }

    async fn search_by_vector(
        &self,
        _vector: &[f32],
        _size: usize,
        _min_score: f32,
        _filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>> {
        Err(EngramError::Store("search index unavailable".to_string()))
    }

    async fn search_by_text(
        &self,
        _query: &str,
        _size: usize,
        _filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>> {
        Err(EngramError::Store("search index unavailable".to_string()))
    }
}

/// A key-value store whose every call fails.
#[derive(Default)]
pub struct FailingKeyValueStore;

#[async_trait]
impl KeyValueStore for FailingKeyValueStore {
    async fn set(&self, _key: &str, _value: Value, _ttl_seconds: Option<u64>) -> Result<bool> {
        Err(EngramError::Store("key-value store unavailable".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Err(EngramError::Store("key-value store unavailable".to_string()))
    }

    async fn scan_keys(&self, _pattern: &str) -> Result<Vec<String>> {
        Err(EngramError::Store("key-value store unavailable".to_string()))
    }

    async fn get_multiple(&self, _keys: &[String]) -> Result<Vec<Option<Value>>> {
        Err(EngramError::Store("key-value store unavailable".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(EngramError::Store("key-value store unavailable".to_string()))
    }
}

/// A document store whose every call fails.
#[derive(Default)]
pub struct FailingDocumentStore;

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn put_item(&self, _item: Value) -> Result<bool> {
        Err(EngramError::Store("document store unavailable".to_string()))
    }

    async fn get_item(&self, _key: &str) -> Result<Option<Value>> {
        Err(EngramError::Store("document store unavailable".to_string()))
    }

    async fn query_items(
        &self,
        _key_field: &str,
        _key_value: &str,
        _filter: &ScopeFilter,
        _limit: usize,
    ) -> Result<Vec<Value>> {
        Err(EngramError::Store("document store unavailable".to_string()))
    }

    async fn scan_items(&self, _limit: usize) -> Result<Vec<Value>> {
        Err(EngramError::Store("document store unavailable".to_string()))
    }
}

/// A search index that stalls longer than any test fan-out budget, for
/// timeout tests.
pub struct StalledSearchIndex {
    delay: Duration,
}

impl StalledSearchIndex {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl SearchIndex for StalledSearchIndex {
    async fn add_document(&self, _id: &str, _document: Value) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(true)
    }

    async fn search_by_vector(
        &self,
        _vector: &[f32],
        _size: usize,
        _min_score: f32,
        _filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn search_by_text(
        &self,
        _query: &str,
        _size: usize,
        _filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}
