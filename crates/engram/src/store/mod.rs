//! Backing-store contracts
//!
//! The engine consumes four narrow store traits and never talks to a
//! concrete backend directly. Store handles are constructed explicitly and
//! injected; the engine holds them for the life of the process but each
//! call is self-contained. TTL enforcement belongs to the store: the
//! engine attaches `ttl_seconds` at write time and never polls for expiry.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use memory::{
    InMemoryDocumentStore, InMemoryKeyValueStore, InMemoryObjectStore, InMemorySearchIndex,
};

use crate::scope::ScopeFilter;

/// Key-value store backing the short-term and working tiers.
///
/// `get_multiple` is order-preserving and returns one entry per input key.
/// Expired keys read as absent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: Value, ttl_seconds: Option<u64>) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
    async fn get_multiple(&self, keys: &[String]) -> Result<Vec<Option<Value>>>;
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Document store backing the episodic index and the long-term and
/// procedural tiers. `query_items` returns items matching a field-equality
/// key condition, further narrowed by `filter`, in the store's native
/// order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_item(&self, item: Value) -> Result<bool>;
    async fn get_item(&self, key: &str) -> Result<Option<Value>>;
    async fn query_items(
        &self,
        key_field: &str,
        key_value: &str,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<Value>>;
    async fn scan_items(&self, limit: usize) -> Result<Vec<Value>>;
}

/// Object store backing episodic content blobs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, content: &str) -> Result<bool>;
    async fn get_object(&self, key: &str) -> Result<Option<String>>;
    async fn list_objects(&self, prefix: &str, max_keys: usize) -> Result<Vec<String>>;
}

/// A ranked candidate returned by the search index.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub document: Value,
    pub relevance_score: f32,
}

/// Search index backing the semantic tier.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn add_document(&self, id: &str, document: Value) -> Result<bool>;
    async fn search_by_vector(
        &self,
        vector: &[f32],
        size: usize,
        min_score: f32,
        filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>>;
    async fn search_by_text(
        &self,
        query: &str,
        size: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>>;
}
