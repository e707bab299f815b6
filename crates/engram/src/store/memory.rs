//! In-memory reference adapters for the four store contracts
//!
//! DashMap-backed implementations that honor the same contracts the
//! engine expects from production backends, including store-side TTL
//! expiry. They double as the test harness for the engine.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::embedding::cosine_similarity;
use crate::error::{EngramError, Result};
use crate::ranking::lexical_overlap;
use crate::scope::ScopeFilter;
use crate::store::{DocumentStore, KeyValueStore, ObjectStore, SearchHit, SearchIndex};

/// Match a key against a scan pattern where `*` matches any run of
/// characters. Literal segments must appear in order, anchored at both
/// ends.
fn key_matches(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == key;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = key;

    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(parts[parts.len() - 1])
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Key-value store with store-side TTL expiry. Expired entries read as
/// absent and are dropped lazily on access.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set(&self, key: &str, value: Value, ttl_seconds: Option<u64>) -> Result<bool> {
        let expires_at = ttl_seconds.map(|ttl| Instant::now() + Duration::from_secs(ttl));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired() && key_matches(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_multiple(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// Document table keyed by a single item attribute, queried by
/// field-equality conditions. Query results come back ordered by the
/// items' `timestamp` attribute when present, key order otherwise.
pub struct InMemoryDocumentStore {
    key_attr: String,
    items: DashMap<String, Value>,
}

impl InMemoryDocumentStore {
    pub fn new(key_attr: impl Into<String>) -> Self {
        Self {
            key_attr: key_attr.into(),
            items: DashMap::new(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put_item(&self, item: Value) -> Result<bool> {
        let key = item
            .get(&self.key_attr)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngramError::Store(format!("item missing key attribute '{}'", self.key_attr))
            })?
            .to_string();
        self.items.insert(key, item);
        Ok(true)
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.get(key).map(|item| item.value().clone()))
    }

    async fn query_items(
        &self,
        key_field: &str,
        key_value: &str,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let mut matches: Vec<Value> = self
            .items
            .iter()
            .filter(|item| {
                item.value()
                    .get(key_field)
                    .and_then(Value::as_str)
                    .is_some_and(|v| v == key_value)
                    && filter.matches(item.value())
            })
            .map(|item| item.value().clone())
            .collect();

        matches.sort_by(|a, b| {
            let ts_a = a.get("timestamp").and_then(Value::as_str).unwrap_or("");
            let ts_b = b.get("timestamp").and_then(Value::as_str).unwrap_or("");
            ts_a.cmp(ts_b)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn scan_items(&self, limit: usize) -> Result<Vec<Value>> {
        let mut keys: Vec<String> = self.items.iter().map(|i| i.key().clone()).collect();
        keys.sort();
        keys.truncate(limit);
        Ok(keys
            .into_iter()
            .filter_map(|k| self.items.get(&k).map(|i| i.value().clone()))
            .collect())
    }
}

/// Object store holding content blobs by key.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<String, String>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, key: &str, content: &str) -> Result<bool> {
        self.objects.insert(key.to_string(), content.to_string());
        Ok(true)
    }

    async fn get_object(&self, key: &str) -> Result<Option<String>> {
        Ok(self.objects.get(key).map(|o| o.value().clone()))
    }

    async fn list_objects(&self, prefix: &str, max_keys: usize) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|o| o.key().starts_with(prefix))
            .map(|o| o.key().clone())
            .collect();
        keys.sort();
        keys.truncate(max_keys);
        Ok(keys)
    }
}

/// Search index scoring documents by cosine similarity over their
/// `embedding` field, or by lexical overlap against their `content` field.
#[derive(Default)]
pub struct InMemorySearchIndex {
    documents: DashMap<String, Value>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn ranked(
        &self,
        score_fn: impl Fn(&Value) -> f32,
        size: usize,
        min_score: f32,
        filter: &ScopeFilter,
    ) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .documents
            .iter()
            .filter(|doc| filter.matches(doc.value()))
            .filter_map(|doc| {
                let score = score_fn(doc.value());
                (score >= min_score).then(|| SearchHit {
                    id: doc.key().clone(),
                    document: doc.value().clone(),
                    relevance_score: score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(size);
        hits
    }
}

fn document_embedding(document: &Value) -> Option<Vec<f32>> {
    document.get("embedding")?.as_array().map(|values| {
        values
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect()
    })
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn add_document(&self, id: &str, document: Value) -> Result<bool> {
        self.documents.insert(id.to_string(), document);
        Ok(true)
    }

    async fn search_by_vector(
        &self,
        vector: &[f32],
        size: usize,
        min_score: f32,
        filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.ranked(
            |doc| {
                document_embedding(doc)
                    .map(|emb| cosine_similarity(vector, &emb))
                    .unwrap_or(0.0)
            },
            size,
            min_score,
            filter,
        ))
    }

    async fn search_by_text(
        &self,
        query: &str,
        size: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.ranked(
            |doc| {
                doc.get("content")
                    .and_then(Value::as_str)
                    .map(|content| lexical_overlap(query, content))
                    .unwrap_or(0.0)
            },
            size,
            f32::MIN_POSITIVE,
            filter,
        ))
    }
}
