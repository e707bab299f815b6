//! Per-tier record shapes
//!
//! Each tier stores a distinct struct with its required and optional
//! fields enumerated explicitly; records are validated at the boundary
//! before any store call. `tenant_id` is never inferred: the engine
//! stamps it from the resolved scope on every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A short-term memory, held in the key-value store under its bare id
/// (plus a session copy when a session is supplied).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortTermRecord {
    pub id: String,
    pub tenant_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub ttl_seconds: u64,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A working memory, keyed `tenant:{t}:session:{s}:memory:{id}` so reads
/// can wildcard-scan by tenant or by tenant+session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingRecord {
    pub id: String,
    pub tenant_id: String,
    pub session_id: String,
    /// Caller data, JSON-encoded
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub ttl_seconds: u64,
}

/// A full episodic turn, persisted as an object-store blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub turn_number: u32,
    pub user_input: String,
    pub agent_response: String,
    /// Rendered form: `Turn {n}: {user_input} -> {agent_response}`
    pub content: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub object_key: String,
}

impl EpisodicRecord {
    /// Render the canonical content line for a turn.
    pub fn render_content(turn_number: u32, user_input: &str, agent_response: &str) -> String {
        format!("Turn {turn_number}: {user_input} -> {agent_response}")
    }
}

/// The document-store index entry pointing at an episodic blob. Input and
/// response previews are truncated so index rows stay small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicIndexEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub memory_id: String,
    pub turn_number: u32,
    pub object_key: String,
    pub user_input: String,
    pub agent_response: String,
    pub tenant_id: String,
}

/// Maximum preview length for index rows.
pub const INDEX_PREVIEW_CHARS: usize = 200;

/// Truncate a preview field to at most `INDEX_PREVIEW_CHARS` characters.
pub fn truncate_preview(text: &str) -> String {
    text.chars().take(INDEX_PREVIEW_CHARS).collect()
}

/// A semantic fact document held in the search index. The persisted
/// `relevance_score` is meaningless; scores are recomputed at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
    #[serde(default)]
    pub relevance_score: f32,
}

/// A long-term summary, upserted per `(tenant_id, entity_id)` and keyed by
/// the composite `{tenant_id}#{entity_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermRecord {
    /// Composite store key
    pub pk: String,
    pub id: String,
    pub tenant_id: String,
    pub entity_id: String,
    pub summary: String,
    #[serde(default)]
    pub related_entities: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// A procedural recipe stored in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureRecord {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Compact listing row for procedures.
#[derive(Debug, Clone, Serialize)]
pub struct ProcedureSummary {
    pub id: String,
    pub name: String,
    pub step_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl From<&ProcedureRecord> for ProcedureSummary {
    fn from(record: &ProcedureRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            step_count: record.steps.len(),
            timestamp: record.timestamp,
        }
    }
}

// --- Write requests ---

/// Write request for the short-term tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShortTermWrite {
    pub content: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// Write request for the working tier.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkingWrite {
    pub session_id: String,
    pub data: Value,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// Write request for the episodic tier.
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodicWrite {
    pub session_id: String,
    pub turn_number: u32,
    pub user_input: String,
    pub agent_response: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Write request for the semantic tier. When `embedding` is absent the
/// engine computes one; when present it must match the configured length.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticWrite {
    pub content: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Upsert request for the long-term tier.
#[derive(Debug, Clone, Deserialize)]
pub struct LongTermWrite {
    pub entity_id: String,
    pub summary: String,
    #[serde(default)]
    pub related_entities: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    /// Caller-supplied memory id, honored when present
    #[serde(default)]
    pub id: Option<String>,
}

/// Write request for the procedural tier.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureWrite {
    pub name: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

// --- Receipts and query outcomes ---

/// Successful write acknowledgment: the assigned id and effective TTL
/// (`None` for tiers without an engine-managed TTL).
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub memory_id: String,
    pub ttl_seconds: Option<u64>,
}

/// Episodic write acknowledgment. `indexed == false` marks a degraded
/// success: the blob was persisted but the index entry was not, so the
/// turn remains retrievable by its object key only.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodicReceipt {
    pub memory_id: String,
    pub session_id: String,
    pub turn_number: u32,
    pub object_key: String,
    pub indexed: bool,
}

/// Search mode for semantic queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Vector,
    Text,
}

/// Semantic query request. Absent `limit`/`min_score` fall back to the
/// engine's configured retrieval defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticQuery {
    pub query: String,
    #[serde(default = "default_search_type")]
    pub search_type: SearchType,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
    /// Optional caller-supplied query embedding (vector search only)
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn default_search_type() -> SearchType {
    SearchType::Vector
}

/// Cross-tier recall request. An empty `tiers` list means the default
/// fan-out set (semantic, short-term, working, episodic); absent
/// `limit`/`min_score` fall back to the configured retrieval defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RecallRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tiers: Vec<crate::tier::MemoryTier>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_episodic_content_rendering() {
        assert_eq!(
            EpisodicRecord::render_content(3, "hi", "hello"),
            "Turn 3: hi -> hello"
        );
    }

    #[test]
    fn test_truncate_preview_limits_chars() {
        let long = "x".repeat(500);
        assert_eq!(truncate_preview(&long).chars().count(), 200);
        assert_eq!(truncate_preview("short"), "short");
    }

    #[test]
    fn test_short_term_record_round_trip() {
        let record = ShortTermRecord {
            id: "stm_1".to_string(),
            tenant_id: "acme".to_string(),
            content: "remember this".to_string(),
            metadata: Map::new(),
            timestamp: Utc::now(),
            ttl_seconds: 604_800,
            session_id: Some("s1".to_string()),
        };
        let value = serde_json::to_value(&record).unwrap();
        let parsed: ShortTermRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.tenant_id, "acme");
        assert_eq!(parsed.ttl_seconds, 604_800);
    }

    #[test]
    fn test_semantic_document_defaults_missing_fields() {
        let parsed: SemanticDocument = serde_json::from_value(json!({
            "id": "sem_1",
            "content": "fact",
            "embedding": [0.0, 1.0],
            "timestamp": "2024-06-01T00:00:00Z",
            "version": 1
        }))
        .unwrap();
        assert!(parsed.metadata.is_empty());
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.relevance_score, 0.0);
    }

    #[test]
    fn test_procedure_summary_counts_steps() {
        let record = ProcedureRecord {
            id: "proc_1".to_string(),
            tenant_id: "acme".to_string(),
            name: "deploy".to_string(),
            steps: vec!["build".to_string(), "test".to_string(), "ship".to_string()],
            metadata: Map::new(),
            timestamp: Utc::now(),
        };
        let summary = ProcedureSummary::from(&record);
        assert_eq!(summary.step_count, 3);
        assert_eq!(summary.name, "deploy");
    }

    #[test]
    fn test_semantic_query_defaults() {
        let query: SemanticQuery = serde_json::from_value(json!({"query": "rust"})).unwrap();
        assert_eq!(query.search_type, SearchType::Vector);
        assert!(query.limit.is_none());
        assert!(query.min_score.is_none());
        assert!(query.embedding.is_none());
    }
}
