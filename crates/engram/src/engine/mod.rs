//! Consolidation and retrieval engine
//!
//! The engine owns the write path (validate, stamp scope, resolve TTL,
//! route, persist) and the read path (route, fetch, verify ownership,
//! score, rank) for all six tiers, plus the cross-tier recall fan-out.
//! Stores and the embedder are injected; the engine holds shared handles
//! and every call is self-contained.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::embedding::{TextEmbedder, validate_embedding};
use crate::error::{EngramError, Result};
use crate::ranking::{RankedMemory, lexical_overlap, merge_and_rank};
use crate::record::{
    EpisodicIndexEntry, EpisodicReceipt, EpisodicRecord, EpisodicWrite, LongTermRecord,
    LongTermWrite, ProcedureRecord, ProcedureSummary, ProcedureWrite, RecallRequest,
    SearchType, SemanticDocument, SemanticQuery, SemanticWrite, ShortTermRecord, ShortTermWrite,
    WorkingRecord, WorkingWrite, WriteReceipt, truncate_preview,
};
use crate::router::{ReadRoute, ReadSelector, TierRouter};
use crate::scope::TenantScope;
use crate::store::{DocumentStore, KeyValueStore, ObjectStore, SearchIndex};
use crate::tier::{MemoryTier, generate_id};
use crate::ttl::TtlPolicy;

/// Hard cap on per-query result counts; caller limits are clamped into
/// `1..=MAX_QUERY_LIMIT`.
pub const MAX_QUERY_LIMIT: usize = 100;

/// Page size for bounded document-table scans (procedure and long-term
/// listings). Rows from other tenants are filtered after the scan, so the
/// page is deliberately larger than any caller limit.
const TABLE_SCAN_PAGE: usize = 1000;

/// The injected store handles, one per storage concern.
#[derive(Clone)]
pub struct MemoryStores {
    /// Short-term and working tiers
    pub key_value: Arc<dyn KeyValueStore>,
    /// Episodic index rows
    pub episodic_index: Arc<dyn DocumentStore>,
    /// Long-term summaries
    pub long_term: Arc<dyn DocumentStore>,
    /// Procedural recipes
    pub procedural: Arc<dyn DocumentStore>,
    /// Episodic content blobs
    pub objects: Arc<dyn ObjectStore>,
    /// Semantic documents
    pub search: Arc<dyn SearchIndex>,
}

/// Outcome of a cross-tier recall. `degraded` is set when at least one
/// tier failed or timed out and contributed nothing.
#[derive(Debug, Clone, Serialize)]
pub struct RecallOutcome {
    pub memories: Vec<RankedMemory>,
    pub count: usize,
    pub degraded: bool,
}

/// The consolidation and retrieval engine.
pub struct MemoryEngine {
    stores: MemoryStores,
    embedder: Arc<dyn TextEmbedder>,
    router: TierRouter,
    ttl: TtlPolicy,
    config: EngineConfig,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("router", &self.router)
            .field("ttl", &self.ttl)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Construct an engine. The injected embedder must produce vectors of
    /// the configured dimension; a mismatch is a wiring error caught here,
    /// before any write can persist a wrong-length vector.
    pub fn new(
        config: EngineConfig,
        stores: MemoryStores,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Result<Self> {
        if embedder.dimension() != config.embedding.dimension {
            return Err(EngramError::Configuration(format!(
                "embedder produces {}-length vectors, config expects {}",
                embedder.dimension(),
                config.embedding.dimension
            )));
        }
        let ttl = TtlPolicy::from_config(&config.ttl);
        Ok(Self {
            stores,
            embedder,
            router: TierRouter::new(),
            ttl,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Short-term tier ---

    /// Store a short-term memory. When a session is supplied a second copy
    /// is written under the session key so session scans can find it.
    pub async fn add_short_term(
        &self,
        scope: &TenantScope,
        request: ShortTermWrite,
    ) -> Result<WriteReceipt> {
        require_text("content", &request.content)?;
        let ttl_seconds = self.ttl.resolve(MemoryTier::ShortTerm, request.ttl_seconds)?;
        let memory_id = generate_id(MemoryTier::ShortTerm);
        let timestamp = Utc::now();

        let mut metadata = request.metadata.unwrap_or_default();
        scope.stamp_metadata(&mut metadata);

        let record = ShortTermRecord {
            id: memory_id.clone(),
            tenant_id: scope.tenant_id().to_string(),
            content: request.content,
            metadata,
            timestamp,
            ttl_seconds: ttl_seconds.unwrap_or_default(),
            session_id: request.session_id.clone(),
        };
        let value = to_json(&record)?;

        let route = self.router.route_write(
            MemoryTier::ShortTerm,
            scope,
            &memory_id,
            request.session_id.as_deref(),
            None,
            timestamp,
        )?;
        self.stores
            .key_value
            .set(&route.key, value.clone(), ttl_seconds)
            .await?;
        if let Some((_, session_key)) = &route.secondary {
            self.stores
                .key_value
                .set(session_key, value, ttl_seconds)
                .await?;
        }

        info!(memory_id = %memory_id, tenant_id = %scope.tenant_id(), "stored short-term memory");
        Ok(WriteReceipt {
            memory_id,
            ttl_seconds,
        })
    }

    /// Fetch one short-term memory by id. Records owned by another tenant
    /// answer as not-found.
    pub async fn get_short_term(
        &self,
        scope: &TenantScope,
        memory_id: &str,
    ) -> Result<ShortTermRecord> {
        let routes = self.router.route_read(
            MemoryTier::ShortTerm,
            scope,
            ReadSelector {
                memory_id: Some(memory_id),
                ..Default::default()
            },
        )?;
        let key = match routes.first() {
            Some(ReadRoute::PointLookup { key, .. }) => key.clone(),
            _ => return Err(EngramError::Store("unroutable read".to_string())),
        };

        let value = self
            .stores
            .key_value
            .get(&key)
            .await?
            .ok_or_else(|| not_found(memory_id))?;
        let record: ShortTermRecord = from_json(value)?;
        self.check_ownership(scope, &record.tenant_id, memory_id)?;
        Ok(record)
    }

    /// List a session's short-term memories, most recent first.
    pub async fn query_short_term(
        &self,
        scope: &TenantScope,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ShortTermRecord>> {
        let routes = self.router.route_read(
            MemoryTier::ShortTerm,
            scope,
            ReadSelector {
                session_id: Some(session_id),
                ..Default::default()
            },
        )?;
        let pattern = match routes.first() {
            Some(ReadRoute::KeyScan { pattern, .. }) => pattern.clone(),
            _ => return Err(EngramError::Store("unroutable read".to_string())),
        };

        let limit = clamp_limit(limit);
        let mut keys = self.stores.key_value.scan_keys(&pattern).await?;
        keys.truncate(limit);

        let mut records: Vec<ShortTermRecord> = self
            .stores
            .key_value
            .get_multiple(&keys)
            .await?
            .into_iter()
            .flatten()
            .filter_map(|value| from_json::<ShortTermRecord>(value).ok())
            .filter(|record| scope.owns(&record.tenant_id))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    // --- Working tier ---

    /// Store session-scoped working data. The payload is JSON-encoded as
    /// the record content.
    pub async fn add_working(
        &self,
        scope: &TenantScope,
        request: WorkingWrite,
    ) -> Result<WriteReceipt> {
        if request.data.is_null() {
            return Err(EngramError::Validation("data is required".to_string()));
        }
        let ttl_seconds = self.ttl.resolve(MemoryTier::Working, request.ttl_seconds)?;
        let memory_id = generate_id(MemoryTier::Working);
        let timestamp = Utc::now();

        let mut metadata = request.metadata.unwrap_or_default();
        scope.stamp_metadata(&mut metadata);

        let content = serde_json::to_string(&request.data)
            .map_err(|e| EngramError::Validation(format!("unencodable data: {e}")))?;
        let record = WorkingRecord {
            id: memory_id.clone(),
            tenant_id: scope.tenant_id().to_string(),
            session_id: request.session_id.clone(),
            content,
            metadata,
            timestamp,
            ttl_seconds: ttl_seconds.unwrap_or_default(),
        };

        let route = self.router.route_write(
            MemoryTier::Working,
            scope,
            &memory_id,
            Some(&request.session_id),
            None,
            timestamp,
        )?;
        self.stores
            .key_value
            .set(&route.key, to_json(&record)?, ttl_seconds)
            .await?;

        info!(memory_id = %memory_id, session_id = %request.session_id, "stored working memory");
        Ok(WriteReceipt {
            memory_id,
            ttl_seconds,
        })
    }

    /// List working memories for one session, or tenant-wide when no
    /// session is given. Most recent first.
    pub async fn query_working(
        &self,
        scope: &TenantScope,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<WorkingRecord>> {
        let routes = self.router.route_read(
            MemoryTier::Working,
            scope,
            ReadSelector {
                session_id,
                ..Default::default()
            },
        )?;
        let pattern = match routes.first() {
            Some(ReadRoute::KeyScan { pattern, .. }) => pattern.clone(),
            _ => return Err(EngramError::Store("unroutable read".to_string())),
        };

        let limit = clamp_limit(limit);
        let mut keys = self.stores.key_value.scan_keys(&pattern).await?;
        keys.truncate(limit);

        let mut records: Vec<WorkingRecord> = self
            .stores
            .key_value
            .get_multiple(&keys)
            .await?
            .into_iter()
            .flatten()
            .filter_map(|value| from_json::<WorkingRecord>(value).ok())
            .filter(|record| scope.owns(&record.tenant_id))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Delete one working memory by id within a session. The key embeds
    /// the caller's tenant, so a foreign id cannot resolve.
    pub async fn delete_working(
        &self,
        scope: &TenantScope,
        session_id: &str,
        memory_id: &str,
    ) -> Result<()> {
        let key = crate::router::working_key(scope.tenant_id(), session_id, memory_id);
        if !self.stores.key_value.delete(&key).await? {
            return Err(not_found(memory_id));
        }
        info!(memory_id = %memory_id, session_id = %session_id, "deleted working memory");
        Ok(())
    }

    /// Delete all working memories for a session. Returns the number of
    /// keys removed.
    pub async fn clear_working(&self, scope: &TenantScope, session_id: &str) -> Result<usize> {
        let routes = self.router.route_read(
            MemoryTier::Working,
            scope,
            ReadSelector {
                session_id: Some(session_id),
                ..Default::default()
            },
        )?;
        let pattern = match routes.first() {
            Some(ReadRoute::KeyScan { pattern, .. }) => pattern.clone(),
            _ => return Err(EngramError::Store("unroutable read".to_string())),
        };

        let keys = self.stores.key_value.scan_keys(&pattern).await?;
        let mut removed = 0;
        for key in &keys {
            if self.stores.key_value.delete(key).await? {
                removed += 1;
            }
        }
        info!(session_id = %session_id, removed, "cleared working memory");
        Ok(removed)
    }

    // --- Episodic tier ---

    /// Record a conversation turn: the full record lands in the object
    /// store first, then an index row with truncated previews. An index
    /// failure degrades the write instead of failing it; the receipt's
    /// `indexed` flag reports which path was taken.
    pub async fn add_episodic(
        &self,
        scope: &TenantScope,
        request: EpisodicWrite,
    ) -> Result<EpisodicReceipt> {
        require_text("user_input", &request.user_input)?;
        require_text("agent_response", &request.agent_response)?;

        let memory_id = generate_id(MemoryTier::Episodic);
        let timestamp = Utc::now();
        let route = self.router.route_write(
            MemoryTier::Episodic,
            scope,
            &memory_id,
            Some(&request.session_id),
            None,
            timestamp,
        )?;
        let object_key = route.key;

        let mut metadata = request.metadata.unwrap_or_default();
        scope.stamp_metadata(&mut metadata);

        let content = EpisodicRecord::render_content(
            request.turn_number,
            &request.user_input,
            &request.agent_response,
        );
        let record = EpisodicRecord {
            id: memory_id.clone(),
            tenant_id: scope.tenant_id().to_string(),
            session_id: request.session_id.clone(),
            turn_number: request.turn_number,
            user_input: request.user_input.clone(),
            agent_response: request.agent_response.clone(),
            content,
            context: request.context.unwrap_or_default(),
            metadata,
            timestamp,
            object_key: object_key.clone(),
        };

        let blob = serde_json::to_string(&record)
            .map_err(|e| EngramError::Store(format!("unencodable episodic record: {e}")))?;
        self.stores.objects.put_object(&object_key, &blob).await?;

        let entry = EpisodicIndexEntry {
            session_id: request.session_id.clone(),
            timestamp,
            memory_id: memory_id.clone(),
            turn_number: request.turn_number,
            object_key: object_key.clone(),
            user_input: truncate_preview(&request.user_input),
            agent_response: truncate_preview(&request.agent_response),
            tenant_id: scope.tenant_id().to_string(),
        };
        let indexed = match self.stores.episodic_index.put_item(to_json(&entry)?).await {
            Ok(_) => true,
            Err(e) => {
                warn!(memory_id = %memory_id, error = %e, "episodic index write failed, blob persisted");
                false
            }
        };

        info!(
            memory_id = %memory_id,
            session_id = %request.session_id,
            turn_number = request.turn_number,
            indexed,
            "stored episodic memory"
        );
        Ok(EpisodicReceipt {
            memory_id,
            session_id: request.session_id,
            turn_number: request.turn_number,
            object_key,
            indexed,
        })
    }

    /// List a session's turns from the index, ordered by turn number then
    /// timestamp.
    pub async fn query_episodic(
        &self,
        scope: &TenantScope,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicIndexEntry>> {
        let routes = self.router.route_read(
            MemoryTier::Episodic,
            scope,
            ReadSelector {
                session_id: Some(session_id),
                ..Default::default()
            },
        )?;
        let session_id = match routes.first() {
            Some(ReadRoute::SessionQuery { session_id }) => session_id.clone(),
            _ => return Err(EngramError::Store("unroutable read".to_string())),
        };

        let items = self
            .stores
            .episodic_index
            .query_items(
                "session_id",
                &session_id,
                &scope.document_filter(),
                clamp_limit(limit),
            )
            .await?;
        let mut entries: Vec<EpisodicIndexEntry> = items
            .into_iter()
            .filter_map(|item| from_json::<EpisodicIndexEntry>(item).ok())
            .collect();
        entries.sort_by(|a, b| {
            a.turn_number
                .cmp(&b.turn_number)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        Ok(entries)
    }

    /// List a session's turns with full content hydrated from the object
    /// store. Turns whose blob is missing are skipped with a warning.
    pub async fn query_episodic_with_content(
        &self,
        scope: &TenantScope,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicRecord>> {
        let entries = self.query_episodic(scope, session_id, limit).await?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.stores.objects.get_object(&entry.object_key).await? {
                Some(blob) => match serde_json::from_str::<EpisodicRecord>(&blob) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(memory_id = %entry.memory_id, error = %e, "corrupt episodic blob, skipping")
                    }
                },
                None => {
                    warn!(memory_id = %entry.memory_id, object_key = %entry.object_key, "episodic blob missing, skipping")
                }
            }
        }
        Ok(records)
    }

    // --- Semantic tier ---

    /// Store a semantic fact. A caller-supplied embedding is validated
    /// against the configured dimension; otherwise one is computed from
    /// the content.
    pub async fn add_semantic(
        &self,
        scope: &TenantScope,
        request: SemanticWrite,
    ) -> Result<WriteReceipt> {
        require_text("content", &request.content)?;
        let embedding = match request.embedding {
            Some(vector) => {
                validate_embedding(&vector, self.config.embedding.dimension)?;
                vector
            }
            None => self.embedder.embed(&request.content)?,
        };

        let memory_id = generate_id(MemoryTier::Semantic);
        let mut metadata = request.metadata.unwrap_or_default();
        scope.stamp_metadata(&mut metadata);

        let document = SemanticDocument {
            id: memory_id.clone(),
            content: request.content,
            embedding,
            metadata,
            tags: request.tags,
            timestamp: Utc::now(),
            version: 1,
            relevance_score: 0.0,
        };
        self.stores
            .search
            .add_document(&memory_id, to_json(&document)?)
            .await?;

        info!(memory_id = %memory_id, tenant_id = %scope.tenant_id(), "stored semantic memory");
        Ok(WriteReceipt {
            memory_id,
            ttl_seconds: None,
        })
    }

    /// Search semantic facts by vector similarity or lexical match,
    /// scoped to the caller's tenant (and agent, when resolved).
    pub async fn query_semantic(
        &self,
        scope: &TenantScope,
        request: SemanticQuery,
    ) -> Result<Vec<RankedMemory>> {
        require_text("query", &request.query)?;
        let limit = clamp_limit(request.limit.unwrap_or(self.config.retrieval.max_results));
        let min_score = request
            .min_score
            .unwrap_or(self.config.retrieval.relevance_threshold)
            .clamp(0.0, 1.0);
        let filter = scope.search_filter();

        let hits = match request.search_type {
            SearchType::Vector => {
                let vector = match request.embedding {
                    Some(vector) => {
                        validate_embedding(&vector, self.config.embedding.dimension)?;
                        vector
                    }
                    None => self.embedder.embed(&request.query)?,
                };
                self.stores
                    .search
                    .search_by_vector(&vector, limit, min_score, &filter)
                    .await?
            }
            // Text scores come from the index's own relevance model, which
            // is not on the cosine scale; min_score does not apply.
            SearchType::Text => {
                self.stores
                    .search
                    .search_by_text(&request.query, limit, &filter)
                    .await?
            }
        };

        debug!(hits = hits.len(), search_type = ?request.search_type, "semantic query");
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                ranked_from_document(hit.document, hit.relevance_score, MemoryTier::Semantic)
            })
            .collect())
    }

    // --- Long-term tier ---

    /// Create or replace the long-term summary for an entity. Repeated
    /// upserts for the same `(tenant, entity)` pair overwrite in place.
    pub async fn upsert_long_term(
        &self,
        scope: &TenantScope,
        request: LongTermWrite,
    ) -> Result<WriteReceipt> {
        require_text("entity_id", &request.entity_id)?;
        require_text("summary", &request.summary)?;

        let memory_id = request
            .id
            .unwrap_or_else(|| generate_id(MemoryTier::LongTerm));
        let timestamp = Utc::now();
        let route = self.router.route_write(
            MemoryTier::LongTerm,
            scope,
            &memory_id,
            None,
            Some(&request.entity_id),
            timestamp,
        )?;

        let mut metadata = request.metadata.unwrap_or_default();
        scope.stamp_metadata(&mut metadata);

        let record = LongTermRecord {
            pk: route.key,
            id: memory_id.clone(),
            tenant_id: scope.tenant_id().to_string(),
            entity_id: request.entity_id.clone(),
            summary: request.summary,
            related_entities: request.related_entities,
            metadata,
            timestamp,
        };
        self.stores.long_term.put_item(to_json(&record)?).await?;

        info!(memory_id = %memory_id, entity_id = %request.entity_id, "upserted long-term memory");
        Ok(WriteReceipt {
            memory_id,
            ttl_seconds: None,
        })
    }

    /// Fetch the long-term summary for an entity within the caller's
    /// tenant.
    pub async fn get_long_term(
        &self,
        scope: &TenantScope,
        entity_id: &str,
    ) -> Result<LongTermRecord> {
        let routes = self.router.route_read(
            MemoryTier::LongTerm,
            scope,
            ReadSelector {
                entity_id: Some(entity_id),
                ..Default::default()
            },
        )?;
        let key = match routes.first() {
            Some(ReadRoute::PointLookup { key, .. }) => key.clone(),
            _ => return Err(EngramError::Store("unroutable read".to_string())),
        };

        let item = self
            .stores
            .long_term
            .get_item(&key)
            .await?
            .ok_or_else(|| not_found(entity_id))?;
        let record: LongTermRecord = from_json(item)?;
        self.check_ownership(scope, &record.tenant_id, entity_id)?;
        Ok(record)
    }

    // --- Procedural tier ---

    /// Store a named step-by-step procedure.
    pub async fn add_procedure(
        &self,
        scope: &TenantScope,
        request: ProcedureWrite,
    ) -> Result<WriteReceipt> {
        require_text("name", &request.name)?;
        if request.steps.is_empty() {
            return Err(EngramError::Validation(
                "steps must not be empty".to_string(),
            ));
        }

        let memory_id = generate_id(MemoryTier::Procedural);
        let mut metadata = request.metadata.unwrap_or_default();
        scope.stamp_metadata(&mut metadata);

        let record = ProcedureRecord {
            id: memory_id.clone(),
            tenant_id: scope.tenant_id().to_string(),
            name: request.name.clone(),
            steps: request.steps,
            metadata,
            timestamp: Utc::now(),
        };
        self.stores.procedural.put_item(to_json(&record)?).await?;

        info!(memory_id = %memory_id, name = %request.name, "stored procedure");
        Ok(WriteReceipt {
            memory_id,
            ttl_seconds: None,
        })
    }

    /// Fetch one procedure by id within the caller's tenant.
    pub async fn get_procedure(
        &self,
        scope: &TenantScope,
        memory_id: &str,
    ) -> Result<ProcedureRecord> {
        let item = self
            .stores
            .procedural
            .get_item(memory_id)
            .await?
            .ok_or_else(|| not_found(memory_id))?;
        let record: ProcedureRecord = from_json(item)?;
        self.check_ownership(scope, &record.tenant_id, memory_id)?;
        Ok(record)
    }

    /// List the caller's procedures as compact summaries.
    pub async fn list_procedures(
        &self,
        scope: &TenantScope,
        limit: usize,
    ) -> Result<Vec<ProcedureSummary>> {
        let records = self.scan_procedures(scope).await?;
        let mut summaries: Vec<ProcedureSummary> =
            records.iter().map(ProcedureSummary::from).collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        summaries.truncate(clamp_limit(limit));
        Ok(summaries)
    }

    async fn scan_procedures(&self, scope: &TenantScope) -> Result<Vec<ProcedureRecord>> {
        let items = self.stores.procedural.scan_items(TABLE_SCAN_PAGE).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| from_json::<ProcedureRecord>(item).ok())
            .filter(|record| scope.owns(&record.tenant_id))
            .collect())
    }

    // --- Cross-tier recall ---

    /// Fan out one query across tiers and merge the candidates into a
    /// single ranked list. Each tier gets an independent time budget; a
    /// tier that fails or times out contributes nothing and flips the
    /// `degraded` flag instead of failing the whole recall.
    pub async fn recall(
        &self,
        scope: &TenantScope,
        request: RecallRequest,
    ) -> Result<RecallOutcome> {
        require_text("query", &request.query)?;
        let limit = clamp_limit(request.limit.unwrap_or(self.config.retrieval.max_results));
        let min_score = request
            .min_score
            .unwrap_or(self.config.retrieval.relevance_threshold)
            .clamp(0.0, 1.0);
        let tiers: Vec<MemoryTier> = if request.tiers.is_empty() {
            vec![
                MemoryTier::Semantic,
                MemoryTier::ShortTerm,
                MemoryTier::Working,
                MemoryTier::Episodic,
            ]
        } else {
            request.tiers.clone()
        };
        let budget = Duration::from_millis(self.config.fanout.store_timeout_ms);

        let fetches = tiers.iter().map(|tier| {
            let tier = *tier;
            let request = &request;
            async move {
                (
                    tier,
                    tokio::time::timeout(
                        budget,
                        self.recall_tier(scope, tier, request, limit, min_score),
                    )
                    .await,
                )
            }
        });

        let mut candidates = Vec::new();
        let mut degraded = false;
        for (tier, outcome) in future::join_all(fetches).await {
            match outcome {
                Ok(Ok(tier_candidates)) => candidates.extend(tier_candidates),
                Ok(Err(e)) => {
                    warn!(tier = %tier, error = %e, "tier failed during recall, degrading");
                    degraded = true;
                }
                Err(_) => {
                    warn!(tier = %tier, budget_ms = budget.as_millis() as u64, "tier timed out during recall, degrading");
                    degraded = true;
                }
            }
        }

        let memories = merge_and_rank(candidates, limit, min_score);
        debug!(count = memories.len(), degraded, "recall complete");
        Ok(RecallOutcome {
            count: memories.len(),
            memories,
            degraded,
        })
    }

    async fn recall_tier(
        &self,
        scope: &TenantScope,
        tier: MemoryTier,
        request: &RecallRequest,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<RankedMemory>> {
        match tier {
            MemoryTier::Semantic => {
                self.query_semantic(
                    scope,
                    SemanticQuery {
                        query: request.query.clone(),
                        search_type: SearchType::Vector,
                        limit: Some(limit),
                        min_score: Some(min_score),
                        embedding: None,
                    },
                )
                .await
            }
            MemoryTier::ShortTerm => {
                let Some(session_id) = request.session_id.as_deref() else {
                    debug!("recall skipped short-term tier, no session");
                    return Ok(Vec::new());
                };
                let records = self.query_short_term(scope, session_id, limit).await?;
                Ok(records
                    .into_iter()
                    .map(|record| RankedMemory {
                        relevance_score: lexical_overlap(&request.query, &record.content),
                        id: record.id,
                        tier,
                        content: record.content,
                        timestamp: record.timestamp,
                        metadata: record.metadata,
                        tags: Vec::new(),
                    })
                    .collect())
            }
            MemoryTier::Working => {
                let records = self
                    .query_working(scope, request.session_id.as_deref(), limit)
                    .await?;
                Ok(records
                    .into_iter()
                    .map(|record| RankedMemory {
                        relevance_score: lexical_overlap(&request.query, &record.content),
                        id: record.id,
                        tier,
                        content: record.content,
                        timestamp: record.timestamp,
                        metadata: record.metadata,
                        tags: Vec::new(),
                    })
                    .collect())
            }
            MemoryTier::Episodic => {
                let Some(session_id) = request.session_id.as_deref() else {
                    debug!("recall skipped episodic tier, no session");
                    return Ok(Vec::new());
                };
                let entries = self.query_episodic(scope, session_id, limit).await?;
                Ok(entries
                    .into_iter()
                    .map(|entry| {
                        let content = EpisodicRecord::render_content(
                            entry.turn_number,
                            &entry.user_input,
                            &entry.agent_response,
                        );
                        RankedMemory {
                            relevance_score: lexical_overlap(&request.query, &content),
                            id: entry.memory_id,
                            tier,
                            content,
                            timestamp: entry.timestamp,
                            metadata: serde_json::Map::new(),
                            tags: Vec::new(),
                        }
                    })
                    .collect())
            }
            MemoryTier::LongTerm => {
                let items = self.stores.long_term.scan_items(TABLE_SCAN_PAGE).await?;
                Ok(items
                    .into_iter()
                    .filter_map(|item| from_json::<LongTermRecord>(item).ok())
                    .filter(|record| scope.owns(&record.tenant_id))
                    .map(|record| RankedMemory {
                        relevance_score: lexical_overlap(&request.query, &record.summary),
                        id: record.id,
                        tier,
                        content: record.summary,
                        timestamp: record.timestamp,
                        metadata: record.metadata,
                        tags: Vec::new(),
                    })
                    .collect())
            }
            MemoryTier::Procedural => {
                let records = self.scan_procedures(scope).await?;
                Ok(records
                    .into_iter()
                    .map(|record| {
                        let content = format!("{}: {}", record.name, record.steps.join("; "));
                        RankedMemory {
                            relevance_score: lexical_overlap(&request.query, &content),
                            id: record.id,
                            tier,
                            content,
                            timestamp: record.timestamp,
                            metadata: record.metadata,
                            tags: Vec::new(),
                        }
                    })
                    .collect())
            }
        }
    }

    /// Post-fetch ownership check. A mismatch is classified as an
    /// authorization failure and logged with its real cause, then
    /// concealed as not-found so the response does not confirm the record
    /// exists.
    fn check_ownership(&self, scope: &TenantScope, record_tenant: &str, id: &str) -> Result<()> {
        if scope.owns(record_tenant) {
            return Ok(());
        }
        let denied =
            EngramError::Authorization(format!("memory {id} belongs to tenant {record_tenant}"));
        warn!(
            tenant_id = %scope.tenant_id(),
            code = denied.code(),
            error = %denied,
            "cross-tenant access rejected"
        );
        Err(denied.conceal(id))
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_QUERY_LIMIT)
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngramError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn not_found(id: &str) -> EngramError {
    EngramError::NotFound(format!("memory {id} not found"))
}

fn to_json<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| EngramError::Store(format!("unencodable record: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| EngramError::Store(format!("corrupt record: {e}")))
}

fn ranked_from_document(document: Value, score: f32, tier: MemoryTier) -> Option<RankedMemory> {
    let id = document.get("id")?.as_str()?.to_string();
    let content = document.get("content")?.as_str()?.to_string();
    let timestamp = document
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);
    let metadata = document
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let tags = document
        .get("tags")
        .and_then(|tags| serde_json::from_value(tags.clone()).ok())
        .unwrap_or_default();
    Some(RankedMemory {
        id,
        tier,
        content,
        relevance_score: score,
        timestamp,
        metadata,
        tags,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
