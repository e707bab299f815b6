//! Tier routing
//!
//! Maps a write or read request to the tier-specific storage target and
//! key. Key shapes are reproduced byte-for-byte: downstream wildcard scans
//! rely on prefix matching, so these strings are part of the store
//! contract.

use chrono::{DateTime, Utc};

use crate::error::{EngramError, Result};
use crate::scope::TenantScope;
use crate::tier::MemoryTier;

/// The backing store a routed operation lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTarget {
    /// Short-term and working tiers
    KeyValue,
    /// Episodic index rows
    EpisodicIndex,
    /// Episodic content blobs
    ObjectStore,
    /// Long-term summaries
    LongTermTable,
    /// Procedural recipes
    ProceduralTable,
    /// Semantic documents
    SearchIndex,
}

/// A routed write: the primary target plus an optional secondary entry
/// (session copy, index row) written after the primary succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRoute {
    pub target: StoreTarget,
    pub key: String,
    pub secondary: Option<(StoreTarget, String)>,
}

/// One store operation in a routed read plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRoute {
    /// Fetch a single key; ownership must be verified post-fetch
    PointLookup { target: StoreTarget, key: String },
    /// Wildcard key scan; bounded by the caller-supplied limit
    KeyScan { target: StoreTarget, pattern: String },
    /// Document query keyed by session
    SessionQuery { session_id: String },
    /// Semantic search against the index
    IndexSearch,
    /// Bounded table scan (procedure listing)
    TableScan { target: StoreTarget },
}

/// Fields a read request may select on. All optional; the router decides
/// per tier which combination is valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadSelector<'a> {
    pub memory_id: Option<&'a str>,
    pub session_id: Option<&'a str>,
    pub entity_id: Option<&'a str>,
}

/// Stateless tier router.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierRouter;

impl TierRouter {
    pub fn new() -> Self {
        Self
    }

    /// Route a write to its storage target and key.
    pub fn route_write(
        &self,
        tier: MemoryTier,
        scope: &TenantScope,
        memory_id: &str,
        session_id: Option<&str>,
        entity_id: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<WriteRoute> {
        match tier {
            MemoryTier::ShortTerm => Ok(WriteRoute {
                target: StoreTarget::KeyValue,
                key: memory_id.to_string(),
                secondary: session_id
                    .map(|s| (StoreTarget::KeyValue, short_term_session_key(s, memory_id))),
            }),
            MemoryTier::Working => {
                let session_id = require_session(session_id)?;
                Ok(WriteRoute {
                    target: StoreTarget::KeyValue,
                    key: working_key(scope.tenant_id(), session_id, memory_id),
                    secondary: None,
                })
            }
            MemoryTier::Episodic => {
                let session_id = require_session(session_id)?;
                Ok(WriteRoute {
                    target: StoreTarget::ObjectStore,
                    key: episodic_object_key(session_id, timestamp, memory_id),
                    secondary: Some((StoreTarget::EpisodicIndex, memory_id.to_string())),
                })
            }
            MemoryTier::Semantic => Ok(WriteRoute {
                target: StoreTarget::SearchIndex,
                key: memory_id.to_string(),
                secondary: None,
            }),
            MemoryTier::LongTerm => {
                let entity_id = entity_id.ok_or_else(|| {
                    EngramError::Validation("entity_id is required".to_string())
                })?;
                Ok(WriteRoute {
                    target: StoreTarget::LongTermTable,
                    key: scope.composite_key(entity_id),
                    secondary: None,
                })
            }
            MemoryTier::Procedural => Ok(WriteRoute {
                target: StoreTarget::ProceduralTable,
                key: memory_id.to_string(),
                secondary: None,
            }),
        }
    }

    /// Route a read to the store operations that serve it.
    pub fn route_read(
        &self,
        tier: MemoryTier,
        scope: &TenantScope,
        selector: ReadSelector<'_>,
    ) -> Result<Vec<ReadRoute>> {
        match tier {
            MemoryTier::ShortTerm => {
                if let Some(memory_id) = selector.memory_id {
                    Ok(vec![ReadRoute::PointLookup {
                        target: StoreTarget::KeyValue,
                        key: memory_id.to_string(),
                    }])
                } else if let Some(session_id) = selector.session_id {
                    Ok(vec![ReadRoute::KeyScan {
                        target: StoreTarget::KeyValue,
                        pattern: short_term_session_pattern(session_id),
                    }])
                } else {
                    Err(EngramError::Validation(
                        "either memory_id or session_id is required".to_string(),
                    ))
                }
            }
            MemoryTier::Working => {
                let pattern = match selector.session_id {
                    Some(session_id) => working_session_pattern(scope.tenant_id(), session_id),
                    None => working_tenant_pattern(scope.tenant_id()),
                };
                Ok(vec![ReadRoute::KeyScan {
                    target: StoreTarget::KeyValue,
                    pattern,
                }])
            }
            MemoryTier::Episodic => {
                let session_id = require_session(selector.session_id)?;
                Ok(vec![ReadRoute::SessionQuery {
                    session_id: session_id.to_string(),
                }])
            }
            MemoryTier::Semantic => Ok(vec![ReadRoute::IndexSearch]),
            MemoryTier::LongTerm => {
                let entity_id = selector.entity_id.ok_or_else(|| {
                    EngramError::Validation("entity_id is required".to_string())
                })?;
                Ok(vec![ReadRoute::PointLookup {
                    target: StoreTarget::LongTermTable,
                    key: scope.composite_key(entity_id),
                }])
            }
            MemoryTier::Procedural => {
                if let Some(memory_id) = selector.memory_id {
                    Ok(vec![ReadRoute::PointLookup {
                        target: StoreTarget::ProceduralTable,
                        key: memory_id.to_string(),
                    }])
                } else {
                    Ok(vec![ReadRoute::TableScan {
                        target: StoreTarget::ProceduralTable,
                    }])
                }
            }
        }
    }
}

fn require_session(session_id: Option<&str>) -> Result<&str> {
    match session_id {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(EngramError::Validation(
            "session_id is required".to_string(),
        )),
    }
}

/// Session copy key for a short-term record: `session:{session_id}:{memory_id}`.
pub fn short_term_session_key(session_id: &str, memory_id: &str) -> String {
    format!("session:{session_id}:{memory_id}")
}

/// Scan pattern for a session's short-term records: `session:{session_id}:*`.
pub fn short_term_session_pattern(session_id: &str) -> String {
    format!("session:{session_id}:*")
}

/// Working memory key: `tenant:{tenant_id}:session:{session_id}:memory:{memory_id}`.
pub fn working_key(tenant_id: &str, session_id: &str, memory_id: &str) -> String {
    format!("tenant:{tenant_id}:session:{session_id}:memory:{memory_id}")
}

/// Scan pattern for one session's working memory.
pub fn working_session_pattern(tenant_id: &str, session_id: &str) -> String {
    format!("tenant:{tenant_id}:session:{session_id}:memory:*")
}

/// Scan pattern for all of a tenant's working memory, across sessions.
pub fn working_tenant_pattern(tenant_id: &str) -> String {
    format!("tenant:{tenant_id}:session:*:memory:*")
}

/// Episodic blob key: `sessions/{session_id}/{YYYY/MM/DD}/{memory_id}.json`.
pub fn episodic_object_key(
    session_id: &str,
    timestamp: DateTime<Utc>,
    memory_id: &str,
) -> String {
    format!(
        "sessions/{session_id}/{}/{memory_id}.json",
        timestamp.format("%Y/%m/%d")
    )
}
