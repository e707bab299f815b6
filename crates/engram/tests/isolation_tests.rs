//! Tenant isolation and degraded-path scenarios.

use std::sync::Arc;
use std::time::Duration;

use engram::config::EngineConfig;
use engram::record::{
    EpisodicWrite, LongTermWrite, ProcedureWrite, RecallRequest, SemanticQuery, SemanticWrite,
    SearchType, ShortTermWrite, WorkingWrite,
};
use engram::store::ObjectStore;
use engram::testing::{
    FailingDocumentStore, FailingSearchIndex, StalledSearchIndex, in_memory_stores, test_engine,
    test_engine_with,
};
use engram::{EngramError, MemoryTier, TenantScope};
use serde_json::json;

fn acme() -> TenantScope {
    TenantScope::new("acme").unwrap()
}

fn globex() -> TenantScope {
    TenantScope::new("globex").unwrap()
}

#[tokio::test]
async fn test_short_term_point_lookup_rejects_other_tenant() {
    let engine = test_engine();
    let receipt = engine
        .add_short_term(
            &acme(),
            ShortTermWrite {
                content: "acme secret".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Owner reads it back, another tenant gets not-found, never a
    // distinguishable authorization error
    assert!(engine
        .get_short_term(&acme(), &receipt.memory_id)
        .await
        .is_ok());
    let err = engine
        .get_short_term(&globex(), &receipt.memory_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngramError::NotFound(_)));
}

#[tokio::test]
async fn test_procedure_lookup_rejects_other_tenant() {
    let engine = test_engine();
    let receipt = engine
        .add_procedure(
            &acme(),
            ProcedureWrite {
                name: "rotate credentials".to_string(),
                steps: vec!["revoke".to_string(), "reissue".to_string()],
                metadata: None,
            },
        )
        .await
        .unwrap();

    let err = engine
        .get_procedure(&globex(), &receipt.memory_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngramError::NotFound(_)));

    // Listings are tenant-scoped as well
    assert!(engine.list_procedures(&globex(), 10).await.unwrap().is_empty());
    assert_eq!(engine.list_procedures(&acme(), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_semantic_search_never_crosses_tenants() {
    let engine = test_engine();
    let content = "shared phrasing between tenants";

    for scope in [acme(), globex()] {
        engine
            .add_semantic(
                &scope,
                SemanticWrite {
                    content: content.to_string(),
                    embedding: None,
                    tags: Vec::new(),
                    metadata: None,
                },
            )
            .await
            .unwrap();
    }

    let results = engine
        .query_semantic(
            &acme(),
            SemanticQuery {
                query: content.to_string(),
                search_type: SearchType::Vector,
                limit: Some(10),
                min_score: Some(0.5),
                embedding: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].metadata["tenant_id"], "acme");
}

#[tokio::test]
async fn test_short_term_session_scan_is_tenant_scoped() {
    let engine = test_engine();

    // Two tenants sharing a session id collide on the unprefixed
    // session key space; the post-fetch filter must separate them
    for scope in [acme(), globex()] {
        engine
            .add_short_term(
                &scope,
                ShortTermWrite {
                    content: format!("{} note", scope.tenant_id()),
                    session_id: Some("s1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let records = engine.query_short_term(&acme(), "s1", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tenant_id, "acme");
}

#[tokio::test]
async fn test_working_scan_is_tenant_scoped() {
    let engine = test_engine();
    for scope in [acme(), globex()] {
        engine
            .add_working(
                &scope,
                WorkingWrite {
                    session_id: "s1".to_string(),
                    data: json!({"owner": scope.tenant_id()}),
                    metadata: None,
                    ttl_seconds: None,
                },
            )
            .await
            .unwrap();
    }

    let records = engine.query_working(&acme(), None, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tenant_id, "acme");
}

#[tokio::test]
async fn test_long_term_composite_keys_keep_tenants_apart() {
    let engine = test_engine();
    for (scope, summary) in [(acme(), "acme view"), (globex(), "globex view")] {
        engine
            .upsert_long_term(
                &scope,
                LongTermWrite {
                    entity_id: "user-42".to_string(),
                    summary: summary.to_string(),
                    related_entities: Vec::new(),
                    metadata: None,
                    id: None,
                },
            )
            .await
            .unwrap();
    }

    assert_eq!(
        engine.get_long_term(&acme(), "user-42").await.unwrap().summary,
        "acme view"
    );
    assert_eq!(
        engine
            .get_long_term(&globex(), "user-42")
            .await
            .unwrap()
            .summary,
        "globex view"
    );
}

#[tokio::test]
async fn test_episodic_sessions_are_tenant_filtered() {
    let engine = test_engine();
    for scope in [acme(), globex()] {
        engine
            .add_episodic(
                &scope,
                EpisodicWrite {
                    session_id: "s1".to_string(),
                    turn_number: 1,
                    user_input: "hello".to_string(),
                    agent_response: "hi".to_string(),
                    context: None,
                    metadata: None,
                },
            )
            .await
            .unwrap();
    }

    let entries = engine.query_episodic(&acme(), "s1", 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tenant_id, "acme");
}

#[tokio::test]
async fn test_recall_degrades_when_search_index_fails() {
    let mut stores = in_memory_stores();
    stores.search = Arc::new(FailingSearchIndex);
    let engine = test_engine_with(EngineConfig::default(), stores);
    let scope = acme();

    engine
        .add_short_term(
            &scope,
            ShortTermWrite {
                content: "still reachable note".to_string(),
                session_id: Some("s1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = engine
        .recall(
            &scope,
            RecallRequest {
                query: "reachable note".to_string(),
                session_id: Some("s1".to_string()),
                tiers: Vec::new(),
                limit: Some(10),
                min_score: Some(0.1),
            },
        )
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert_eq!(outcome.count, 1);
    assert_eq!(outcome.memories[0].tier, MemoryTier::ShortTerm);
}

#[tokio::test]
async fn test_recall_degrades_when_a_tier_times_out() {
    let mut stores = in_memory_stores();
    stores.search = Arc::new(StalledSearchIndex::new(Duration::from_millis(500)));
    let config = EngineConfig::from_toml_str("[fanout]\nstore_timeout_ms = 50\n").unwrap();
    let engine = test_engine_with(config, stores);
    let scope = acme();

    engine
        .add_working(
            &scope,
            WorkingWrite {
                session_id: "s1".to_string(),
                data: json!({"note": "fast tier"}),
                metadata: None,
                ttl_seconds: None,
            },
        )
        .await
        .unwrap();

    let outcome = engine
        .recall(
            &scope,
            RecallRequest {
                query: "fast tier".to_string(),
                session_id: Some("s1".to_string()),
                tiers: Vec::new(),
                limit: Some(10),
                min_score: Some(0.1),
            },
        )
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert!(outcome
        .memories
        .iter()
        .all(|m| m.tier != MemoryTier::Semantic));
    assert_eq!(outcome.count, 1);
}

#[tokio::test]
async fn test_episodic_write_degrades_when_index_fails() {
    let mut stores = in_memory_stores();
    let objects = stores.objects.clone();
    stores.episodic_index = Arc::new(FailingDocumentStore);
    let engine = test_engine_with(EngineConfig::default(), stores);

    let receipt = engine
        .add_episodic(
            &acme(),
            EpisodicWrite {
                session_id: "s1".to_string(),
                turn_number: 1,
                user_input: "hello".to_string(),
                agent_response: "hi".to_string(),
                context: None,
                metadata: None,
            },
        )
        .await
        .unwrap();

    // The write succeeds without an index row; the blob is retrievable by
    // its object key
    assert!(!receipt.indexed);
    let blob = objects.get_object(&receipt.object_key).await.unwrap();
    assert!(blob.is_some());
}
