//! Tenant isolation
//!
//! Every write is stamped with the resolved tenant identity and every read
//! is filtered to the caller's own scope. A caller-supplied tenant in a
//! payload is only a suggestion; the scope resolved at the boundary always
//! wins. Reads that cannot filter natively (bare-id point lookups) verify
//! ownership after the fetch and discard foreign records.

use serde_json::{Map, Value};

use crate::error::{EngramError, Result};

/// Resolved tenant (and optional agent) identity for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: String,
    agent_id: Option<String>,
}

impl TenantScope {
    /// Create a scope for a tenant. Empty tenant ids are rejected before
    /// any store call can be made.
    pub fn new(tenant_id: impl Into<String>) -> Result<Self> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(EngramError::Validation(
                "tenant_id is required".to_string(),
            ));
        }
        Ok(Self {
            tenant_id,
            agent_id: None,
        })
    }

    /// Attach an agent identity, used to narrow semantic-tier reads.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    /// Whether a fetched record belongs to this scope.
    pub fn owns(&self, record_tenant_id: &str) -> bool {
        self.tenant_id == record_tenant_id
    }

    /// Composite key `{tenant_id}#{id}`, used where the backing store has
    /// no native tenant dimension (e.g. long-term upserts).
    pub fn composite_key(&self, id: &str) -> String {
        format!("{}#{id}", self.tenant_id)
    }

    /// Overwrite identity fields on a metadata mapping unconditionally,
    /// defeating tenant spoofing via payload injection.
    pub fn stamp_metadata(&self, metadata: &mut Map<String, Value>) {
        metadata.insert(
            "tenant_id".to_string(),
            Value::String(self.tenant_id.clone()),
        );
        if let Some(agent_id) = &self.agent_id {
            metadata.insert("agent_id".to_string(), Value::String(agent_id.clone()));
        }
    }

    /// Equality filter for index searches scoped to this tenant (and agent,
    /// when resolved).
    pub fn search_filter(&self) -> ScopeFilter {
        let mut filter =
            ScopeFilter::new().with_condition("metadata.tenant_id", self.tenant_id.clone());
        if let Some(agent_id) = &self.agent_id {
            filter = filter.with_condition("metadata.agent_id", agent_id.clone());
        }
        filter
    }

    /// Equality filter for document-store queries scoped to this tenant.
    pub fn document_filter(&self) -> ScopeFilter {
        ScopeFilter::new().with_condition("tenant_id", self.tenant_id.clone())
    }
}

/// Conjunction of field-equality conditions applied to store reads.
///
/// Fields use dotted paths into nested objects (`metadata.tenant_id`).
/// An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    conditions: Vec<(String, String)>,
}

impl ScopeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, String)] {
        &self.conditions
    }

    /// Evaluate the filter against a JSON document. All conditions must
    /// match; a missing or non-string field fails its condition.
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            lookup_path(document, field)
                .and_then(Value::as_str)
                .is_some_and(|actual| actual == expected)
        })
    }
}

fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_tenant_rejected() {
        assert!(matches!(
            TenantScope::new(""),
            Err(EngramError::Validation(_))
        ));
        assert!(matches!(
            TenantScope::new("   "),
            Err(EngramError::Validation(_))
        ));
    }

    #[test]
    fn test_ownership_check() {
        let scope = TenantScope::new("acme").unwrap();
        assert!(scope.owns("acme"));
        assert!(!scope.owns("globex"));
        assert!(!scope.owns(""));
    }

    #[test]
    fn test_composite_key_shape() {
        let scope = TenantScope::new("acme").unwrap();
        assert_eq!(scope.composite_key("user-42"), "acme#user-42");
    }

    #[test]
    fn test_stamp_overwrites_payload_tenant() {
        let scope = TenantScope::new("acme").unwrap().with_agent("agent-1");
        let mut metadata = Map::new();
        metadata.insert("tenant_id".to_string(), json!("spoofed"));
        metadata.insert("note".to_string(), json!("kept"));

        scope.stamp_metadata(&mut metadata);

        assert_eq!(metadata["tenant_id"], json!("acme"));
        assert_eq!(metadata["agent_id"], json!("agent-1"));
        assert_eq!(metadata["note"], json!("kept"));
    }

    #[test]
    fn test_stamp_without_agent_leaves_agent_unset() {
        let scope = TenantScope::new("acme").unwrap();
        let mut metadata = Map::new();
        scope.stamp_metadata(&mut metadata);
        assert!(!metadata.contains_key("agent_id"));
    }

    #[test]
    fn test_search_filter_includes_agent_when_present() {
        let scope = TenantScope::new("acme").unwrap().with_agent("agent-1");
        let filter = scope.search_filter();
        assert_eq!(
            filter.conditions(),
            &[
                ("metadata.tenant_id".to_string(), "acme".to_string()),
                ("metadata.agent_id".to_string(), "agent-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_filter_matches_nested_fields() {
        let filter = ScopeFilter::new().with_condition("metadata.tenant_id", "acme");
        assert!(filter.matches(&json!({"metadata": {"tenant_id": "acme"}})));
        assert!(!filter.matches(&json!({"metadata": {"tenant_id": "globex"}})));
        assert!(!filter.matches(&json!({"metadata": {}})));
        assert!(!filter.matches(&json!({})));
    }

    #[test]
    fn test_filter_matches_top_level_fields() {
        let filter = ScopeFilter::new().with_condition("tenant_id", "acme");
        assert!(filter.matches(&json!({"tenant_id": "acme"})));
        assert!(!filter.matches(&json!({"tenant_id": 7})));
    }

    #[test]
    fn test_filter_conjunction() {
        let filter = ScopeFilter::new()
            .with_condition("metadata.tenant_id", "acme")
            .with_condition("metadata.agent_id", "agent-1");
        assert!(filter.matches(&json!({
            "metadata": {"tenant_id": "acme", "agent_id": "agent-1"}
        })));
        assert!(!filter.matches(&json!({
            "metadata": {"tenant_id": "acme", "agent_id": "agent-2"}
        })));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = ScopeFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&json!({"anything": true})));
    }
}
