//! Memory tier definitions
//!
//! Each tier maps to its own backing store and TTL policy. Tier names and
//! id prefixes are part of the wire contract: downstream scans rely on
//! prefix matching, so they must not change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngramError;

/// One of the six memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Recent context, key-value store, 7-day default TTL
    ShortTerm,
    /// Session-scoped scratch data, key-value store, 1-hour default TTL
    Working,
    /// Event log of conversation turns, object store + document index
    Episodic,
    /// Fact store with vector search
    Semantic,
    /// Durable per-entity summaries, document store
    LongTerm,
    /// Named step-by-step recipes, document store
    Procedural,
}

impl MemoryTier {
    /// All tiers, in canonical order.
    pub const ALL: [MemoryTier; 6] = [
        MemoryTier::ShortTerm,
        MemoryTier::Working,
        MemoryTier::Episodic,
        MemoryTier::Semantic,
        MemoryTier::LongTerm,
        MemoryTier::Procedural,
    ];

    /// The id prefix stamped onto every record of this tier.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            MemoryTier::ShortTerm => "stm",
            MemoryTier::Working => "wm",
            MemoryTier::Episodic => "epi",
            MemoryTier::Semantic => "sem",
            MemoryTier::LongTerm => "ltm",
            MemoryTier::Procedural => "proc",
        }
    }

    /// Canonical tier name used in configuration and requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::ShortTerm => "short_term",
            MemoryTier::Working => "working",
            MemoryTier::Episodic => "episodic",
            MemoryTier::Semantic => "semantic",
            MemoryTier::LongTerm => "long_term",
            MemoryTier::Procedural => "procedural",
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryTier {
    type Err = EngramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short_term" | "shortterm" => Ok(MemoryTier::ShortTerm),
            "working" => Ok(MemoryTier::Working),
            "episodic" => Ok(MemoryTier::Episodic),
            "semantic" => Ok(MemoryTier::Semantic),
            "long_term" | "longterm" => Ok(MemoryTier::LongTerm),
            "procedural" => Ok(MemoryTier::Procedural),
            other => Err(EngramError::Configuration(format!(
                "unknown memory tier: {other}"
            ))),
        }
    }
}

/// Generate a globally unique, tier-prefixed memory id (e.g. `epi_<uuid>`).
pub fn generate_id(tier: MemoryTier) -> String {
    format!("{}_{}", tier.id_prefix(), Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_prefixes() {
        assert_eq!(MemoryTier::ShortTerm.id_prefix(), "stm");
        assert_eq!(MemoryTier::Working.id_prefix(), "wm");
        assert_eq!(MemoryTier::Episodic.id_prefix(), "epi");
        assert_eq!(MemoryTier::Semantic.id_prefix(), "sem");
        assert_eq!(MemoryTier::LongTerm.id_prefix(), "ltm");
        assert_eq!(MemoryTier::Procedural.id_prefix(), "proc");
    }

    #[test]
    fn test_tier_round_trips_through_str() {
        for tier in MemoryTier::ALL {
            let parsed: MemoryTier = tier.as_str().parse().unwrap();
            assert_eq!(parsed, tier);
        }
    }

    #[test]
    fn test_unknown_tier_is_configuration_error() {
        let err = "graph".parse::<MemoryTier>().unwrap_err();
        assert!(matches!(err, EngramError::Configuration(_)));
    }

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let a = generate_id(MemoryTier::Semantic);
        let b = generate_id(MemoryTier::Semantic);
        assert!(a.starts_with("sem_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_tier_serde_uses_snake_case() {
        let json = serde_json::to_string(&MemoryTier::LongTerm).unwrap();
        assert_eq!(json, "\"long_term\"");
        let parsed: MemoryTier = serde_json::from_str("\"short_term\"").unwrap();
        assert_eq!(parsed, MemoryTier::ShortTerm);
    }
}
