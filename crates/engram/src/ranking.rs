//! Ranking and deduplication
//!
//! Merges candidate lists from multiple tiers into one deterministic,
//! totally ordered result. This ordering is the only determinism guarantee
//! callers get when overlapping candidates arrive from different stores.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::tier::MemoryTier;

/// A scored candidate produced by one tier during retrieval.
///
/// `relevance_score` is always computed at query time; any persisted score
/// on the underlying record is ignored.
#[derive(Debug, Clone, Serialize)]
pub struct RankedMemory {
    /// Tier-prefixed record id
    pub id: String,
    /// Tier the candidate came from
    pub tier: MemoryTier,
    /// Textual content used for fingerprinting and display
    pub content: String,
    /// Query-time relevance score
    pub relevance_score: f32,
    /// Creation instant of the underlying record
    pub timestamp: DateTime<Utc>,
    /// Record metadata, empty when the source record carried none
    pub metadata: Map<String, Value>,
    /// Lexical filter tags
    pub tags: Vec<String>,
}

/// FNV-1a 64-bit hash. Backs the content fingerprint below and seeds the
/// hash embedder.
pub(crate) fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Stable 16-hex-character fingerprint of textual content, used to collapse
/// near-duplicate candidates across tiers.
pub fn content_fingerprint(content: &str) -> String {
    format!("{:016x}", fnv1a64(content.as_bytes()))
}

/// Fraction of query tokens present in `content`, case-insensitive.
///
/// Used as the passthrough score for key-value tiers that have no vector
/// index. Returns 0.0 when either side has no tokens.
pub fn lexical_overlap(query: &str, content: &str) -> f32 {
    let query_tokens: Vec<String> = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens: HashSet<String> = tokenize(content).into_iter().collect();
    if content_tokens.is_empty() {
        return 0.0;
    }

    let matches = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    matches as f32 / query_tokens.len() as f32
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Merge, filter, order, deduplicate, and truncate candidates.
///
/// The algorithm is deterministic and idempotent:
/// 1. drop candidates below `relevance_threshold`;
/// 2. stable-sort by score descending, then timestamp descending, so
///    equal-key inputs keep their source order;
/// 3. deduplicate by content fingerprint in sorted order, keeping the
///    first (highest-ranked) occurrence;
/// 4. truncate to `max_results`.
pub fn merge_and_rank(
    mut candidates: Vec<RankedMemory>,
    max_results: usize,
    relevance_threshold: f32,
) -> Vec<RankedMemory> {
    candidates.retain(|c| c.relevance_score >= relevance_threshold);

    candidates.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });

    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(candidates.len().min(max_results));
    for candidate in candidates {
        if seen.insert(content_fingerprint(&candidate.content)) {
            unique.push(candidate);
            if unique.len() == max_results {
                break;
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(id: &str, content: &str, score: f32, minute: u32) -> RankedMemory {
        RankedMemory {
            id: id.to_string(),
            tier: MemoryTier::Semantic,
            content: content.to_string(),
            relevance_score: score,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap(),
            metadata: Map::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = content_fingerprint("hello world");
        let b = content_fingerprint("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_differs_for_different_content() {
        assert_ne!(content_fingerprint("alpha"), content_fingerprint("beta"));
    }

    #[test]
    fn test_fingerprint_is_hex_of_shared_hash() {
        assert_eq!(
            content_fingerprint("alpha"),
            format!("{:016x}", fnv1a64("alpha".as_bytes()))
        );
    }

    #[test]
    fn test_threshold_filter() {
        let results = merge_and_rank(
            vec![candidate("a", "high", 0.9, 0), candidate("b", "low", 0.5, 0)],
            10,
            0.7,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn test_orders_by_score_then_recency() {
        let results = merge_and_rank(
            vec![
                candidate("older", "x", 0.8, 0),
                candidate("newer", "y", 0.8, 5),
                candidate("best", "z", 0.95, 1),
            ],
            10,
            0.0,
        );
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "newer", "older"]);
    }

    #[test]
    fn test_dedup_keeps_higher_ranked_duplicate() {
        let results = merge_and_rank(
            vec![
                candidate("low", "same content", 0.75, 0),
                candidate("high", "same content", 0.9, 0),
            ],
            10,
            0.7,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "high");
    }

    #[test]
    fn test_dedup_under_tie_keeps_more_recent() {
        let results = merge_and_rank(
            vec![
                candidate("old", "dup", 0.8, 0),
                candidate("new", "dup", 0.8, 9),
            ],
            10,
            0.0,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "new");
    }

    #[test]
    fn test_truncates_to_max_results() {
        let candidates: Vec<RankedMemory> = (0..20)
            .map(|i| candidate(&format!("id{i}"), &format!("content {i}"), 0.9, i))
            .collect();
        let results = merge_and_rank(candidates, 5, 0.0);
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let input = vec![
            candidate("a", "one", 0.9, 3),
            candidate("b", "two", 0.8, 1),
            candidate("c", "one", 0.85, 2),
            candidate("d", "three", 0.72, 4),
        ];
        let first = merge_and_rank(input, 10, 0.7);
        let second = merge_and_rank(first.clone(), 10, 0.7);
        let first_ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_lexical_overlap_full_match() {
        assert!((lexical_overlap("rust memory", "Rust is a memory-safe language") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_lexical_overlap_partial_match() {
        assert!((lexical_overlap("rust python", "rust only") - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_lexical_overlap_no_tokens() {
        assert_eq!(lexical_overlap("", "content"), 0.0);
        assert_eq!(lexical_overlap("query", ""), 0.0);
        assert_eq!(lexical_overlap("...", "content"), 0.0);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(merge_and_rank(Vec::new(), 10, 0.7).is_empty());
    }
}
