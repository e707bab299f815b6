//! TTL lifecycle policy
//!
//! Computes the effective TTL attached to a write. Expiry enforcement is
//! the backing store's responsibility: the engine never polls for expiry
//! and never relies on reading an expired record.

use crate::config::TtlConfig;
use crate::error::{EngramError, Result};
use crate::tier::MemoryTier;

/// Resolves per-tier TTLs at write time.
///
/// `None` means the tier has no engine-managed TTL and relies on the
/// backing store's native retention policy.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    short_term_seconds: u64,
    working_seconds: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&TtlConfig::default())
    }
}

impl TtlPolicy {
    pub fn from_config(config: &TtlConfig) -> Self {
        Self {
            short_term_seconds: config.short_term_seconds,
            working_seconds: config.working_seconds,
        }
    }

    /// Default TTL for a tier, if the engine manages one.
    pub fn tier_default(&self, tier: MemoryTier) -> Option<u64> {
        match tier {
            MemoryTier::ShortTerm => Some(self.short_term_seconds),
            MemoryTier::Working => Some(self.working_seconds),
            MemoryTier::Episodic
            | MemoryTier::Semantic
            | MemoryTier::LongTerm
            | MemoryTier::Procedural => None,
        }
    }

    /// Resolve the effective TTL for a write.
    ///
    /// A positive `requested` value always overrides the tier default.
    /// Zero or negative values are rejected: a record with a non-positive
    /// TTL would be unobservable and indicates a caller error.
    pub fn resolve(&self, tier: MemoryTier, requested: Option<i64>) -> Result<Option<u64>> {
        match requested {
            Some(ttl) if ttl > 0 => Ok(Some(ttl as u64)),
            Some(ttl) => Err(EngramError::Validation(format!(
                "ttl_seconds must be positive, got {ttl}"
            ))),
            None => Ok(self.tier_default(tier)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_term_default_is_seven_days() {
        let policy = TtlPolicy::default();
        let ttl = policy.resolve(MemoryTier::ShortTerm, None).unwrap();
        assert_eq!(ttl, Some(604_800));
    }

    #[test]
    fn test_working_default_is_one_hour() {
        let policy = TtlPolicy::default();
        let ttl = policy.resolve(MemoryTier::Working, None).unwrap();
        assert_eq!(ttl, Some(3_600));
    }

    #[test]
    fn test_durable_tiers_have_no_engine_ttl() {
        let policy = TtlPolicy::default();
        for tier in [
            MemoryTier::Episodic,
            MemoryTier::Semantic,
            MemoryTier::LongTerm,
            MemoryTier::Procedural,
        ] {
            assert_eq!(policy.resolve(tier, None).unwrap(), None);
        }
    }

    #[test]
    fn test_positive_override_wins() {
        let policy = TtlPolicy::default();
        let ttl = policy.resolve(MemoryTier::Working, Some(60)).unwrap();
        assert_eq!(ttl, Some(60));

        // Overrides apply even on tiers without an engine default
        let ttl = policy.resolve(MemoryTier::Semantic, Some(60)).unwrap();
        assert_eq!(ttl, Some(60));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let policy = TtlPolicy::default();
        let err = policy.resolve(MemoryTier::Working, Some(0)).unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }

    #[test]
    fn test_negative_ttl_rejected() {
        let policy = TtlPolicy::default();
        let err = policy.resolve(MemoryTier::ShortTerm, Some(-5)).unwrap_err();
        assert!(matches!(err, EngramError::Validation(_)));
    }

    #[test]
    fn test_custom_config() {
        let policy = TtlPolicy::from_config(&TtlConfig {
            short_term_seconds: 100,
            working_seconds: 10,
        });
        assert_eq!(policy.tier_default(MemoryTier::ShortTerm), Some(100));
        assert_eq!(policy.tier_default(MemoryTier::Working), Some(10));
    }
}
