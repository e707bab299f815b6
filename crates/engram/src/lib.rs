//! Engram: a tiered consolidation and retrieval engine for agent memory.
//!
//! Memories live in six tiers, each with its own backing store, key
//! shape, and lifecycle: short-term and working (key-value with TTL),
//! episodic (object blobs plus a document index), semantic (vector
//! search), long-term (per-entity summaries), and procedural (named
//! recipes). [`engine::MemoryEngine`] owns the write and read paths for
//! every tier and the cross-tier recall fan-out; all tenant isolation is
//! enforced at that boundary.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ranking;
pub mod record;
pub mod router;
pub mod scope;
pub mod store;
pub mod testing;
pub mod tier;
pub mod ttl;

pub use config::EngineConfig;
pub use embedding::{HashEmbedder, TextEmbedder};
pub use engine::{MemoryEngine, MemoryStores, RecallOutcome};
pub use error::{EngramError, Result};
pub use ranking::RankedMemory;
pub use scope::TenantScope;
pub use tier::MemoryTier;
