//! Configuration for the storage, resolver and pipeline layers.

use serde::{Deserialize, Serialize};

use crate::enums::CompressionType;

/// Content store and registry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Codec applied to blobs on `put`.
    pub compression: CompressionType,
    /// Zstandard level when `compression` is zstd (1-22).
    pub zstd_level: i32,
    /// Compressed blobs at or under this size are stored inline; larger ones
    /// go through the chunked large-object path.
    pub inline_threshold_bytes: usize,
    /// Chunk size for large-object storage.
    pub lob_chunk_bytes: usize,
    /// Retries allowed before a failed schema/linkbase stays failed.
    pub max_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression: CompressionType::Zstd,
            zstd_level: 3,
            inline_threshold_bytes: 1024 * 1024,
            lob_chunk_bytes: 256 * 1024,
            max_attempts: 3,
        }
    }
}

/// DTS resolution tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Hard cap on namespaces visited in one resolution pass. Defends
    /// against combinatorial import graphs.
    pub node_budget: usize,
    /// Concurrent fetches of one dependency frontier.
    pub fetch_fanout: usize,
    /// Per-fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// In-process retries for transient fetch failures.
    pub fetch_retries: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            node_budget: 512,
            fetch_fanout: 4,
            fetch_timeout_secs: 30,
            fetch_retries: 3,
        }
    }
}

/// Per-filing pipeline tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub resolver: ResolverConfig,
}

impl PipelineConfig {
    /// Read overrides from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(budget) = env_parse("XBRLKIT_NODE_BUDGET") {
            cfg.resolver.node_budget = budget;
        }
        if let Some(fanout) = env_parse("XBRLKIT_FETCH_FANOUT") {
            cfg.resolver.fetch_fanout = fanout;
        }
        if let Some(timeout) = env_parse("XBRLKIT_FETCH_TIMEOUT_SECS") {
            cfg.resolver.fetch_timeout_secs = timeout;
        }
        if let Some(attempts) = env_parse("XBRLKIT_MAX_ATTEMPTS") {
            cfg.store.max_attempts = attempts;
        }
        if let Some(threshold) = env_parse("XBRLKIT_INLINE_THRESHOLD") {
            cfg.store.inline_threshold_bytes = threshold;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.store.compression, CompressionType::Zstd);
        assert_eq!(cfg.store.inline_threshold_bytes, 1024 * 1024);
        assert_eq!(cfg.resolver.node_budget, 512);
        assert_eq!(cfg.store.max_attempts, 3);
    }
}
