//! Flat engine configuration record, accepted once at `QueryEngine` construction.
//!
//! Mirrors the configuration table in the external-interfaces section of
//! the design: every field here has a name and default that a caller can
//! read back without consulting source.

/// Row count per parallel execution chunk; also the zone-map chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 16_384;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Row count per parallel chunk. Zone-map chunk size is locked to this value.
    pub chunk_size: usize,
    /// Minimum estimated row count to pick the parallel strategy.
    pub parallel_row_threshold: u64,
    /// Minimum chunk length for the SIMD path.
    pub simd_row_threshold: usize,
    /// Maximum cached logical plans (LRU-evicted beyond this).
    pub plan_cache_capacity: usize,
    /// If true, an unsupported predicate fails translation; if false, the
    /// whole `Filter` defers to row-at-a-time evaluation via the renderer.
    pub strict_predicate: bool,
    /// Worker pool size for parallel chunk execution.
    pub worker_count: usize,
    /// Whether to build zone maps at snapshot publication.
    pub build_zone_maps: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel_row_threshold: 50_000,
            simd_row_threshold: 1_000,
            plan_cache_capacity: 100,
            strict_predicate: true,
            worker_count: num_cpus::get(),
            build_zone_maps: true,
        }
    }
}

impl EngineConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_strict_predicate(mut self, strict: bool) -> Self {
        self.strict_predicate = strict;
        self
    }
}
