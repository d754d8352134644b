//! Logical-plan cache, keyed by a query's canonical (constant-abstracted)
//! form so repeated queries differing only in literal values skip
//! translation and optimization entirely. Grounded on `dashmap`'s
//! sharded-lock map, the same concurrency primitive the teacher's
//! `SessionState` table registry reaches for instead of a single
//! `Mutex<HashMap<_>>` — reads from many concurrent query submissions
//! should not serialize on one lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::plan::LogicalPlanNode;

/// A concurrent, capacity-bounded cache from a query's canonical key to
/// its already-optimized logical plan. Eviction is plain LRU: the
/// recency queue is a separate, short-critical-section `Mutex`, kept
/// deliberately apart from the `DashMap` so a cache hit's read path
/// never blocks on eviction bookkeeping for an unrelated key.
pub struct PlanCache {
    capacity: usize,
    entries: DashMap<String, Arc<LogicalPlanNode>>,
    recency: Mutex<VecDeque<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::new(),
            recency: Mutex::new(VecDeque::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached plan for `key`, or builds one with `build`,
    /// inserts it, and evicts the least-recently-used entry if the
    /// cache is now over capacity.
    pub fn get_or_insert_with(
        &self,
        key: String,
        build: impl FnOnce() -> Result<Arc<LogicalPlanNode>>,
    ) -> Result<Arc<LogicalPlanNode>> {
        if let Some(plan) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.touch(&key);
            return Ok(plan.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let plan = build()?;
        self.insert(key, plan.clone());
        Ok(plan)
    }

    fn insert(&self, key: String, plan: Arc<LogicalPlanNode>) {
        self.entries.insert(key.clone(), plan);
        self.touch(&key);
        self.evict_if_over_capacity();
    }

    fn touch(&self, key: &str) {
        let mut recency = self.recency.lock();
        recency.retain(|k| k != key);
        recency.push_back(key.to_string());
    }

    fn evict_if_over_capacity(&self) {
        if self.capacity == 0 {
            return;
        }
        let mut recency = self.recency.lock();
        while recency.len() > self.capacity {
            if let Some(oldest) = recency.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LogicalType, Schema, SchemaRef};
    use std::sync::atomic::AtomicUsize;

    fn plan(row_count: u64) -> Arc<LogicalPlanNode> {
        let schema: SchemaRef = Arc::new(Schema::new(vec![crate::schema::ColumnDef {
            name: "n".into(),
            logical_type: LogicalType::I32,
            nullable: false,
            encoding: crate::schema::Encoding::Plain,
        }]));
        Arc::new(LogicalPlanNode::scan("t", schema, row_count))
    }

    #[test]
    fn repeated_key_hits_without_rebuilding() {
        let cache = PlanCache::new(10);
        let builds = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_insert_with("k".into(), || {
                    builds.fetch_add(1, Ordering::Relaxed);
                    Ok(plan(100))
                })
                .unwrap();
        }
        assert_eq!(builds.load(Ordering::Relaxed), 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn over_capacity_evicts_least_recently_used() {
        let cache = PlanCache::new(2);
        cache.get_or_insert_with("a".into(), || Ok(plan(1))).unwrap();
        cache.get_or_insert_with("b".into(), || Ok(plan(2))).unwrap();
        // touch "a" so "b" becomes the least recently used
        cache.get_or_insert_with("a".into(), || Ok(plan(1))).unwrap();
        cache.get_or_insert_with("c".into(), || Ok(plan(3))).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.entries.contains_key("a"));
        assert!(cache.entries.contains_key("c"));
        assert!(!cache.entries.contains_key("b"));
    }
}
