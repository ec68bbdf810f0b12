//! Evaluation cache and recursion guard
//!
//! Results are memoized per `(node, context, slot)` and bucketed by the file
//! the node lives in, so a whole file's entries are dropped together when its
//! tree is replaced. A key that is already being computed further up the
//! evaluation stack short-circuits to an empty set, which is never stored.
//! Results cut short by a refused execution depend on what else the query
//! evaluated first; they are kept for the rest of that query only.

use crate::ast::{FileId, NodeId, NodeRef};
use crate::core::{ContextId, ValueSet};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// What is being computed for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The node's own value
    Value,
    /// Union of the return expressions of a function execution
    Returns,
    /// Union of the yield expressions of a generator execution
    Yields,
    /// Values bound to a declaring node (assignment target, parameter, alias)
    Binding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub node: NodeRef,
    pub context: ContextId,
    pub slot: Slot,
}

impl CacheKey {
    pub fn new(node: NodeRef, context: ContextId, slot: Slot) -> Self {
        Self { node, context, slot }
    }
}

/// Outcome of [`EvalCache::begin`]
#[derive(Debug)]
pub enum Lookup {
    Hit(ValueSet),
    /// Truncated earlier in this query; anything built on it is truncated too
    Provisional(ValueSet),
    /// The key is already being computed on this evaluation path
    Cycle,
    /// Not cached; the key is now marked in progress
    Miss,
}

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub cycles: usize,
    pub invalidated_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct EvalCache {
    buckets: HashMap<FileId, HashMap<(NodeId, ContextId, Slot), ValueSet>>,
    in_progress: HashSet<CacheKey>,
    /// Truncated results, dropped when the next query starts
    provisional: HashMap<CacheKey, ValueSet>,
    stats: CacheStats,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, key: CacheKey) -> Lookup {
        let cached = self
            .buckets
            .get(&key.node.file)
            .and_then(|bucket| bucket.get(&(key.node.node, key.context, key.slot)));
        if let Some(result) = cached {
            self.stats.hits += 1;
            return Lookup::Hit(result.clone());
        }
        if let Some(result) = self.provisional.get(&key) {
            self.stats.hits += 1;
            return Lookup::Provisional(result.clone());
        }
        if !self.in_progress.insert(key) {
            self.stats.cycles += 1;
            trace!(file = key.node.file.0, node = key.node.node.0, slot = ?key.slot, "recursion guard short circuit");
            return Lookup::Cycle;
        }
        self.stats.misses += 1;
        Lookup::Miss
    }

    /// Complete an evaluation started with a `Miss`
    pub fn finish(&mut self, key: CacheKey, result: &ValueSet) {
        self.in_progress.remove(&key);
        self.buckets
            .entry(key.node.file)
            .or_default()
            .insert((key.node.node, key.context, key.slot), result.clone());
    }

    /// Complete a truncated evaluation; the result lives until [`EvalCache::begin_query`]
    pub fn finish_provisional(&mut self, key: CacheKey, result: &ValueSet) {
        self.in_progress.remove(&key);
        self.provisional.insert(key, result.clone());
    }

    /// Forget per-query state left behind by the previous query
    pub fn begin_query(&mut self) {
        self.provisional.clear();
        self.in_progress.clear();
    }

    /// Abandon an evaluation without storing anything
    pub fn abort(&mut self, key: CacheKey) {
        self.in_progress.remove(&key);
    }

    pub fn get(&self, key: &CacheKey) -> Option<&ValueSet> {
        self.buckets
            .get(&key.node.file)
            .and_then(|bucket| bucket.get(&(key.node.node, key.context, key.slot)))
    }

    pub fn is_in_progress(&self, key: &CacheKey) -> bool {
        self.in_progress.contains(key)
    }

    /// Clear every in-progress marker, used when a query is unwound early
    pub fn clear_in_progress(&mut self) {
        self.in_progress.clear();
    }

    /// Drop every entry keyed on nodes of `file`; returns the number removed
    pub fn invalidate_file(&mut self, file: FileId) -> usize {
        self.provisional.retain(|key, _| key.node.file != file);
        let removed = self.buckets.remove(&file).map_or(0, |bucket| bucket.len());
        self.stats.invalidated_entries += removed;
        removed
    }

    pub fn entries_for(&self, file: FileId) -> usize {
        self.buckets.get(&file).map_or(0, |bucket| bucket.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Bounds on function executions within one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub recursion_limit: usize,
    pub per_function_recursion_limit: usize,
    pub per_function_execution_limit: usize,
    pub total_execution_limit: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            recursion_limit: 400,
            per_function_recursion_limit: 2,
            per_function_execution_limit: 8,
            total_execution_limit: 256,
        }
    }
}

/// Tracks function executions and evaluation depth for the current query
#[derive(Debug, Default)]
pub struct ExecutionLimiter {
    limits: ExecutionLimits,
    active: HashMap<NodeRef, usize>,
    executions: HashMap<NodeRef, usize>,
    total: usize,
    depth: usize,
    /// Refusals so far; never reset, callers compare before and after
    truncations: u64,
}

impl ExecutionLimiter {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Register a new execution of `function`; `false` means it must not run
    pub fn push_execution(&mut self, function: NodeRef) -> bool {
        let active = self.active.get(&function).copied().unwrap_or(0);
        let executions = self.executions.get(&function).copied().unwrap_or(0);
        if active >= self.limits.per_function_recursion_limit
            || executions >= self.limits.per_function_execution_limit
            || self.total >= self.limits.total_execution_limit
        {
            trace!(
                file = function.file.0,
                node = function.node.0,
                active,
                executions,
                total = self.total,
                "execution refused"
            );
            self.truncations += 1;
            return false;
        }
        *self.active.entry(function).or_default() += 1;
        *self.executions.entry(function).or_default() += 1;
        self.total += 1;
        true
    }

    pub fn pop_execution(&mut self, function: NodeRef) {
        if let Some(count) = self.active.get_mut(&function) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active.remove(&function);
            }
        }
    }

    /// Enter one level of evaluation; `false` once the depth limit is reached
    pub fn enter(&mut self) -> bool {
        if self.depth >= self.limits.recursion_limit {
            self.truncations += 1;
            return false;
        }
        self.depth += 1;
        true
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn truncations(&self) -> u64 {
        self.truncations
    }

    /// Record that a truncated result was reused
    pub fn note_truncation(&mut self) {
        self.truncations += 1;
    }

    /// Forget everything recorded for the previous query
    pub fn reset(&mut self) {
        self.active.clear();
        self.executions.clear();
        self.total = 0;
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValueId;

    fn key(file: u32, node: u32) -> CacheKey {
        CacheKey::new(NodeRef::new(FileId(file), NodeId(node)), ContextId(0), Slot::Value)
    }

    #[test]
    fn test_begin_finish_hit() {
        let mut cache = EvalCache::new();
        let k = key(0, 1);
        assert!(matches!(cache.begin(k), Lookup::Miss));
        cache.finish(k, &ValueSet::single(ValueId(4)));
        match cache.begin(k) {
            Lookup::Hit(set) => assert!(set.contains(ValueId(4))),
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_cycle_is_not_cached() {
        let mut cache = EvalCache::new();
        let k = key(0, 1);
        assert!(matches!(cache.begin(k), Lookup::Miss));
        assert!(matches!(cache.begin(k), Lookup::Cycle));
        assert!(cache.get(&k).is_none());
        cache.abort(k);
        assert!(!cache.is_in_progress(&k));
        assert!(matches!(cache.begin(k), Lookup::Miss));
    }

    #[test]
    fn test_invalidate_file_is_bulk() {
        let mut cache = EvalCache::new();
        for node in 0..3 {
            let k = key(0, node);
            cache.begin(k);
            cache.finish(k, &ValueSet::empty());
        }
        let other = key(1, 0);
        cache.begin(other);
        cache.finish(other, &ValueSet::empty());

        assert_eq!(cache.invalidate_file(FileId(0)), 3);
        assert_eq!(cache.entries_for(FileId(0)), 0);
        assert_eq!(cache.entries_for(FileId(1)), 1);
        assert_eq!(cache.stats().invalidated_entries, 3);
    }

    #[test]
    fn test_provisional_results_last_one_query() {
        let mut cache = EvalCache::new();
        let k = key(0, 1);
        assert!(matches!(cache.begin(k), Lookup::Miss));
        cache.finish_provisional(k, &ValueSet::empty());
        assert!(matches!(cache.begin(k), Lookup::Provisional(_)));
        assert!(cache.get(&k).is_none());
        assert_eq!(cache.entries_for(FileId(0)), 0);

        cache.begin_query();
        assert!(matches!(cache.begin(k), Lookup::Miss));
    }

    #[test]
    fn test_limiter_counts_truncations() {
        let mut limiter = ExecutionLimiter::new(ExecutionLimits {
            per_function_execution_limit: 1,
            recursion_limit: 1,
            ..ExecutionLimits::default()
        });
        let f = NodeRef::new(FileId(0), NodeId(3));
        assert!(limiter.push_execution(f));
        limiter.pop_execution(f);
        assert_eq!(limiter.truncations(), 0);
        assert!(!limiter.push_execution(f));
        assert!(limiter.enter());
        assert!(!limiter.enter());
        assert_eq!(limiter.truncations(), 2);
        limiter.reset();
        assert_eq!(limiter.truncations(), 2);
    }

    #[test]
    fn test_limiter_per_function_recursion() {
        let mut limiter = ExecutionLimiter::new(ExecutionLimits {
            per_function_recursion_limit: 2,
            ..ExecutionLimits::default()
        });
        let f = NodeRef::new(FileId(0), NodeId(7));
        assert!(limiter.push_execution(f));
        assert!(limiter.push_execution(f));
        assert!(!limiter.push_execution(f));
        limiter.pop_execution(f);
        assert!(limiter.push_execution(f));
    }

    #[test]
    fn test_limiter_total_and_reset() {
        let mut limiter = ExecutionLimiter::new(ExecutionLimits {
            total_execution_limit: 3,
            per_function_execution_limit: 100,
            per_function_recursion_limit: 100,
            recursion_limit: 2,
        });
        for node in 0..3 {
            let f = NodeRef::new(FileId(0), NodeId(node));
            assert!(limiter.push_execution(f));
            limiter.pop_execution(f);
        }
        assert!(!limiter.push_execution(NodeRef::new(FileId(0), NodeId(9))));

        assert!(limiter.enter());
        assert!(limiter.enter());
        assert!(!limiter.enter());
        limiter.reset();
        assert_eq!(limiter.depth(), 0);
        assert!(limiter.push_execution(NodeRef::new(FileId(0), NodeId(9))));
    }
}
