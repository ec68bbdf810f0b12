//! Query timings and engine counters
//!
//! Counters are a fixed set of atomics so hot paths (function executions,
//! import misses) never take a lock. Timings are kept per query kind with a
//! bounded window of recent samples for percentiles.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Recent samples kept per query kind
const SAMPLE_WINDOW: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Queries,
    Cancelled,
    Executions,
    ExecutionsRefused,
    ImportMisses,
    BridgeFailures,
    MalformedNodes,
    InvalidatedFiles,
}

impl Counter {
    pub const ALL: [Counter; 8] = [
        Counter::Queries,
        Counter::Cancelled,
        Counter::Executions,
        Counter::ExecutionsRefused,
        Counter::ImportMisses,
        Counter::BridgeFailures,
        Counter::MalformedNodes,
        Counter::InvalidatedFiles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::Queries => "queries",
            Counter::Cancelled => "queries.cancelled",
            Counter::Executions => "function.executions",
            Counter::ExecutionsRefused => "function.executions_refused",
            Counter::ImportMisses => "imports.misses",
            Counter::BridgeFailures => "bridge.failures",
            Counter::MalformedNodes => "nodes.malformed",
            Counter::InvalidatedFiles => "files.invalidated",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct QueryTimings {
    count: u64,
    total: Duration,
    max: Duration,
    recent: VecDeque<Duration>,
}

impl QueryTimings {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
        if self.recent.len() == SAMPLE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(elapsed);
    }

    fn stats(&self) -> TimingStats {
        let mut sorted: Vec<Duration> = self.recent.iter().copied().collect();
        sorted.sort();
        let percentile = |p: f64| match sorted.len() {
            0 => Duration::ZERO,
            n => sorted[((n as f64 * p) as usize).min(n - 1)],
        };
        TimingStats {
            count: self.count,
            total: self.total,
            mean: match self.count {
                0 => Duration::ZERO,
                n => self.total.div_f64(n as f64),
            },
            max: self.max,
            p50: percentile(0.50),
            p95: percentile(0.95),
        }
    }
}

/// Metrics collector owned by one session
pub struct PerformanceMetrics {
    counters: [AtomicU64; Counter::ALL.len()],
    queries: RwLock<HashMap<&'static str, QueryTimings>>,
    created: Instant,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            queries: RwLock::new(HashMap::new()),
            created: Instant::now(),
        }
    }

    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, value: u64) {
        self.counters[counter.slot()].fetch_add(value, Ordering::Relaxed);
    }

    pub fn get_counter(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    pub fn record_query(&self, query: &'static str, elapsed: Duration) {
        self.queries.write().entry(query).or_default().record(elapsed);
    }

    pub fn query_stats(&self, query: &str) -> Option<TimingStats> {
        self.queries.read().get(query).map(QueryTimings::stats)
    }

    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
        self.queries.write().clear();
    }

    pub fn summary(&self) -> MetricsSummary {
        let mut queries: Vec<(&'static str, TimingStats)> =
            self.queries.read().iter().map(|(&name, t)| (name, t.stats())).collect();
        queries.sort_by_key(|(name, _)| *name);
        MetricsSummary {
            uptime: self.created.elapsed(),
            queries,
            counters: Counter::ALL.iter().map(|&c| (c, self.get_counter(c))).collect(),
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PerformanceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMetrics")
            .field("queries", &self.get_counter(Counter::Queries))
            .field("executions", &self.get_counter(Counter::Executions))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingStats {
    pub count: u64,
    pub total: Duration,
    pub mean: Duration,
    pub max: Duration,
    /// Over the most recent samples only
    pub p50: Duration,
    pub p95: Duration,
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub queries: Vec<(&'static str, TimingStats)>,
    pub counters: Vec<(Counter, u64)>,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "uptime {:.2?}", self.uptime)?;
        for (name, stats) in &self.queries {
            writeln!(
                f,
                "query {name}: count={} mean={:.2?} p95={:.2?} max={:.2?}",
                stats.count, stats.mean, stats.p95, stats.max
            )?;
        }
        for (counter, value) in self.counters.iter().filter(|(_, v)| *v > 0) {
            writeln!(f, "{}: {value}", counter.name())?;
        }
        Ok(())
    }
}

/// Records the elapsed time of one query when dropped
pub struct QueryTimer<'a> {
    metrics: &'a PerformanceMetrics,
    query: &'static str,
    start: Instant,
}

impl<'a> QueryTimer<'a> {
    pub fn start(metrics: &'a PerformanceMetrics, query: &'static str) -> Self {
        Self {
            metrics,
            query,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer<'_> {
    fn drop(&mut self) {
        self.metrics.record_query(self.query, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_stats() {
        let metrics = PerformanceMetrics::new();
        metrics.record_query("infer", Duration::from_millis(100));
        metrics.record_query("infer", Duration::from_millis(200));
        metrics.record_query("infer", Duration::from_millis(150));

        let stats = metrics.query_stats("infer").unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.max, Duration::from_millis(200));
        assert_eq!(stats.mean, Duration::from_millis(150));
        assert_eq!(stats.p50, Duration::from_millis(150));
        assert!(metrics.query_stats("goto").is_none());
    }

    #[test]
    fn test_sample_window_is_bounded() {
        let mut timings = QueryTimings::default();
        for i in 0..(SAMPLE_WINDOW as u64 + 10) {
            timings.record(Duration::from_micros(i));
        }
        assert_eq!(timings.recent.len(), SAMPLE_WINDOW);
        assert_eq!(timings.count, SAMPLE_WINDOW as u64 + 10);
        assert_eq!(timings.recent.front().copied(), Some(Duration::from_micros(10)));
    }

    #[test]
    fn test_counters_and_summary() {
        let metrics = PerformanceMetrics::new();
        metrics.increment(Counter::Queries);
        metrics.add(Counter::Executions, 4);
        assert_eq!(metrics.get_counter(Counter::Queries), 1);
        assert_eq!(metrics.get_counter(Counter::Executions), 4);
        assert_eq!(metrics.get_counter(Counter::BridgeFailures), 0);

        {
            let _timer = QueryTimer::start(&metrics, "goto");
        }
        let text = metrics.summary().to_string();
        assert!(text.contains("query goto: count=1"));
        assert!(text.contains("function.executions: 4"));
        assert!(!text.contains("bridge.failures"));

        metrics.reset();
        assert_eq!(metrics.get_counter(Counter::Queries), 0);
        assert!(metrics.query_stats("goto").is_none());
    }
}
