//! Performance plumbing for the inference engine
//!
//! - Evaluation cache and recursion guard
//! - Content hashing and import edges for bulk invalidation
//! - Query timings and counters
//! - Independent sessions on parallel workers

pub mod cache;
pub mod incremental;
pub mod metrics;
pub mod parallel;

pub use cache::{CacheKey, CacheStats, EvalCache, ExecutionLimiter, ExecutionLimits, Slot};
pub use incremental::{ContentHash, DependencyGraph};
pub use metrics::{Counter, MetricsSummary, PerformanceMetrics, QueryTimer, TimingStats};
pub use parallel::{AnalysisJob, AnalysisResult, ParallelAnalyzer};
