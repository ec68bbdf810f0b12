//! Parallel file analysis
//!
//! Each job gets its own [`Session`], so nothing but the native bridge is
//! shared between workers. The bridge memoizes module signatures itself,
//! which lets every job reuse one introspection per compiled module.

use crate::analysis::{Completion, Session};
use crate::compiled::NativeBridge;
use crate::errors::{InferError, Result};
use crate::frontend::Config;
use dashmap::DashMap;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One file to analyze, from disk or from memory
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub id: usize,
    pub path: PathBuf,
    /// Buffer contents; the file is read from `path` when absent
    pub source: Option<String>,
}

/// Outline of one analyzed file
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub id: usize,
    pub path: PathBuf,
    pub names: Vec<Completion>,
    /// Set when the file could not be read or parsed
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Runs independent sessions on rayon workers
pub struct ParallelAnalyzer {
    config: Config,
    bridge: Option<Arc<dyn NativeBridge>>,
    pool: Option<rayon::ThreadPool>,
    results: DashMap<usize, AnalysisResult>,
}

impl ParallelAnalyzer {
    /// `workers == 0` uses rayon's global pool
    pub fn new(config: Config, workers: usize) -> Result<Self> {
        let pool = if workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("pysense-worker-{i}"))
                .build()
                .map_err(|e| InferError::Config(format!("worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            config,
            bridge: None,
            pool,
            results: DashMap::new(),
        })
    }

    /// Share one native bridge between every job's session
    pub fn with_bridge(mut self, bridge: Arc<dyn NativeBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn worker_count(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Analyze `jobs` in parallel; results come back in job order
    pub fn analyze(&self, jobs: Vec<AnalysisJob>) -> Vec<AnalysisResult> {
        self.results.clear();
        let started = Instant::now();
        let run = || {
            jobs.par_iter().for_each(|job| {
                let result = self.analyze_job(job);
                self.results.insert(job.id, result);
            });
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }

        let mut results: Vec<AnalysisResult> = self.results.iter().map(|entry| entry.value().clone()).collect();
        results.sort_by_key(|r| r.id);
        info!(
            jobs = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "parallel analysis finished"
        );
        results
    }

    /// Analyze every `.py` and `.pyi` file below `root`
    pub fn analyze_project(&self, root: &Path) -> Result<Vec<AnalysisResult>> {
        let mut paths = Vec::new();
        for extension in ["py", "pyi"] {
            let pattern = root.join("**").join(format!("*.{extension}"));
            let pattern = pattern.to_string_lossy().into_owned();
            let entries = glob::glob(&pattern).map_err(|e| InferError::Config(format!("{pattern}: {e}")))?;
            paths.extend(entries.filter_map(|entry| entry.ok()));
        }
        paths.sort();
        let jobs = paths
            .into_iter()
            .enumerate()
            .map(|(id, path)| AnalysisJob { id, path, source: None })
            .collect();
        Ok(self.analyze(jobs))
    }

    pub fn get_result(&self, id: usize) -> Option<AnalysisResult> {
        self.results.get(&id).map(|r| r.clone())
    }

    fn analyze_job(&self, job: &AnalysisJob) -> AnalysisResult {
        let start = Instant::now();
        let outcome = self.outline_job(job);
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(names) => {
                debug!(path = %job.path.display(), names = names.len(), duration_ms, "job analyzed");
                AnalysisResult {
                    id: job.id,
                    path: job.path.clone(),
                    names,
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                warn!(path = %job.path.display(), error = %e, "job failed");
                AnalysisResult {
                    id: job.id,
                    path: job.path.clone(),
                    names: Vec::new(),
                    error: Some(e.to_string()),
                    duration_ms,
                }
            }
        }
    }

    fn outline_job(&self, job: &AnalysisJob) -> Result<Vec<Completion>> {
        let mut session = Session::new(self.config.clone());
        if let Some(bridge) = &self.bridge {
            session = session.with_bridge(Some(Arc::clone(bridge)));
        }
        let file = match &job.source {
            Some(source) => session.add_source(Some(&job.path), source)?,
            None => session.load_file(&job.path)?,
        };
        session.outline(file)
    }
}
