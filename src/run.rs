use crate::{CoordinatorRun, Error, Result, RunStats, RunStatus, UnitResult};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A finished analysis run: the ordered results of one coordinator execution
/// over one source.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub run_id: String,
    /// Description of the analyzed source
    pub source: String,
    pub results: Vec<UnitResult>,
    pub stats: RunStats,
    pub status: RunStatus,
    created_at: Instant,
}

impl AnalysisRun {
    pub fn new(run_id: impl Into<String>, source: impl Into<String>, run: CoordinatorRun) -> Self {
        Self {
            run_id: run_id.into(),
            source: source.into(),
            results: run.results,
            stats: run.stats,
            status: run.status,
            created_at: Instant::now(),
        }
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| r.unit_id.as_str())
            .collect()
    }

    pub fn total_tokens(&self) -> usize {
        self.results.iter().map(|r| r.size_tokens).sum()
    }

    /// Units that cannot fit in a chunk under `budget`.
    pub fn oversized_units(&self, budget: usize) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.size_tokens > budget)
            .map(|r| r.unit_id.as_str())
            .collect()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Finished runs by id, each kept for a fixed time to live.
#[derive(Debug)]
pub struct RunRegistry {
    runs: DashMap<String, Arc<AnalysisRun>>,
    ttl: Duration,
}

impl RunRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            runs: DashMap::new(),
            ttl,
        }
    }

    /// Store a run, dropping expired ones first.
    pub fn insert(&self, run: AnalysisRun) -> Arc<AnalysisRun> {
        self.purge_expired();
        let run = Arc::new(run);
        self.runs.insert(run.run_id.clone(), run.clone());
        run
    }

    pub fn get(&self, run_id: &str) -> Result<Arc<AnalysisRun>> {
        let run = self
            .runs
            .get(run_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownRun(run_id.to_string()))?;

        if run.age() >= self.ttl {
            self.runs.remove(run_id);
            tracing::debug!(run_id, "run expired");
            return Err(Error::UnknownRun(format!("{run_id} (expired)")));
        }
        Ok(run)
    }

    pub fn remove(&self, run_id: &str) -> Option<Arc<AnalysisRun>> {
        self.runs.remove(run_id).map(|(_, run)| run)
    }

    /// Drop every expired run and return how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.runs.len();
        self.runs.retain(|_, run| run.age() < self.ttl);
        before.saturating_sub(self.runs.len())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
