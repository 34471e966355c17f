use crate::{
    AnalysisUnit, Analyzer, CharRatioEstimator, Error, PagerConfig, Result, TokenEstimator,
    UnitError, UnitOutcome, UnitResult,
};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback invoked once per completed unit.
pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Progress of a running analysis, reported after each completed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Units with a result so far
    pub completed: usize,
    /// Units handed to a worker so far
    pub dispatched: usize,
    /// The unit that just completed
    pub unit_id: String,
    pub ok: bool,
}

/// Whether a run analyzed every unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub total_tokens: usize,
    pub elapsed_ms: u64,
}

/// Output of one coordinator run: results in input order.
#[derive(Debug, Clone)]
pub struct CoordinatorRun {
    pub results: Vec<UnitResult>,
    pub status: RunStatus,
    pub stats: RunStats,
}

impl CoordinatorRun {
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }

    /// The results of a run that completed, or [`Error::Cancelled`].
    pub fn into_complete(self) -> Result<Vec<UnitResult>> {
        match self.status {
            RunStatus::Completed => Ok(self.results),
            RunStatus::Cancelled => Err(Error::Cancelled {
                completed: self.results.len(),
            }),
        }
    }
}

/// Runs an analyzer over a unit sequence with bounded parallelism.
///
/// At most `max_parallel` units are in analysis at any instant. Workers finish
/// in any order; results are merged back into input order. A unit that fails,
/// panics, times out or returns no content produces a failed [`UnitResult`]
/// and never affects its siblings.
pub struct Coordinator {
    max_parallel: usize,
    per_unit_timeout: Option<Duration>,
    estimator: Arc<dyn TokenEstimator>,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("max_parallel", &self.max_parallel)
            .field("per_unit_timeout", &self.per_unit_timeout)
            .field("estimator", &self.estimator)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn try_new(max_parallel: usize) -> Result<Self> {
        if max_parallel == 0 {
            return Err(Error::Configuration(
                "max_parallel must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            max_parallel,
            per_unit_timeout: None,
            estimator: Arc::new(CharRatioEstimator::default()),
            progress: None,
        })
    }

    pub fn from_config(config: &PagerConfig) -> Result<Self> {
        config.validate()?;
        let estimator = CharRatioEstimator::try_new(config.chars_per_token)?;
        Ok(Self::try_new(config.max_parallel)?
            .with_timeout(config.per_unit_timeout())
            .with_estimator(Arc::new(estimator)))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.per_unit_timeout = timeout;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Analyze `units` and return their results in input order.
    ///
    /// The unit iterator is consumed lazily, one unit per free worker. When
    /// `cancel` fires, queued units are never started, in-flight analyses are
    /// aborted, and the results completed so far are returned with
    /// [`RunStatus::Cancelled`].
    pub async fn run<I, A>(
        &self,
        units: I,
        analyzer: Arc<A>,
        cancel: CancellationToken,
    ) -> CoordinatorRun
    where
        I: IntoIterator<Item = AnalysisUnit>,
        I::IntoIter: Send,
        A: Analyzer + ?Sized + 'static,
    {
        let start = Instant::now();
        let mut units = units.into_iter();
        let workers = match units.size_hint() {
            (_, Some(upper)) => self.max_parallel.min(upper.max(1)),
            (_, None) => self.max_parallel,
        };
        info!(workers, max_parallel = self.max_parallel, "starting analysis run");

        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, UnitResult)>();
        let mut tasks = JoinSet::new();
        let mut merge = OrderedMerge::default();
        let mut dispatched = 0;
        let mut cancelled = false;

        let mut next_unit = units.next();
        while next_unit.is_some() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                Some((position, result)) = rx.recv() => {
                    self.record(&mut merge, position, result, dispatched);
                }
                permit = semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else {
                        warn!("worker pool closed, cancelling run");
                        cancelled = true;
                        break;
                    };
                    let Some(unit) = next_unit.take() else {
                        break;
                    };
                    next_unit = units.next();

                    let position = dispatched;
                    dispatched += 1;
                    let job = UnitJob {
                        unit,
                        analyzer: analyzer.clone(),
                        estimator: self.estimator.clone(),
                        timeout: self.per_unit_timeout,
                        cancel: cancel.clone(),
                    };
                    let tx = tx.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        if let Some(result) = job.execute().await {
                            // the receiver only goes away once the run is over
                            let _ = tx.send((position, result));
                        }
                    });
                }
            }
        }
        drop(tx);

        if cancelled {
            tasks.abort_all();
        }
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    tasks.abort_all();
                }
                message = rx.recv() => match message {
                    Some((position, result)) => self.record(&mut merge, position, result, dispatched),
                    None => break,
                },
            }
        }
        while tasks.join_next().await.is_some() {}

        let results = merge.finish();
        let stats = RunStats::from_results(&results, start.elapsed());
        let status = if cancelled {
            warn!(
                completed = results.len(),
                dispatched, "analysis run cancelled"
            );
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        info!(
            total = stats.total,
            succeeded = stats.succeeded,
            failed = stats.failed,
            tokens = stats.total_tokens,
            elapsed_ms = stats.elapsed_ms,
            "analysis run finished"
        );

        CoordinatorRun {
            results,
            status,
            stats,
        }
    }

    fn record(
        &self,
        merge: &mut OrderedMerge,
        position: usize,
        result: UnitResult,
        dispatched: usize,
    ) {
        match result.error() {
            Some(error) => warn!(unit = %result.unit_id, %error, "unit failed"),
            None => debug!(
                unit = %result.unit_id,
                tokens = result.size_tokens,
                elapsed_ms = result.elapsed_ms,
                "unit analyzed"
            ),
        }

        let progress = self.progress.as_ref().map(|callback| {
            (
                callback,
                Progress {
                    completed: merge.len() + 1,
                    dispatched,
                    unit_id: result.unit_id.clone(),
                    ok: result.is_ok(),
                },
            )
        });
        merge.push(position, result);
        if let Some((callback, progress)) = progress {
            callback(&progress);
        }
    }
}

impl RunStats {
    fn from_results(results: &[UnitResult], elapsed: Duration) -> Self {
        let mut stats = RunStats {
            total: results.len(),
            elapsed_ms: elapsed.as_millis() as u64,
            ..Default::default()
        };
        for result in results {
            stats.total_tokens += result.size_tokens;
            match result.error() {
                None => stats.succeeded += 1,
                Some(error) => {
                    stats.failed += 1;
                    if error.is_timeout() {
                        stats.timed_out += 1;
                    }
                }
            }
        }
        stats
    }
}

/// Everything one worker needs to analyze one unit.
struct UnitJob<A: ?Sized> {
    unit: AnalysisUnit,
    analyzer: Arc<A>,
    estimator: Arc<dyn TokenEstimator>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl<A: Analyzer + ?Sized + 'static> UnitJob<A> {
    /// Analyze the unit. Returns `None` when the run was cancelled first.
    async fn execute(self) -> Option<UnitResult> {
        let UnitJob {
            unit,
            analyzer,
            estimator,
            timeout,
            cancel,
        } = self;
        let start = Instant::now();

        // A separate task so that a panicking analyzer is contained
        let target = unit.clone();
        let handle = tokio::spawn(async move { analyzer.analyze(&target).await });
        let abort = handle.abort_handle();

        let joined = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(UnitError::Panicked(panic_message(e.into_panic()))),
                Err(e) => Err(UnitError::Panicked(e.to_string())),
            }
        };
        let timed = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, joined).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        abort.abort();
                        Err(UnitError::Timeout(limit.as_millis() as u64))
                    }
                },
                None => joined.await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abort.abort();
                return None;
            }
            outcome = timed => outcome,
        };

        Some(build_result(
            &unit,
            outcome,
            estimator.as_ref(),
            start.elapsed(),
        ))
    }
}

fn build_result(
    unit: &AnalysisUnit,
    outcome: std::result::Result<Value, UnitError>,
    estimator: &dyn TokenEstimator,
    elapsed: Duration,
) -> UnitResult {
    let (outcome, size_tokens) = match outcome {
        Ok(content) => match estimator.estimate_value(&content) {
            Ok(size) => (UnitOutcome::Ok { content }, size),
            Err(e) => failed(UnitError::InvalidOutput(e.to_string()), estimator),
        },
        Err(error) => failed(error, estimator),
    };

    UnitResult {
        unit_id: unit.id.clone(),
        ordinal: unit.ordinal,
        affinity: unit.affinity.clone(),
        outcome,
        size_tokens,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

fn failed(error: UnitError, estimator: &dyn TokenEstimator) -> (UnitOutcome, usize) {
    let size = estimator.estimate(&error.to_string());
    (UnitOutcome::Failed { error }, size)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Releases out-of-order completions in input order.
#[derive(Debug, Default)]
struct OrderedMerge {
    next: usize,
    pending: BTreeMap<usize, UnitResult>,
    released: Vec<UnitResult>,
}

impl OrderedMerge {
    fn push(&mut self, position: usize, result: UnitResult) {
        self.pending.insert(position, result);
        while let Some(result) = self.pending.remove(&self.next) {
            self.released.push(result);
            self.next += 1;
        }
    }

    fn len(&self) -> usize {
        self.released.len() + self.pending.len()
    }

    /// Released results followed by the ones stranded behind a gap.
    fn finish(mut self) -> Vec<UnitResult> {
        self.released.extend(self.pending.into_values());
        self.released
    }
}
