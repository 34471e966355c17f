use crate::{
    AnalysisRun, Analyzer, CharRatioEstimator, Coordinator, ExportFormat, FileAnalyzer,
    FsSource, MemoryCache, Page, PaginationContext, PaginationEngine, Pager, PagerConfig,
    ProgressFn, Result, RunRegistry, RunStatus, StrategyKind, TokenEstimator, UnitResult,
    UnitSource,
    render::renderer_for,
};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// A request for the next page of a run.
///
/// Strategy and budget overrides shape the first page. Later pages follow the
/// continuation token; an explicit strategy must then match the token's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub run_id: String,
    pub continuation: Option<String>,
    pub strategy: Option<StrategyKind>,
    pub token_budget: Option<usize>,
}

impl PageRequest {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    pub fn with_continuation(mut self, token: impl Into<String>) -> Self {
        self.continuation = Some(token.into());
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = Some(budget);
        self
    }
}

/// An owned page, detached from the stored run.
#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub run_id: String,
    /// `cancelled` when the run only holds the units completed before cancellation
    pub run_status: RunStatus,
    pub strategy: StrategyKind,
    pub token_budget: usize,
    pub sequence_number: usize,
    pub is_final: bool,
    pub token_count: usize,
    pub items: Vec<UnitResult>,
    pub continuation_token: Option<String>,
    /// Set on the final page; re-presenting it returns an empty final page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_token: Option<String>,
    pub failed_units: Vec<String>,
    pub skipped_failures: usize,
    pub oversized_units: Vec<String>,
    pub remaining_units: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continues_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_group: Option<String>,
}

impl From<Page<'_>> for PageView {
    fn from(page: Page<'_>) -> Self {
        Self {
            run_id: page.context.run_id,
            run_status: RunStatus::default(),
            strategy: page.context.strategy,
            token_budget: page.context.token_budget,
            sequence_number: page.chunk.sequence_number,
            is_final: page.chunk.is_final,
            token_count: page.chunk.token_count,
            items: page.chunk.items.into_iter().cloned().collect(),
            continuation_token: page.continuation,
            terminal_token: None,
            failed_units: page.failed_units,
            skipped_failures: page.skipped_failures,
            oversized_units: page.oversized_units,
            remaining_units: page.remaining_units,
            continues_group: page.continues_group,
            open_group: page.open_group,
        }
    }
}

/// The code pager: analyzes sources, keeps the runs, and serves them page by
/// page or as a rendered document.
pub struct CodePager {
    config: PagerConfig,
    estimator: Arc<dyn TokenEstimator>,
    analyzer: Arc<dyn Analyzer>,
    progress: Option<ProgressFn>,
    registry: RunRegistry,
    cancel: CancellationToken,
}

impl CodePager {
    /// Create a pager with the default file analyzer.
    pub fn try_new(config: PagerConfig) -> Result<Self> {
        config.validate()?;
        let estimator = CharRatioEstimator::try_new(config.chars_per_token)?;
        let analyzer = FileAnalyzer::new(config.max_file_size)
            .with_cache(Arc::new(MemoryCache::default()));
        let registry = RunRegistry::new(config.run_ttl());

        Ok(Self {
            config,
            estimator: Arc::new(estimator),
            analyzer: Arc::new(analyzer),
            progress: None,
            registry,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
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

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    /// Filesystem source for `root` using the configured walk settings.
    pub fn fs_source(&self, root: impl AsRef<Path>) -> FsSource {
        FsSource::new(root.as_ref())
            .with_ignore_dirs(self.config.ignore_dirs.clone())
            .with_unknown_languages(self.config.include_unknown)
    }

    pub fn run(&self, run_id: &str) -> Result<Arc<AnalysisRun>> {
        self.registry.get(run_id)
    }

    /// Forget a stored run.
    pub fn discard(&self, run_id: &str) -> bool {
        self.registry.remove(run_id).is_some()
    }

    /// Use `cancel` as the parent of every run's cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancel every in-flight analysis. Pending and later `analyze` calls store
    /// whatever completed with [`RunStatus::Cancelled`].
    pub fn shutdown(&self) {
        info!("shutting down pager");
        self.cancel.cancel();
    }

    fn engine(&self, strategy: StrategyKind, token_budget: usize) -> Result<PaginationEngine> {
        Ok(PaginationEngine::try_new(strategy, token_budget)?
            .with_drop_failed(self.config.drop_failed)
            .with_secret(self.config.context_secret.clone()))
    }

    fn coordinator(&self) -> Result<Coordinator> {
        let coordinator = Coordinator::try_new(self.config.max_parallel)?
            .with_timeout(self.config.per_unit_timeout())
            .with_estimator(self.estimator.clone());
        Ok(match &self.progress {
            Some(progress) => coordinator.with_progress(progress.clone()),
            None => coordinator,
        })
    }
}

#[async_trait]
impl Pager for CodePager {
    async fn analyze(&self, source: &dyn UnitSource) -> Result<String> {
        let description = source.describe();
        let units = source.units()?;
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, source = %description, units = units.len(), "analyzing source");

        let run = self
            .coordinator()?
            .run(units, self.analyzer.clone(), self.cancel.child_token())
            .await;
        if run.is_cancelled() {
            warn!(
                run_id = %run_id,
                completed = run.results.len(),
                "storing partial results of a cancelled run"
            );
        }

        self.registry
            .insert(AnalysisRun::new(run_id.clone(), description, run));
        Ok(run_id)
    }

    async fn get_page(&self, request: &PageRequest) -> Result<PageView> {
        let run = self.registry.get(&request.run_id)?;
        let secret = self.config.context_secret.as_deref();

        let strategy = match (&request.strategy, &request.continuation) {
            (Some(strategy), _) => *strategy,
            (None, Some(token)) => PaginationContext::decode(token, secret)?.strategy,
            (None, None) => self.config.strategy,
        };
        let budget = request.token_budget.unwrap_or(self.config.token_budget);

        let engine = self.engine(strategy, budget)?;
        let page = engine.next_page(&run, request.continuation.as_deref())?;
        let terminal_token = if page.context.terminal {
            Some(engine.encode_context(&page.context)?)
        } else {
            None
        };
        Ok(PageView {
            run_status: run.status,
            terminal_token,
            ..page.into()
        })
    }

    async fn render(&self, run_id: &str, format: &str) -> Result<Vec<u8>> {
        let format: ExportFormat = format.parse()?;
        let run = self.registry.get(run_id)?;
        let engine = self.engine(self.config.strategy, self.config.token_budget)?;
        let chunks = engine.collect_chunks(&run)?;
        info!(run_id, format = %format, chunks = chunks.len(), "rendering run");
        renderer_for(format).render(&run, &chunks)
    }
}
