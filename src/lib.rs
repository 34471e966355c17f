//! # CodePager
//!
//! `codepager` analyzes a codebase concurrently and serves the analysis as a
//! deterministic, resumable sequence of chunks that each fit a token budget.
//! It is meant for consumers with a bounded context window, such as LLM agents.
//!
//! ## Features
//!
//! - **Bounded concurrency**: units are analyzed by at most `max_parallel`
//!   workers, results come back in source order, and a failing unit never
//!   takes its siblings down
//! - **Pluggable chunking**: choose how results are grouped into pages:
//!   - `FileByFile`: one unit per page
//!   - `ChunkByChunk`: greedily fill each page up to the token budget
//!   - `Smart`: fill pages but keep related units (same directory) together
//! - **Stateless pagination**: the caller holds an opaque, integrity-checked
//!   continuation token; the engine keeps nothing between calls
//! - **Tree-sitter analysis**: Rust, Python, TypeScript, Go and C/C++ outlines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codepager::{CodePager, FsSource, PageRequest, Pager, PagerConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pager = CodePager::try_new(PagerConfig::default())?;
//!     let run_id = pager.analyze(&FsSource::new("src")).await?;
//!
//!     let mut request = PageRequest::new(&run_id);
//!     loop {
//!         let page = pager.get_page(&request).await?;
//!         println!("chunk {} ({} tokens)", page.sequence_number, page.token_count);
//!         match page.continuation_token {
//!             Some(token) => request = PageRequest::new(&run_id).with_continuation(token),
//!             None => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Using the core directly
//!
//! The coordinator and the pagination engine work with any unit source and
//! analyzer:
//!
//! ```rust
//! use codepager::{
//!     AnalysisRun, AnalysisUnit, Coordinator, PaginationEngine, StrategyKind, analyzer_fn,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> codepager::Result<()> {
//! let units = (0..5).map(|i| AnalysisUnit::new(format!("unit-{i}"), i, ""));
//! let analyzer = Arc::new(analyzer_fn(|unit: AnalysisUnit| async move {
//!     Ok(json!({ "id": unit.id }))
//! }));
//!
//! let run = Coordinator::try_new(2)?
//!     .run(units, analyzer, CancellationToken::new())
//!     .await;
//! let run = AnalysisRun::new("demo", "memory", run);
//!
//! let engine = PaginationEngine::try_new(StrategyKind::ChunkByChunk, 20)?;
//! let chunks = engine.collect_chunks(&run)?;
//! assert_eq!(chunks.iter().map(|c| c.items.len()).sum::<usize>(), 5);
//! assert!(chunks.last().unwrap().is_final);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Run-level failures are reported through [`Error`]; failures of a single
//! unit are recorded in its [`UnitResult`] as a [`UnitError`]:
//!
//! ```rust
//! use codepager::{Error, PaginationContext};
//!
//! let err = PaginationContext::decode("not-a-token", None).unwrap_err();
//! assert!(matches!(err, Error::InvalidContext(_)));
//! ```

pub mod analysis;
mod chunking;
mod config;
mod context;
mod coordinator;
mod engine;
mod error;
#[cfg(feature = "mcp")]
pub mod mcp;
mod pager;
pub mod render;
mod run;
mod source;
mod token;
mod unit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use analysis::{FileAnalyzer, LanguageType, MemoryCache};
pub use chunking::{ChunkPlan, ChunkingStrategy, StrategyState, strategy_for};
pub use config::{ENV_CONTEXT_SECRET, ENV_MAX_PARALLEL, ENV_TOKEN_BUDGET, PagerConfig};
pub use context::{CONTEXT_VERSION, MAX_TOKEN_LEN, PaginationContext};
pub use coordinator::{Coordinator, CoordinatorRun, Progress, ProgressFn, RunStats, RunStatus};
pub use engine::{Chunk, Page, PaginationEngine};
pub use error::{Error, Result, UnitError};
pub use pager::{CodePager, PageRequest, PageView};
pub use render::{ExportFormat, Renderer};
pub use run::{AnalysisRun, RunRegistry};
pub use source::{Analyzer, FnAnalyzer, FsSource, UnitSource, analyzer_fn};
pub use token::{CharRatioEstimator, ContentKind, DEFAULT_CHARS_PER_TOKEN, TokenEstimator};
pub use unit::{AnalysisUnit, UnitOutcome, UnitResult};

/// Policy used to group ordered unit results into chunks.
///
/// # Examples
///
/// ```
/// use codepager::StrategyKind;
///
/// let kind: StrategyKind = "chunk-by-chunk".parse().unwrap();
/// assert_eq!(kind, StrategyKind::ChunkByChunk);
/// assert_eq!(kind.to_string(), "chunk_by_chunk");
/// assert_eq!(StrategyKind::default(), StrategyKind::Smart);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One unit per chunk; the budget is advisory only
    FileByFile,

    /// Greedy accumulation up to the token budget
    ChunkByChunk,

    /// Greedy accumulation that avoids splitting affinity groups
    #[default]
    Smart,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::FileByFile => "file_by_file",
            StrategyKind::ChunkByChunk => "chunk_by_chunk",
            StrategyKind::Smart => "smart",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "file_by_file" => Ok(StrategyKind::FileByFile),
            "chunk_by_chunk" => Ok(StrategyKind::ChunkByChunk),
            "smart" => Ok(StrategyKind::Smart),
            other => Err(Error::Configuration(format!(
                "unknown pagination strategy {:?}",
                other
            ))),
        }
    }
}

/// The tool surface of a code pager.
///
/// Implementations analyze a source once, keep the run, and serve it page by
/// page or as a rendered document.
#[async_trait]
pub trait Pager {
    /// Analyze every unit of `source` and return the id of the stored run.
    ///
    /// A cancelled run is stored too, holding the units completed before
    /// cancellation and marked [`RunStatus::Cancelled`].
    async fn analyze(&self, source: &dyn UnitSource) -> Result<String>;

    /// Return the next page of a run.
    async fn get_page(&self, request: &PageRequest) -> Result<PageView>;

    /// Render a whole run in the given export format.
    async fn render(&self, run_id: &str, format: &str) -> Result<Vec<u8>>;
}
