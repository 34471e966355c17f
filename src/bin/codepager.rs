use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use codepager::{
    CodePager, PageRequest, Pager, PagerConfig, Progress, RunStatus, StrategyKind,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    name = "codepager",
    about = "Analyze source code concurrently and page the results within a token budget",
    version
)]
struct Cli {
    input: PathBuf,

    /// Output file for the rendered document (stdout if not provided)
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Strategy used to group results into chunks
    #[clap(short, long, value_enum)]
    strategy: Option<OutputStrategy>,

    /// Maximum estimated tokens per chunk
    #[clap(short = 'b', long)]
    token_budget: Option<usize>,

    /// Maximum number of files analyzed at the same time
    #[clap(short = 'j', long)]
    max_parallel: Option<usize>,

    /// Per-file analysis timeout in milliseconds
    #[clap(long)]
    timeout_ms: Option<u64>,

    /// Export format of the rendered document (markdown, json)
    #[clap(short, long, default_value = "markdown")]
    format: String,

    /// TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Leave failed files out of the chunks
    #[clap(long)]
    drop_failed: bool,

    /// Print one page at a time with its continuation token instead of a document
    #[clap(long)]
    paged: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputStrategy {
    /// One file per chunk
    FileByFile,
    /// Fill each chunk up to the token budget
    ChunkByChunk,
    /// Fill chunks but keep files of the same directory together
    Smart,
}

impl From<OutputStrategy> for StrategyKind {
    fn from(strategy: OutputStrategy) -> Self {
        match strategy {
            OutputStrategy::FileByFile => StrategyKind::FileByFile,
            OutputStrategy::ChunkByChunk => StrategyKind::ChunkByChunk,
            OutputStrategy::Smart => StrategyKind::Smart,
        }
    }
}

impl Cli {
    fn config(&self) -> Result<PagerConfig> {
        let config = match &self.config {
            Some(path) => PagerConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => PagerConfig::default(),
        };
        let mut config = config.with_env_overrides()?;

        if let Some(strategy) = self.strategy {
            config.strategy = strategy.into();
        }
        if let Some(budget) = self.token_budget {
            config.token_budget = budget;
        }
        if let Some(max_parallel) = self.max_parallel {
            config.max_parallel = max_parallel;
        }
        if self.timeout_ms.is_some() {
            config.per_unit_timeout_ms = self.timeout_ms;
        }
        config.drop_failed |= self.drop_failed;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    let progress = Arc::new(|p: &Progress| {
        tracing::debug!(completed = p.completed, unit = %p.unit_id, ok = p.ok, "progress");
    });
    let pager = CodePager::try_new(config)?.with_progress(progress);

    let source = pager.fs_source(&cli.input);
    let run_id = pager.analyze(&source).await?;
    let run = pager.run(&run_id)?;
    if run.status == RunStatus::Cancelled {
        warn!(completed = run.results.len(), "analysis cancelled, output is partial");
    }
    info!(
        units = run.stats.total,
        failed = run.stats.failed,
        tokens = run.stats.total_tokens,
        "analysis complete"
    );

    if cli.paged {
        let mut request = PageRequest::new(&run_id);
        loop {
            let page = pager.get_page(&request).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
            match page.continuation_token {
                Some(token) => request = PageRequest::new(&run_id).with_continuation(token),
                None => break,
            }
        }
        return Ok(());
    }

    let content = pager.render(&run_id, &cli.format).await?;

    // Output to file or stdout
    if let Some(output_file) = cli.output {
        fs::write(&output_file, content)?;
        println!("Code pager output written to {}", output_file.display());
    } else {
        println!("{}", String::from_utf8_lossy(&content));
    }

    Ok(())
}
