use crate::{
    AnalysisRun, ChunkingStrategy, Error, PaginationContext, PagerConfig, Result, StrategyKind,
    UnitResult, strategy_for,
};
use serde::Serialize;
use tracing::{debug, warn};

/// A bounded group of unit results, emitted once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk<'a> {
    pub sequence_number: usize,
    pub items: Vec<&'a UnitResult>,
    /// Sum of the items' token sizes
    pub token_count: usize,
    pub is_final: bool,
}

/// One page of a paginated run.
#[derive(Debug, Clone, Serialize)]
pub struct Page<'a> {
    pub chunk: Chunk<'a>,
    /// Token for the next page, `None` on the final page
    pub continuation: Option<String>,
    /// Context after this page; the terminal context on the final page
    pub context: PaginationContext,
    /// Failed units consumed by this page, included or dropped
    pub failed_units: Vec<String>,
    /// Failed units dropped so far in the run
    pub skipped_failures: usize,
    /// Units in this chunk that alone exceed the token budget
    pub oversized_units: Vec<String>,
    /// Units still to be paged after this one
    pub remaining_units: usize,
    /// Affinity group split by the previous page and continued here
    pub continues_group: Option<String>,
    /// Affinity group this page leaves split
    pub open_group: Option<String>,
}

/// Turns a finished run into a resumable sequence of chunks.
///
/// The engine keeps no state between calls: everything needed to resume is
/// in the continuation token handed to the caller.
#[derive(Debug)]
pub struct PaginationEngine {
    strategy: Box<dyn ChunkingStrategy>,
    token_budget: usize,
    drop_failed: bool,
    secret: Option<String>,
}

impl PaginationEngine {
    pub fn try_new(kind: StrategyKind, token_budget: usize) -> Result<Self> {
        if token_budget == 0 {
            return Err(Error::Configuration(
                "token_budget must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            strategy: strategy_for(kind),
            token_budget,
            drop_failed: false,
            secret: None,
        })
    }

    pub fn from_config(config: &PagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::try_new(config.strategy, config.token_budget)?
            .with_drop_failed(config.drop_failed)
            .with_secret(config.context_secret.clone()))
    }

    pub fn with_drop_failed(mut self, drop_failed: bool) -> Self {
        self.drop_failed = drop_failed;
        self
    }

    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret;
        self
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Serialize a context the way continuation tokens are serialized.
    pub fn encode_context(&self, context: &PaginationContext) -> Result<String> {
        context.encode(self.secret.as_deref())
    }

    /// Return the page following `token`, or the first page without one.
    ///
    /// A token must have been issued for this run and this engine's strategy.
    /// The budget recorded in the token wins over the engine's own.
    pub fn next_page<'a>(&self, run: &'a AnalysisRun, token: Option<&str>) -> Result<Page<'a>> {
        let context = match token {
            Some(token) => {
                let context = PaginationContext::decode(token, self.secret.as_deref())?;
                context.ensure_matches(&run.run_id, self.kind())?;
                context
            }
            None => PaginationContext::start(&run.run_id, self.kind(), self.token_budget),
        };
        self.page_from(run, context)
    }

    /// Page through a whole run.
    pub fn collect_chunks<'a>(&self, run: &'a AnalysisRun) -> Result<Vec<Chunk<'a>>> {
        let mut context = PaginationContext::start(&run.run_id, self.kind(), self.token_budget);
        let mut chunks = Vec::new();
        loop {
            let page = self.page_from(run, context)?;
            let is_final = page.chunk.is_final;
            context = page.context;
            chunks.push(page.chunk);
            if is_final {
                return Ok(chunks);
            }
        }
    }

    fn page_from<'a>(&self, run: &'a AnalysisRun, context: PaginationContext) -> Result<Page<'a>> {
        if context.terminal {
            return Ok(Page {
                chunk: Chunk {
                    sequence_number: context.sequence,
                    items: Vec::new(),
                    token_count: 0,
                    is_final: true,
                },
                continuation: None,
                failed_units: Vec::new(),
                skipped_failures: context.skipped_failures,
                oversized_units: Vec::new(),
                remaining_units: 0,
                continues_group: None,
                open_group: None,
                context,
            });
        }

        let budget = context.token_budget;
        let start = run
            .results
            .partition_point(|r| r.ordinal < context.next_ordinal);
        let tail = &run.results[start..];
        let candidates: Vec<&UnitResult> = tail
            .iter()
            .filter(|r| !(self.drop_failed && r.is_failed()))
            .collect();

        let plan = self
            .strategy
            .next_chunk(&candidates, budget, &context.strategy_state);
        let taken = plan.items.len();
        let exhausted = plan.exhausted;

        let next_ordinal = match candidates.get(taken) {
            Some(next) => next.ordinal,
            None => tail
                .last()
                .map_or(context.next_ordinal, |last| last.ordinal + 1),
        };
        let failed_units: Vec<String> = tail
            .iter()
            .take_while(|r| r.ordinal < next_ordinal)
            .filter(|r| r.is_failed())
            .map(|r| r.unit_id.clone())
            .collect();
        let dropped = if self.drop_failed {
            failed_units.len()
        } else {
            0
        };

        let oversized_units: Vec<String> = plan
            .items
            .iter()
            .filter(|r| r.size_tokens > budget)
            .map(|r| r.unit_id.clone())
            .collect();
        for unit in &oversized_units {
            warn!(run_id = %run.run_id, unit = %unit, budget, "unit exceeds token budget");
        }

        let chunk = Chunk {
            sequence_number: context.sequence,
            items: plan.items,
            token_count: plan.token_count,
            is_final: exhausted,
        };
        let continues_group = context.strategy_state.open_group.clone();
        let next = PaginationContext {
            next_ordinal,
            sequence: context.sequence + 1,
            skipped_failures: context.skipped_failures + dropped,
            strategy_state: plan.next_state,
            terminal: exhausted,
            ..context
        };
        let continuation = if exhausted {
            None
        } else {
            Some(self.encode_context(&next)?)
        };

        debug!(
            run_id = %run.run_id,
            sequence = chunk.sequence_number,
            items = chunk.items.len(),
            tokens = chunk.token_count,
            is_final = chunk.is_final,
            "page produced"
        );

        Ok(Page {
            remaining_units: candidates.len() - taken,
            skipped_failures: next.skipped_failures,
            open_group: next.strategy_state.open_group.clone(),
            chunk,
            continuation,
            context: next,
            failed_units,
            oversized_units,
            continues_group,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoordinatorRun, RunStats, RunStatus, UnitError, UnitOutcome};
    use serde_json::json;

    fn run(sizes: &[usize], failed: &[usize]) -> AnalysisRun {
        let results = sizes
            .iter()
            .enumerate()
            .map(|(ordinal, size)| UnitResult {
                unit_id: format!("u{ordinal}"),
                ordinal,
                affinity: None,
                outcome: if failed.contains(&ordinal) {
                    UnitOutcome::Failed {
                        error: UnitError::Analysis("bad".to_string()),
                    }
                } else {
                    UnitOutcome::Ok {
                        content: json!(ordinal),
                    }
                },
                size_tokens: *size,
                elapsed_ms: 0,
            })
            .collect();
        AnalysisRun::new(
            "run",
            "memory",
            CoordinatorRun {
                results,
                status: RunStatus::Completed,
                stats: RunStats::default(),
            },
        )
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            PaginationEngine::try_new(StrategyKind::Smart, 0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_run_is_one_final_page() {
        let run = run(&[], &[]);
        let engine = PaginationEngine::try_new(StrategyKind::ChunkByChunk, 10).unwrap();
        let page = engine.next_page(&run, None).unwrap();
        assert!(page.chunk.is_final);
        assert!(page.chunk.items.is_empty());
        assert!(page.continuation.is_none());
    }

    #[test]
    fn test_drop_failed_counts_skipped() {
        let run = run(&[5, 5, 5, 5, 5], &[1, 4]);
        let engine = PaginationEngine::try_new(StrategyKind::ChunkByChunk, 10)
            .unwrap()
            .with_drop_failed(true);

        let first = engine.next_page(&run, None).unwrap();
        let ordinals: Vec<_> = first.chunk.items.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![0, 2]);
        assert_eq!(first.failed_units, vec!["u1"]);
        assert_eq!(first.skipped_failures, 1);
        assert_eq!(first.remaining_units, 1);

        let second = engine
            .next_page(&run, first.continuation.as_deref())
            .unwrap();
        let ordinals: Vec<_> = second.chunk.items.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![3]);
        assert!(second.chunk.is_final);
        assert_eq!(second.failed_units, vec!["u4"]);
        assert_eq!(second.skipped_failures, 2);
        assert_eq!(second.chunk.token_count, 5);
    }

    #[test]
    fn test_failed_units_are_paged_by_default() {
        let run = run(&[5, 5, 5], &[1]);
        let engine = PaginationEngine::try_new(StrategyKind::ChunkByChunk, 100).unwrap();
        let page = engine.next_page(&run, None).unwrap();
        assert_eq!(page.chunk.items.len(), 3);
        assert_eq!(page.chunk.token_count, 15);
        assert_eq!(page.failed_units, vec!["u1"]);
        assert_eq!(page.skipped_failures, 0);
    }

    #[test]
    fn test_token_budget_wins_on_resume() {
        let run = run(&[5; 6], &[]);
        let small = PaginationEngine::try_new(StrategyKind::ChunkByChunk, 10).unwrap();
        let large = PaginationEngine::try_new(StrategyKind::ChunkByChunk, 1000).unwrap();

        let first = small.next_page(&run, None).unwrap();
        let second = large
            .next_page(&run, first.continuation.as_deref())
            .unwrap();
        assert_eq!(second.chunk.items.len(), 2);
        assert_eq!(second.context.token_budget, 10);
    }

    #[test]
    fn test_collect_chunks_covers_every_unit_once() {
        let run = run(&[3, 8, 2, 30, 1, 1, 9], &[2]);
        for kind in [
            StrategyKind::FileByFile,
            StrategyKind::ChunkByChunk,
            StrategyKind::Smart,
        ] {
            let engine = PaginationEngine::try_new(kind, 10).unwrap();
            let chunks = engine.collect_chunks(&run).unwrap();
            let ordinals: Vec<_> = chunks
                .iter()
                .flat_map(|c| c.items.iter().map(|r| r.ordinal))
                .collect();
            assert_eq!(ordinals, (0..7).collect::<Vec<_>>());
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.sequence_number, i);
                assert_eq!(chunk.is_final, i == chunks.len() - 1);
            }
            let total: usize = chunks.iter().map(|c| c.token_count).sum();
            assert_eq!(total, run.total_tokens());
        }
    }
}
