//! Chunking strategies: how ordered unit results are grouped into chunks.
//!
//! A strategy is a pure function of the remaining results, the token budget
//! and the state it left in the previous pagination context. It never reorders
//! results; ordinal order is the only ordering key.

mod chunk_by_chunk;
mod file_by_file;
mod smart;

pub use chunk_by_chunk::ChunkByChunk;
pub use file_by_file::FileByFile;
pub use smart::Smart;

use crate::{StrategyKind, UnitResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy state carried from one page to the next inside the context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyState {
    /// Affinity group split by the previous chunk, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_group: Option<String>,
}

/// One planned chunk: a prefix of the remaining results.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan<'a> {
    pub items: Vec<&'a UnitResult>,
    pub token_count: usize,
    pub next_state: StrategyState,
    /// Whether the plan consumed every remaining result
    pub exhausted: bool,
}

impl<'a> ChunkPlan<'a> {
    /// Plan taking the first `count` results.
    pub fn take(remaining: &[&'a UnitResult], count: usize, next_state: StrategyState) -> Self {
        let count = count.min(remaining.len());
        let items = remaining[..count].to_vec();
        let token_count = items.iter().map(|r| r.size_tokens).sum();
        Self {
            items,
            token_count,
            next_state,
            exhausted: count == remaining.len(),
        }
    }
}

/// Groups ordered results into chunks under a token budget.
pub trait ChunkingStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> StrategyKind;

    /// Plan the next chunk from `remaining`, which starts at the first result
    /// not yet paged. A non-empty `remaining` always yields at least one item.
    fn next_chunk<'a>(
        &self,
        remaining: &[&'a UnitResult],
        budget: usize,
        state: &StrategyState,
    ) -> ChunkPlan<'a>;
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn ChunkingStrategy> {
    match kind {
        StrategyKind::FileByFile => Box::new(FileByFile),
        StrategyKind::ChunkByChunk => Box::new(ChunkByChunk),
        StrategyKind::Smart => Box::new(Smart),
    }
}

/// Length of the longest prefix that fits `budget`, or 1 when the first result
/// alone exceeds it.
pub(crate) fn greedy_len(remaining: &[&UnitResult], budget: usize) -> usize {
    let mut total = 0;
    let mut count = 0;
    for result in remaining {
        if count > 0 && total + result.size_tokens > budget {
            break;
        }
        total += result.size_tokens;
        count += 1;
        if total > budget {
            break;
        }
    }
    count
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{UnitOutcome, UnitResult};
    use serde_json::json;

    pub fn results(sizes: &[(usize, Option<&str>)]) -> Vec<UnitResult> {
        sizes
            .iter()
            .enumerate()
            .map(|(ordinal, (size, affinity))| UnitResult {
                unit_id: format!("u{ordinal}"),
                ordinal,
                affinity: affinity.map(String::from),
                outcome: UnitOutcome::Ok {
                    content: json!(ordinal),
                },
                size_tokens: *size,
                elapsed_ms: 0,
            })
            .collect()
    }

    pub fn ids(items: &[&UnitResult]) -> Vec<usize> {
        items.iter().map(|r| r.ordinal).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::results;
    use super::*;

    #[test]
    fn test_greedy_len() {
        let all = results(&[(5, None), (5, None), (100, None), (5, None)]);
        let refs: Vec<_> = all.iter().collect();
        assert_eq!(greedy_len(&refs, 10), 2);
        assert_eq!(greedy_len(&refs, 9), 1);
        assert_eq!(greedy_len(&refs[2..], 10), 1);
        assert_eq!(greedy_len(&refs[3..], 10), 1);
        assert_eq!(greedy_len(&[], 10), 0);
    }

    #[test]
    fn test_take_marks_exhaustion() {
        let all = results(&[(1, None), (2, None)]);
        let refs: Vec<_> = all.iter().collect();
        let plan = ChunkPlan::take(&refs, 1, StrategyState::default());
        assert_eq!(plan.token_count, 1);
        assert!(!plan.exhausted);
        let plan = ChunkPlan::take(&refs, 5, StrategyState::default());
        assert_eq!(plan.token_count, 3);
        assert!(plan.exhausted);
    }
}
