use super::{ChunkPlan, ChunkingStrategy, StrategyState, greedy_len};
use crate::{StrategyKind, UnitResult};

/// Greedy accumulation in ordinal order until the next result would exceed the
/// budget. A result larger than the budget is emitted alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkByChunk;

impl ChunkingStrategy for ChunkByChunk {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ChunkByChunk
    }

    fn next_chunk<'a>(
        &self,
        remaining: &[&'a UnitResult],
        budget: usize,
        _state: &StrategyState,
    ) -> ChunkPlan<'a> {
        let count = greedy_len(remaining, budget);
        ChunkPlan::take(remaining, count, StrategyState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::test_support::{ids, results};

    #[test]
    fn test_oversized_unit_is_alone() {
        let sizes: Vec<_> = [5, 5, 5, 5, 100, 5, 5, 5, 5, 5]
            .into_iter()
            .map(|s| (s, None))
            .collect();
        let all = results(&sizes);
        let refs: Vec<_> = all.iter().collect();

        let mut offset = 0;
        let mut chunks = Vec::new();
        loop {
            let plan = ChunkByChunk.next_chunk(&refs[offset..], 20, &StrategyState::default());
            offset += plan.items.len();
            chunks.push((ids(&plan.items), plan.token_count));
            if plan.exhausted {
                break;
            }
        }
        assert_eq!(
            chunks,
            vec![
                (vec![0, 1, 2, 3], 20),
                (vec![4], 100),
                (vec![5, 6, 7, 8], 20),
                (vec![9], 5),
            ]
        );
    }
}
