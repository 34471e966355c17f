use super::{ChunkPlan, ChunkingStrategy, StrategyState};
use crate::{StrategyKind, UnitResult};

/// One result per chunk. The budget is advisory only.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileByFile;

impl ChunkingStrategy for FileByFile {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FileByFile
    }

    fn next_chunk<'a>(
        &self,
        remaining: &[&'a UnitResult],
        _budget: usize,
        _state: &StrategyState,
    ) -> ChunkPlan<'a> {
        ChunkPlan::take(remaining, 1, StrategyState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::test_support::{ids, results};

    #[test]
    fn test_one_per_chunk_regardless_of_budget() {
        let all = results(&[(500, None), (1, None)]);
        let refs: Vec<_> = all.iter().collect();
        let plan = FileByFile.next_chunk(&refs, 10, &StrategyState::default());
        assert_eq!(ids(&plan.items), vec![0]);
        assert_eq!(plan.token_count, 500);
        assert!(!plan.exhausted);

        let plan = FileByFile.next_chunk(&refs[1..], 10, &StrategyState::default());
        assert!(plan.exhausted);
    }
}
