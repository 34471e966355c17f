use super::{ChunkPlan, ChunkingStrategy, StrategyState, greedy_len};
use crate::{StrategyKind, UnitResult};

/// Units before the budget boundary considered when a group must be broken.
const BREAK_WINDOW: usize = 3;

/// Greedy accumulation that keeps affinity groups together.
///
/// When the greedy boundary falls inside a group, the chunk ends before the
/// group instead, provided the whole group fits in the next chunk. A group that
/// cannot fit in a chunk of its own is broken right after the smallest of its
/// last [`BREAK_WINDOW`] units before the boundary; ties go to the unit nearest
/// the boundary. Results without an affinity key never group.
#[derive(Debug, Clone, Copy, Default)]
pub struct Smart;

impl ChunkingStrategy for Smart {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Smart
    }

    fn next_chunk<'a>(
        &self,
        remaining: &[&'a UnitResult],
        budget: usize,
        _state: &StrategyState,
    ) -> ChunkPlan<'a> {
        let fit = greedy_len(remaining, budget);
        if fit == remaining.len() {
            return ChunkPlan::take(remaining, fit, StrategyState::default());
        }

        let last = remaining[fit - 1];
        let group = match (&last.affinity, &remaining[fit].affinity) {
            (Some(left), Some(right)) if left == right => left,
            _ => return ChunkPlan::take(remaining, fit, StrategyState::default()),
        };

        let group_start = remaining[..fit]
            .iter()
            .rposition(|r| r.affinity.as_ref() != Some(group))
            .map_or(0, |i| i + 1);
        let group_len = fit - group_start
            + remaining[fit..]
                .iter()
                .take_while(|r| r.affinity.as_ref() == Some(group))
                .count();
        let group_tokens: usize = remaining[group_start..group_start + group_len]
            .iter()
            .map(|r| r.size_tokens)
            .sum();
        if group_start > 0 && group_tokens <= budget {
            return ChunkPlan::take(remaining, group_start, StrategyState::default());
        }

        // The group is split whatever happens, so fill this chunk first
        let window = fit.saturating_sub(BREAK_WINDOW).max(group_start);
        let mut split = fit - 1;
        for idx in (window..fit).rev() {
            if remaining[idx].size_tokens < remaining[split].size_tokens {
                split = idx;
            }
        }
        let state = StrategyState {
            open_group: Some(group.clone()),
        };
        ChunkPlan::take(remaining, split + 1, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::test_support::{ids, results};

    fn page_all(all: &[UnitResult], budget: usize) -> Vec<(Vec<usize>, Option<String>)> {
        let refs: Vec<_> = all.iter().collect();
        let mut offset = 0;
        let mut state = StrategyState::default();
        let mut chunks = Vec::new();
        loop {
            let plan = Smart.next_chunk(&refs[offset..], budget, &state);
            offset += plan.items.len();
            state = plan.next_state.clone();
            chunks.push((ids(&plan.items), plan.next_state.open_group));
            if plan.exhausted {
                return chunks;
            }
        }
    }

    #[test]
    fn test_group_moves_to_next_chunk() {
        let all = results(&[
            (5, Some("a")),
            (5, Some("a")),
            (5, Some("b")),
            (5, Some("b")),
            (5, Some("b")),
        ]);
        let chunks = page_all(&all, 15);
        assert_eq!(chunks, vec![(vec![0, 1], None), (vec![2, 3, 4], None)]);
    }

    #[test]
    fn test_group_too_large_for_any_chunk_is_not_deferred() {
        let all = results(&[(5, Some("a")), (5, Some("b")), (5, Some("b")), (20, Some("b"))]);
        let chunks = page_all(&all, 20);
        assert_eq!(
            chunks,
            vec![(vec![0, 1, 2], Some("b".to_string())), (vec![3], None)]
        );
    }

    #[test]
    fn test_break_stays_inside_the_group() {
        // unit 0 is the smallest before the boundary but belongs to another group
        let all = results(&[(1, Some("a")), (10, Some("b")), (10, Some("b")), (10, Some("b"))]);
        let chunks = page_all(&all, 20);
        assert_eq!(chunks[0], (vec![0, 1], Some("b".to_string())));
        assert_eq!(chunks[1], (vec![2, 3], None));
    }

    #[test]
    fn test_without_affinity_matches_greedy() {
        let all = results(&[(5, None), (5, None), (5, None), (5, None)]);
        let chunks = page_all(&all, 10);
        assert_eq!(chunks, vec![(vec![0, 1], None), (vec![2, 3], None)]);
    }

    #[test]
    fn test_oversized_group_breaks_after_smallest_near_boundary() {
        // Greedy fit is [0..4]; window is units 1, 2, 3; smallest is unit 2
        let all = results(&[
            (4, Some("g")),
            (6, Some("g")),
            (2, Some("g")),
            (6, Some("g")),
            (5, Some("g")),
        ]);
        let chunks = page_all(&all, 20);
        assert_eq!(chunks[0], (vec![0, 1, 2], Some("g".to_string())));
        assert_eq!(chunks[1], (vec![3, 4], None));
    }

    #[test]
    fn test_tie_goes_to_unit_nearest_boundary() {
        let all = results(&[
            (6, Some("g")),
            (3, Some("g")),
            (3, Some("g")),
            (3, Some("g")),
            (9, Some("g")),
        ]);
        let chunks = page_all(&all, 15);
        assert_eq!(chunks[0].0, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_deterministic() {
        let all = results(&[
            (3, Some("x")),
            (8, Some("x")),
            (2, Some("y")),
            (9, Some("y")),
            (1, Some("y")),
            (7, None),
            (4, Some("z")),
        ]);
        assert_eq!(page_all(&all, 12), page_all(&all, 12));
    }
}
