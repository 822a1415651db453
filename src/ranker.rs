use crate::detector::BoundaryCandidate;

/// 从候选跳切中选出最显著的 `max` 个，按时间顺序返回
///
/// `combined_score` 越低表示画面变化越大。开头候选点的分数为 0，
/// 只要 `max >= 1` 就一定会被选中。
pub fn select_most_significant(candidates: &[BoundaryCandidate], max: usize) -> Vec<BoundaryCandidate> {
    if candidates.len() <= max {
        return candidates.to_vec();
    }

    let mut ranked = candidates.to_vec();
    // 稳定排序：分数相同时保持时间先后
    ranked.sort_by(|a, b| a.metrics.combined_score.total_cmp(&b.metrics.combined_score));
    ranked.truncate(max);
    ranked.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::BoundaryMetrics;

    fn candidate(timestamp: f64, score: f64) -> BoundaryCandidate {
        BoundaryCandidate {
            timestamp,
            metrics: BoundaryMetrics {
                combined_similarity: 0.5,
                histogram: score,
                delta: score,
                combined_score: score,
            },
        }
    }

    #[test]
    fn test_under_budget_unchanged() {
        let input = vec![BoundaryCandidate::opening(), candidate(2.0, 0.4)];
        assert_eq!(select_most_significant(&input, 5), input);
    }

    #[test]
    fn test_keeps_lowest_scores_in_time_order() {
        let input = vec![
            BoundaryCandidate::opening(),
            candidate(1.0, 0.9),
            candidate(2.0, 0.1),
            candidate(3.0, 0.5),
            candidate(4.0, 0.2),
        ];
        let selected = select_most_significant(&input, 3);
        let times: Vec<f64> = selected.iter().map(|c| c.timestamp).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_opening_always_survives() {
        let mut input = vec![BoundaryCandidate::opening()];
        input.extend((1..50).map(|i| candidate(i as f64, 0.0001 * i as f64)));
        for max in 1..10 {
            let selected = select_most_significant(&input, max);
            assert_eq!(selected.len(), max);
            assert_eq!(selected[0].timestamp, 0.0);
        }
    }

    #[test]
    fn test_ties_prefer_earlier() {
        let input = vec![
            BoundaryCandidate::opening(),
            candidate(1.0, 0.3),
            candidate(2.0, 0.3),
            candidate(3.0, 0.3),
        ];
        let times: Vec<f64> = select_most_significant(&input, 2)
            .iter()
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(times, vec![0.0, 1.0]);
    }
}
