use crate::hit::AlignmentHit;
use std::collections::HashMap;

/// Anything covering a closed range of reference positions.
pub trait Interval {
    fn start(&self) -> u64;
    fn end(&self) -> u64;
}

impl Interval for AlignmentHit {
    fn start(&self) -> u64 {
        self.ref_start
    }

    fn end(&self) -> u64 {
        self.ref_end
    }
}

/// Greedily keeps items in the given priority order so that no position is
/// covered more than `max_depth` times. A hit touching a saturated position
/// is dropped entirely.
pub fn filter_by_depth<T: Interval>(items: Vec<T>, max_depth: u32) -> Vec<T> {
    let mut coverage: HashMap<u64, u32> = HashMap::new();
    let mut accepted = Vec::with_capacity(items.len());
    for item in items {
        let (start, end) = (item.start(), item.end());
        let saturated = (start..=end).any(|pos| coverage.get(&pos).copied().unwrap_or(0) >= max_depth);
        if saturated {
            continue;
        }
        for pos in start..=end {
            *coverage.entry(pos).or_insert(0) += 1;
        }
        accepted.push(item);
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Span(u64, u64, &'static str);

    impl Interval for Span {
        fn start(&self) -> u64 {
            self.0
        }
        fn end(&self) -> u64 {
            self.1
        }
    }

    fn max_coverage(items: &[Span]) -> usize {
        let hi = items.iter().map(|s| s.1).max().unwrap_or(0);
        (0..=hi)
            .map(|pos| items.iter().filter(|s| s.0 <= pos && pos <= s.1).count())
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn rejects_whole_hit_on_saturated_position() {
        let items = vec![
            Span(1, 10, "a"),
            Span(5, 20, "b"),
            Span(8, 30, "c"),
            Span(21, 40, "d"),
        ];
        let kept = filter_by_depth(items, 2);
        let names: Vec<_> = kept.iter().map(|s| s.2).collect();
        assert_eq!(names, vec!["a", "b", "d"]);
    }

    #[test]
    fn bound_holds_and_order_is_preserved() {
        let items: Vec<Span> = (0..60u64)
            .map(|i| Span((i * 7) % 50, (i * 7) % 50 + (i % 13) + 3, "x"))
            .collect();
        for k in 1..5 {
            let kept = filter_by_depth(items.clone(), k);
            assert!(max_coverage(&kept) <= k as usize);
            let mut cursor = items.iter();
            for span in &kept {
                assert!(cursor.any(|s| s == span));
            }
        }
    }

    #[test]
    fn zero_depth_keeps_nothing() {
        assert!(filter_by_depth(vec![Span(1, 2, "a")], 0).is_empty());
    }
}
