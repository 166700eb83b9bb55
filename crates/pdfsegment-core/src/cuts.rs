//! Cut selection by largest vertical gaps
//!
//! Given the vertical glyph coordinates of a document, picks the boundaries
//! that follow the N widest whitespace gaps between consecutive lines.

use crate::error::SegmentError;
use std::num::NonZeroUsize;

/// A validated, strictly positive number of requested cuts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CutCount(NonZeroUsize);

impl CutCount {
    /// Validate a raw cut count coming from the caller
    pub fn new(cuts: i64) -> Result<Self, SegmentError> {
        usize::try_from(cuts)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(CutCount)
            .ok_or(SegmentError::InvalidCutCount(cuts))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl TryFrom<i64> for CutCount {
    type Error = SegmentError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        CutCount::new(value)
    }
}

impl From<NonZeroUsize> for CutCount {
    fn from(value: NonZeroUsize) -> Self {
        CutCount(value)
    }
}

/// Distance between two adjacent distinct coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    /// Position of the lower coordinate in the distinct sorted sequence
    pub index: usize,
    pub size: f64,
}

/// Finite coordinates, sorted ascending with duplicates removed
pub fn distinct_sorted(coordinates: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = coordinates
        .iter()
        .copied()
        .filter(|y| y.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    // -0.0 and 0.0 compare unequal under total_cmp but are the same position
    sorted.dedup_by(|a, b| a == b);
    sorted
}

/// Gaps between consecutive distinct coordinates
///
/// The result always has `distinct_sorted(coordinates).len() - 1` entries
/// (or none when fewer than two distinct coordinates exist).
pub fn gap_list(coordinates: &[f64]) -> Vec<Gap> {
    gaps_of(&distinct_sorted(coordinates))
}

fn gaps_of(sorted: &[f64]) -> Vec<Gap> {
    sorted
        .windows(2)
        .enumerate()
        .map(|(index, pair)| Gap {
            index,
            size: pair[1] - pair[0],
        })
        .collect()
}

/// Select the cut boundaries following the `cuts` largest gaps
///
/// Algorithm:
/// 1. Deduplicate and sort the coordinates
/// 2. Compute the gap after every coordinate but the last
/// 3. Repeatedly take the largest remaining gap (first occurrence wins on
///    ties) and record the coordinate right after it
/// 4. Return the recorded boundaries in ascending order
///
/// Asking for more cuts than there are gaps yields one boundary per gap.
pub fn select_cuts(coordinates: &[f64], cuts: CutCount) -> Vec<f64> {
    let sorted = distinct_sorted(coordinates);
    if sorted.len() < 2 {
        return Vec::new();
    }

    let mut gaps: Vec<f64> = gaps_of(&sorted).into_iter().map(|g| g.size).collect();
    let mut boundaries = Vec::with_capacity(cuts.get().min(gaps.len()));

    for _ in 0..cuts.get() {
        let Some(index) = first_max_index(&gaps) else {
            break;
        };
        boundaries.push(sorted[index + 1]);
        gaps[index] = 0.0;
    }

    boundaries.sort_by(|a, b| a.total_cmp(b));
    boundaries
}

/// Index of the first occurrence of the largest positive value
fn first_max_index(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value <= 0.0 {
            continue;
        }
        match best {
            Some((_, max)) if value <= max => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn cuts(n: i64) -> CutCount {
        CutCount::new(n).unwrap()
    }

    #[test]
    fn test_cut_count_rejects_zero_and_negative() {
        assert!(matches!(
            CutCount::new(0),
            Err(SegmentError::InvalidCutCount(0))
        ));
        assert!(matches!(
            CutCount::new(-3),
            Err(SegmentError::InvalidCutCount(-3))
        ));
        assert_eq!(CutCount::new(4).unwrap().get(), 4);
    }

    #[test]
    fn test_gap_list_matches_distinct_pairs() {
        let gaps = gap_list(&[10.0, 10.0, 50.0, 51.0, 200.0]);
        let sizes: Vec<f64> = gaps.iter().map(|g| g.size).collect();
        assert_eq!(sizes, vec![40.0, 1.0, 149.0]);
        assert_eq!(gaps[2].index, 2);
    }

    #[test]
    fn test_two_largest_gaps_selected() {
        let result = select_cuts(&[10.0, 10.0, 50.0, 51.0, 200.0], cuts(2));
        assert_eq!(result, vec![50.0, 200.0]);
    }

    #[test]
    fn test_more_cuts_than_gaps_returns_every_gap() {
        let result = select_cuts(&[1.0, 2.0], cuts(5));
        assert_eq!(result, vec![2.0]);
    }

    #[test]
    fn test_single_point_has_no_cuts() {
        assert!(select_cuts(&[5.0], cuts(1)).is_empty());
        assert!(select_cuts(&[], cuts(3)).is_empty());
        assert!(select_cuts(&[7.0, 7.0, 7.0], cuts(2)).is_empty());
    }

    #[test]
    fn test_ties_prefer_first_gap() {
        // gaps: 10, 10, 10 -> one cut must land after the first gap
        let result = select_cuts(&[0.0, 10.0, 20.0, 30.0], cuts(1));
        assert_eq!(result, vec![10.0]);

        let result = select_cuts(&[0.0, 10.0, 20.0, 30.0], cuts(2));
        assert_eq!(result, vec![10.0, 20.0]);
    }

    #[test]
    fn test_non_finite_coordinates_ignored() {
        let result = select_cuts(&[f64::NAN, 1.0, f64::INFINITY, 4.0], cuts(1));
        assert_eq!(result, vec![4.0]);
    }

    fn coordinates() -> impl Strategy<Value = Vec<f64>> {
        // Quarter-point grid keeps duplicates likely
        prop::collection::vec((0i32..4000).prop_map(|v| v as f64 / 4.0), 0..60)
    }

    proptest! {
        #[test]
        fn prop_result_is_sorted_distinct_subset(ys in coordinates(), n in 1i64..20) {
            let sorted = distinct_sorted(&ys);
            let result = select_cuts(&ys, cuts(n));

            let expected_len = (n as usize).min(sorted.len().saturating_sub(1));
            prop_assert_eq!(result.len(), expected_len);
            prop_assert!(result.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(result.iter().all(|y| sorted.contains(y)));
            // The smallest coordinate never follows a gap
            if let Some(first) = sorted.first() {
                prop_assert!(!result.contains(first));
            }
        }

        #[test]
        fn prop_deterministic(ys in coordinates(), n in 1i64..20) {
            prop_assert_eq!(select_cuts(&ys, cuts(n)), select_cuts(&ys, cuts(n)));
        }

        #[test]
        fn prop_permutation_and_duplicates_do_not_matter(ys in coordinates(), n in 1i64..20) {
            let mut shuffled = ys.clone();
            shuffled.reverse();
            shuffled.extend(ys.iter().step_by(2).copied());
            prop_assert_eq!(select_cuts(&ys, cuts(n)), select_cuts(&shuffled, cuts(n)));
        }

        #[test]
        fn prop_gap_list_length(ys in coordinates()) {
            let distinct = distinct_sorted(&ys).len();
            prop_assert_eq!(gap_list(&ys).len(), distinct.saturating_sub(1));
        }
    }
}
