/// Per-class observation counts of a node or one side of a candidate split
///
/// Keeps the sum of squared counts alongside the counts, so moving an observation between
/// sides and evaluating the Gini impurity `Σ count·(1 - count/total)` are both O(1).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassTotals {
    counts: Vec<usize>,
    total: usize,
    sum_of_squares: u64,
}

impl ClassTotals {
    pub fn new(num_classes: usize) -> Self {
        ClassTotals {
            counts: vec![0; num_classes],
            total: 0,
            sum_of_squares: 0,
        }
    }

    /// Counts the given labels
    pub fn from_labels<I: IntoIterator<Item = usize>>(labels: I, num_classes: usize) -> Self {
        let mut totals = Self::new(num_classes);
        for label in labels {
            totals.increment(label);
        }
        totals
    }

    /// Builds totals from the per-class counts
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let total = counts.iter().sum();
        let sum_of_squares = counts.iter().map(|&c| (c as u64) * (c as u64)).sum();
        ClassTotals {
            counts,
            total,
            sum_of_squares,
        }
    }

    #[inline]
    pub fn increment(&mut self, class: usize) {
        let count = &mut self.counts[class];
        self.sum_of_squares += 2 * (*count as u64) + 1;
        *count += 1;
        self.total += 1;
    }

    #[inline]
    pub fn decrement(&mut self, class: usize) {
        let count = &mut self.counts[class];
        debug_assert!(*count > 0, "class {} has no observation left", class);
        self.sum_of_squares -= 2 * (*count as u64) - 1;
        *count -= 1;
        self.total -= 1;
    }

    /// Empties every class
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.total = 0;
        self.sum_of_squares = 0;
    }

    /// Takes over the counts of `other` without reallocating
    pub fn copy_from(&mut self, other: &ClassTotals) {
        self.counts.clear();
        self.counts.extend_from_slice(&other.counts);
        self.total = other.total;
        self.sum_of_squares = other.sum_of_squares;
    }

    /// Gini impurity scaled by the number of observations, zero for an empty or pure node
    #[inline]
    pub fn impurity(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total as f64 - self.sum_of_squares as f64 / self.total as f64
    }

    /// The most frequent class, the lowest index on ties
    pub fn largest_class(&self) -> usize {
        let mut best = 0;
        for (class, &count) in self.counts.iter().enumerate() {
            if count > self.counts[best] {
                best = class;
            }
        }
        best
    }

    pub fn is_size_at_most(&self, size: usize) -> bool {
        self.total <= size
    }

    /// Number of classes with at least one observation
    pub fn num_present_classes(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn count(&self, class: usize) -> usize {
        self.counts[class]
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reference_impurity(counts: &[usize]) -> f64 {
        let total: usize = counts.iter().sum();
        if total == 0 {
            return 0.0;
        }
        counts
            .iter()
            .map(|&c| c as f64 * (1.0 - c as f64 / total as f64))
            .sum()
    }

    #[test]
    fn impurity_matches_gini_sum() {
        for counts in &[vec![3, 3], vec![5, 1, 0], vec![2, 7, 9, 1], vec![0, 0, 4]] {
            let totals = ClassTotals::from_counts(counts.clone());
            assert_abs_diff_eq!(totals.impurity(), reference_impurity(counts), epsilon = 1e-12);
        }
    }

    #[test]
    fn pure_and_empty_nodes_have_zero_impurity() {
        assert_eq!(ClassTotals::new(3).impurity(), 0.0);
        assert_eq!(ClassTotals::from_labels(vec![4; 6], 5).impurity(), 0.0);
    }

    #[test]
    fn moving_observations_keeps_sums_consistent() {
        let mut left = ClassTotals::new(3);
        let mut right = ClassTotals::from_labels(vec![0, 1, 1, 2, 2, 2], 3);

        for &label in &[2, 1, 2] {
            left.increment(label);
            right.decrement(label);
        }

        assert_eq!(left, ClassTotals::from_counts(vec![0, 1, 2]));
        assert_eq!(right, ClassTotals::from_counts(vec![1, 1, 1]));
        assert_abs_diff_eq!(right.impurity(), 2.0, epsilon = 1e-12);

        left.reset();
        assert_eq!(left.total(), 0);
        left.copy_from(&right);
        assert_eq!(left, right);
    }

    #[test]
    fn largest_class_prefers_lowest_index() {
        assert_eq!(ClassTotals::from_counts(vec![1, 4, 4]).largest_class(), 1);
        assert_eq!(ClassTotals::from_counts(vec![0, 0, 0]).largest_class(), 0);
        assert_eq!(ClassTotals::from_counts(vec![2, 0, 3]).largest_class(), 2);
    }

    #[test]
    fn size_predicate() {
        let totals = ClassTotals::from_counts(vec![1, 1]);
        assert!(totals.is_size_at_most(2));
        assert!(!totals.is_size_at_most(1));
        assert_eq!(totals.num_present_classes(), 2);
    }
}
