use std::collections::HashSet;

use packedforest::{Feature, Mwc};
use packedforest_trees::{bin_sizes, two_means_split, ClassTotals, ObservationBuffer};
use proptest::prelude::*;

fn squared_error(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum()
}

fn labels(max_obs: usize, max_classes: usize) -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1..max_classes).prop_flat_map(move |num_classes| {
        (
            Just(num_classes),
            prop::collection::vec(0..num_classes, 1..max_obs),
        )
    })
}

proptest! {
    #[test]
    fn bootstrap_splits_observations_into_in_and_out_of_bag(
        (num_classes, labels) in labels(200, 6),
        seed in any::<i32>(),
    ) {
        let num_obs = labels.len();
        let mut rng = Mwc::from_seed(seed);
        let (buffer, root) =
            ObservationBuffer::bootstrap(num_obs, num_classes, |obs| labels[obs], &mut rng);

        prop_assert_eq!(root.in_bag_size(), num_obs);
        let drawn: HashSet<usize> = buffer.in_bag(&root).map(|(obs, _)| obs).collect();
        let unused: HashSet<usize> = buffer.out_of_bag(&root).iter().copied().collect();
        prop_assert_eq!(unused.len(), root.out_of_bag_size());
        prop_assert!(drawn.is_disjoint(&unused));
        prop_assert_eq!(drawn.len() + unused.len(), num_obs);
        prop_assert!(buffer.in_bag(&root).all(|(obs, class)| labels[obs] == class));
    }

    #[test]
    fn splitting_keeps_every_observation_once(
        (num_classes, labels) in labels(200, 6),
        seed in any::<i32>(),
        pivot in 0usize..200,
    ) {
        let num_obs = labels.len();
        let mut rng = Mwc::from_seed(seed);
        let (mut buffer, root) =
            ObservationBuffer::bootstrap(num_obs, num_classes, |obs| labels[obs], &mut rng);
        let mut before: Vec<usize> = buffer.in_bag(&root).map(|(obs, _)| obs).collect();

        let (left, right) = buffer.split(&root, |obs| obs <= pivot);
        prop_assert!(buffer.in_bag(&left).all(|(obs, class)| obs <= pivot && labels[obs] == class));
        prop_assert!(buffer.in_bag(&right).all(|(obs, class)| obs > pivot && labels[obs] == class));

        let mut after: Vec<usize> = buffer
            .in_bag(&left)
            .chain(buffer.in_bag(&right))
            .map(|(obs, _)| obs)
            .collect();
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(before, after);
        prop_assert_eq!(
            left.out_of_bag_size() + right.out_of_bag_size(),
            root.out_of_bag_size()
        );
    }

    #[test]
    fn gini_impurity_matches_its_definition(counts in prop::collection::vec(0usize..50, 1..8)) {
        let totals = ClassTotals::from_counts(counts.clone());
        let total = counts.iter().sum::<usize>() as f64;
        let expected = if total == 0.0 {
            0.0
        } else {
            total * (1.0 - counts.iter().map(|&c| (c as f64 / total).powi(2)).sum::<f64>())
        };
        prop_assert!((totals.impurity() - expected).abs() < 1e-9 * total.max(1.0));
    }

    #[test]
    fn bins_share_trees_evenly(num_trees in 1usize..500, num_bins in 1usize..64) {
        let num_bins = num_bins.min(num_trees);
        let sizes = bin_sizes(num_trees, num_bins);

        prop_assert_eq!(sizes.len(), num_bins);
        prop_assert_eq!(sizes.iter().sum::<usize>(), num_trees);
        prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1] && w[0] - w[1] <= 1));
    }

    #[test]
    fn two_means_cut_is_the_least_squares_cut(
        values in prop::collection::vec(-1e3f64..1e3, 2..60),
    ) {
        let mut sorted = values.clone();
        let split = match two_means_split(&mut sorted) {
            Some(split) => split,
            None => {
                prop_assert!(values.iter().all(|v| !v.differs(values[0])));
                return Ok(());
            }
        };
        let tolerance = 1e-9 * values.iter().map(|v| v * v).sum::<f64>().max(1.0);

        let best = (1..sorted.len())
            .filter(|&i| sorted[i - 1].differs(sorted[i]))
            .map(|i| squared_error(&sorted[..i]) + squared_error(&sorted[i..]))
            .fold(f64::INFINITY, f64::min);
        prop_assert!((split.error - best).abs() <= tolerance);

        let (left, right): (Vec<f64>, Vec<f64>) =
            values.iter().copied().partition(|&v| v <= split.cut_value);
        prop_assert!(!left.is_empty() && !right.is_empty());
        prop_assert!((squared_error(&left) - split.left_error).abs() <= tolerance);
        prop_assert!((squared_error(&right) - split.right_error).abs() <= tolerance);
        prop_assert!((split.left_error + split.right_error - split.error).abs() <= tolerance);
    }
}
