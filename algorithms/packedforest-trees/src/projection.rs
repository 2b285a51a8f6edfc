//! Split candidates
//!
//! A split candidate maps every observation to a single value, the cut is placed on that value.
//! Random forests use one feature, randomer forests sum a sparse random subset of features,
//! optionally with `+1`/`-1` weights, and structured RerF sums rectangular pixel patches.

use packedforest::{Dataset, Feature, Mwc};

use crate::hyperparams::{ImagePatch, ProjectionKind};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// The feature or linear combination of features a node splits on
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureRef {
    Single(usize),
    /// Sum of the listed features, duplicates count twice
    Combination(Vec<usize>),
    /// Sum of the listed features, each added or subtracted according to its weight
    Weighted { features: Vec<usize>, weights: Vec<i8> },
}

impl FeatureRef {
    /// Evaluates the candidate with `value` supplying feature values
    #[inline]
    pub fn project_with<F: Feature, V: Fn(usize) -> F>(&self, value: V) -> F {
        match self {
            FeatureRef::Single(feature) => value(*feature),
            FeatureRef::Combination(features) => features
                .iter()
                .fold(F::zero(), |acc, &feature| acc + value(feature)),
            FeatureRef::Weighted { features, weights } => features
                .iter()
                .zip(weights.iter())
                .fold(F::zero(), |acc, (&feature, &weight)| {
                    if weight > 0 {
                        acc + value(feature)
                    } else {
                        acc - value(feature)
                    }
                }),
        }
    }

    /// Evaluates the candidate for observation `obs` of `data`
    #[inline]
    pub fn project<F: Feature>(&self, data: &Dataset<F>, obs: usize) -> F {
        self.project_with(|feature| data.feature_value(feature, obs))
    }

    /// Evaluates the candidate for an observation given as a slice of feature values
    #[inline]
    pub fn project_row<F: Feature>(&self, row: &[F]) -> F {
        self.project_with(|feature| row[feature])
    }

    /// Hints the cache that the values of `obs` are about to be projected
    #[inline]
    pub fn prefetch<F: Feature>(&self, data: &Dataset<F>, obs: usize) {
        for &feature in self.features() {
            data.prefetch_feature_value(feature, obs);
        }
    }

    /// Features the candidate reads
    pub fn features(&self) -> &[usize] {
        match self {
            FeatureRef::Single(feature) => std::slice::from_ref(feature),
            FeatureRef::Combination(features) => features,
            FeatureRef::Weighted { features, .. } => features,
        }
    }

    /// The single feature, `None` for combinations
    pub fn as_single(&self) -> Option<usize> {
        match self {
            FeatureRef::Single(feature) => Some(*feature),
            _ => None,
        }
    }

    /// Largest feature index read, used to check an observation is wide enough
    pub fn max_feature(&self) -> Option<usize> {
        self.features().iter().copied().max()
    }
}

impl Default for FeatureRef {
    fn default() -> Self {
        FeatureRef::Single(0)
    }
}

/// Draws the split candidates of a node
#[derive(Clone, Debug)]
pub(crate) struct FeatureProjector {
    kind: ProjectionKind,
    num_features: usize,
    mtry: usize,
    features_per_draw: usize,
    image_patch: ImagePatch,
    scratch: Vec<usize>,
}

impl FeatureProjector {
    pub fn new(
        kind: ProjectionKind,
        num_features: usize,
        mtry: usize,
        features_per_draw: usize,
        image_patch: ImagePatch,
    ) -> Self {
        FeatureProjector {
            kind,
            num_features,
            mtry,
            features_per_draw,
            image_patch,
            scratch: Vec::with_capacity(num_features),
        }
    }

    /// Draws the candidates of one node, callers consume them back to front
    pub fn draw(&mut self, rng: &mut Mwc) -> Vec<FeatureRef> {
        match self.kind {
            ProjectionKind::Single => self.draw_single(rng),
            ProjectionKind::Combination => self.draw_combinations(rng, false),
            ProjectionKind::Ternary => self.draw_combinations(rng, true),
            ProjectionKind::ImagePatch => self.draw_patches(rng),
        }
    }

    // partial Fisher-Yates, the first `mtry` positions hold distinct features
    fn draw_single(&mut self, rng: &mut Mwc) -> Vec<FeatureRef> {
        self.scratch.clear();
        self.scratch.extend(0..self.num_features);
        let mtry = self.mtry.min(self.num_features);
        for location in 0..mtry {
            let other = rng.gen_range(self.num_features - location) + location;
            self.scratch.swap(location, other);
        }
        self.scratch[..mtry]
            .iter()
            .map(|&feature| FeatureRef::Single(feature))
            .collect()
    }

    fn draw_combinations(&mut self, rng: &mut Mwc, weighted: bool) -> Vec<FeatureRef> {
        let mut features = vec![Vec::new(); self.mtry];
        let mut weights = vec![Vec::new(); self.mtry];
        for _ in 0..self.features_per_draw {
            let slot = rng.gen_range(self.mtry);
            features[slot].push(rng.gen_range(self.num_features));
            if weighted {
                let weight = if rng.gen_range(2) % 2 == 1 { 1 } else { -1 };
                weights[slot].push(weight);
            }
        }

        features
            .into_iter()
            .zip(weights)
            .filter(|(features, _)| !features.is_empty())
            .map(|(features, weights)| {
                if weighted {
                    FeatureRef::Weighted { features, weights }
                } else {
                    FeatureRef::Combination(features)
                }
            })
            .collect()
    }

    fn draw_patches(&mut self, rng: &mut Mwc) -> Vec<FeatureRef> {
        let p = &self.image_patch;
        (0..self.mtry)
            .map(|_| {
                let height =
                    rng.gen_range(p.patch_height_max - p.patch_height_min + 1) + p.patch_height_min;
                let width =
                    rng.gen_range(p.patch_width_max - p.patch_width_min + 1) + p.patch_width_min;
                let delta_h = p.image_height - height + 1;
                let delta_w = p.image_width - width + 1;
                let seed = rng.gen_range(delta_h * delta_w);
                let top_left = seed % delta_w + p.image_width * (seed / delta_w);

                let mut features = Vec::with_capacity(height * width);
                for row in 0..height {
                    for col in 0..width {
                        features.push(top_left + col + p.image_width * row);
                    }
                }
                let weights = vec![1; features.len()];
                FeatureRef::Weighted { features, weights }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::collections::HashSet;

    #[test]
    fn projections_sum_feature_values() {
        let row = [1.0, 2.0, 4.0, 8.0];
        assert_abs_diff_eq!(FeatureRef::Single(2).project_row(&row), 4.0);
        assert_abs_diff_eq!(FeatureRef::Combination(vec![0, 3, 3]).project_row(&row), 17.0);

        let weighted = FeatureRef::Weighted {
            features: vec![1, 2, 3],
            weights: vec![1, -1, 1],
        };
        assert_abs_diff_eq!(weighted.project_row(&row), 6.0);
        assert_eq!(weighted.max_feature(), Some(3));
    }

    #[test]
    fn dataset_and_row_projection_agree() {
        let data = Dataset::new(array![[1, 2, 3], [4, 5, 6]], array![0, 1]).unwrap();
        let combination = FeatureRef::Combination(vec![0, 2]);
        assert_eq!(combination.project(&data, 1), 10);
        assert_eq!(combination.project_row(&[4, 5, 6]), 10);
    }

    #[test]
    fn single_draw_is_without_replacement() {
        let mut rng = Mwc::from_seed(5);
        let mut projector =
            FeatureProjector::new(ProjectionKind::Single, 10, 10, 10, ImagePatch::default());
        let features: HashSet<usize> = projector
            .draw(&mut rng)
            .iter()
            .filter_map(FeatureRef::as_single)
            .collect();
        assert_eq!(features, (0..10).collect());

        let mut projector =
            FeatureProjector::new(ProjectionKind::Single, 10, 3, 3, ImagePatch::default());
        assert_eq!(projector.draw(&mut rng).len(), 3);
    }

    #[test]
    fn combinations_distribute_every_draw() {
        let mut rng = Mwc::from_seed(11);
        let mut projector =
            FeatureProjector::new(ProjectionKind::Combination, 6, 4, 12, ImagePatch::default());
        let candidates = projector.draw(&mut rng);
        assert!(!candidates.is_empty() && candidates.len() <= 4);

        let total: usize = candidates.iter().map(|c| c.features().len()).sum();
        assert_eq!(total, 12);
        assert!(candidates.iter().all(|c| c.max_feature().unwrap() < 6));
    }

    #[test]
    fn ternary_weights_are_signs() {
        let mut rng = Mwc::from_seed(3);
        let mut projector =
            FeatureProjector::new(ProjectionKind::Ternary, 6, 3, 9, ImagePatch::default());
        for candidate in projector.draw(&mut rng) {
            match candidate {
                FeatureRef::Weighted { features, weights } => {
                    assert_eq!(features.len(), weights.len());
                    assert!(weights.iter().all(|&w| w == 1 || w == -1));
                }
                other => panic!("unexpected candidate {:?}", other),
            }
        }
    }

    #[test]
    fn patches_stay_inside_the_image() {
        let patch = ImagePatch {
            image_height: 5,
            image_width: 7,
            patch_height_min: 1,
            patch_height_max: 3,
            patch_width_min: 2,
            patch_width_max: 4,
        };
        let mut rng = Mwc::from_seed(99);
        let mut projector = FeatureProjector::new(ProjectionKind::ImagePatch, 35, 20, 20, patch);

        for candidate in projector.draw(&mut rng) {
            let features = candidate.features();
            let rows: HashSet<usize> = features.iter().map(|f| f / 7).collect();
            let cols: HashSet<usize> = features.iter().map(|f| f % 7).collect();
            assert!((1..=3).contains(&rows.len()));
            assert!((2..=4).contains(&cols.len()));
            assert_eq!(features.len(), rows.len() * cols.len());
            assert!(features.iter().all(|&f| f < 35));
        }
    }
}
