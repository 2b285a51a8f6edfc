use std::cmp::Ordering;

use packedforest::Feature;

use crate::impurity::ClassTotals;
use crate::projection::FeatureRef;

/// Best split seen so far at a node
///
/// Starts out bounded by the node's own impurity, a candidate is only accepted if it is strictly
/// better. Without an accepted candidate `feature` stays `None`, which marks the node a leaf.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitCandidate<F> {
    impurity: f64,
    split_value: F,
    left_impurity: f64,
    right_impurity: f64,
    feature: Option<FeatureRef>,
}

impl<F: Feature> SplitCandidate<F> {
    /// A bound every finite split improves on
    pub fn unbounded() -> Self {
        Self::bounded_by(f64::INFINITY)
    }

    /// A bound requiring splits to beat `impurity`
    pub fn bounded_by(impurity: f64) -> Self {
        SplitCandidate {
            impurity,
            split_value: F::zero(),
            left_impurity: 0.0,
            right_impurity: 0.0,
            feature: None,
        }
    }

    fn accept(
        &mut self,
        impurity: f64,
        split_value: F,
        left_impurity: f64,
        right_impurity: f64,
        feature: &FeatureRef,
    ) {
        self.impurity = impurity;
        self.split_value = split_value;
        self.left_impurity = left_impurity;
        self.right_impurity = right_impurity;
        if self.feature.as_ref() != Some(feature) {
            self.feature = Some(feature.clone());
        }
    }

    /// Summed impurity of both sides, or the bound if nothing was accepted
    pub fn impurity(&self) -> f64 {
        self.impurity
    }

    pub fn split_value(&self) -> F {
        self.split_value
    }

    pub fn left_impurity(&self) -> f64 {
        self.left_impurity
    }

    pub fn right_impurity(&self) -> f64 {
        self.right_impurity
    }

    pub fn feature(&self) -> Option<&FeatureRef> {
        self.feature.as_ref()
    }

    pub fn found(&self) -> bool {
        self.feature.is_some()
    }

    /// Both sides are pure, no other candidate can improve
    pub fn is_perfect(&self) -> bool {
        self.found() && self.impurity == 0.0
    }

    pub fn into_feature(self) -> Option<(FeatureRef, F)> {
        let split_value = self.split_value;
        self.feature.map(|feature| (feature, split_value))
    }
}

/// Scans sorted projections for the cut with the lowest summed impurity
///
/// Observations move from the right to the left side one at a time. A cut is evaluated only
/// between neighbours whose values differ, so equal values always end up on the same side.
#[derive(Clone, Debug)]
pub struct SplitFinder {
    left: ClassTotals,
    right: ClassTotals,
}

impl SplitFinder {
    pub fn new(num_classes: usize) -> Self {
        SplitFinder {
            left: ClassTotals::new(num_classes),
            right: ClassTotals::new(num_classes),
        }
    }

    /// Updates `best` with the best cut of one candidate
    ///
    /// ### Parameters
    ///
    /// * `pairs`: projected value and class of every observation, sorted in place
    /// * `totals`: the class totals of exactly these observations
    /// * `feature`: the candidate the values were projected on
    /// * `best`: the best split so far
    ///
    /// ### Returns
    ///
    /// `true` if `best` was replaced
    pub fn find_best<F: Feature>(
        &mut self,
        pairs: &mut [(F, usize)],
        totals: &ClassTotals,
        feature: &FeatureRef,
        best: &mut SplitCandidate<F>,
    ) -> bool {
        pairs.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        self.left.reset();
        self.right.copy_from(totals);

        let mut improved = false;
        for window in pairs.windows(2) {
            let (value, class) = window[0];
            let next = window[1].0;
            self.left.increment(class);
            self.right.decrement(class);

            if value.differs(next) {
                let left_impurity = self.left.impurity();
                let right_impurity = self.right.impurity();
                let impurity = left_impurity + right_impurity;
                if impurity < best.impurity {
                    best.accept(
                        impurity,
                        value.split_point(next),
                        left_impurity,
                        right_impurity,
                        feature,
                    );
                    improved = true;
                }
            }
        }

        if let Some(&(_, class)) = pairs.last() {
            self.left.increment(class);
            self.right.decrement(class);
        }
        debug_assert_eq!(self.right.total(), 0, "class totals do not match the observations");

        improved
    }
}
