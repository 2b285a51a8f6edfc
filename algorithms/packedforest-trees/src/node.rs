use packedforest::{prefetch::PREFETCH_DISTANCE, Feature, Mwc};

use crate::context::TrainingContext;
use crate::impurity::ClassTotals;
use crate::partition::{NodeRange, ObservationBuffer};
use crate::projection::{FeatureProjector, FeatureRef};
use crate::split::{SplitCandidate, SplitFinder};

/// Where a node is attached in its tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ParentLink {
    pub index: usize,
    pub is_left: bool,
}

/// A node waiting to be processed
#[derive(Clone, Debug)]
pub(crate) struct PendingNode {
    pub parent: Option<ParentLink>,
    pub depth: usize,
    pub range: NodeRange,
}

pub(crate) enum NodeOutcome<F> {
    Leaf {
        class: usize,
    },
    Split {
        feature: FeatureRef,
        cut_value: F,
        left: NodeRange,
        right: NodeRange,
    },
}

/// Decides leaf or split for the nodes of a supervised tree
///
/// Owns the scratch buffers of the split search, so one processor serves every node a worker
/// grows without allocating per node.
pub(crate) struct NodeProcessor<'a, F> {
    ctx: &'a TrainingContext<'a, F>,
    projector: FeatureProjector,
    finder: SplitFinder,
    working_set: Vec<(usize, usize)>,
    projected: Vec<(F, usize)>,
}

impl<'a, F: Feature> NodeProcessor<'a, F> {
    pub fn new(ctx: &'a TrainingContext<'a, F>) -> Self {
        NodeProcessor {
            ctx,
            projector: FeatureProjector::new(
                ctx.projection,
                ctx.num_features,
                ctx.mtry,
                ctx.features_per_draw,
                ctx.image_patch,
            ),
            finder: SplitFinder::new(ctx.num_classes),
            working_set: Vec::new(),
            projected: Vec::new(),
        }
    }

    pub fn context(&self) -> &'a TrainingContext<'a, F> {
        self.ctx
    }

    fn is_leaf(&self, totals: &ClassTotals, depth: usize) -> bool {
        totals.impurity() == 0.0
            || totals.is_size_at_most(self.ctx.min_parent)
            || depth >= self.ctx.max_depth
    }

    /// Finds the best split of `node` and partitions its observations accordingly
    pub fn process(
        &mut self,
        buffer: &mut ObservationBuffer,
        node: &PendingNode,
        rng: &mut Mwc,
    ) -> NodeOutcome<F> {
        let totals = node.range.class_totals();
        let class = totals.largest_class();
        if self.is_leaf(&totals, node.depth) {
            return NodeOutcome::Leaf { class };
        }

        self.working_set.clear();
        let totals = match self.ctx.subsampling {
            Some((threshold, sample_size)) if totals.total() > threshold => {
                buffer.sample_in_bag(&node.range, sample_size, rng, &mut self.working_set);
                ClassTotals::from_labels(
                    self.working_set.iter().map(|&(_, class)| class),
                    self.ctx.num_classes,
                )
            }
            _ => {
                self.working_set.extend(buffer.in_bag(&node.range));
                totals
            }
        };

        let mut best = SplitCandidate::bounded_by(totals.impurity());
        let mut candidates = self.projector.draw(rng);
        while let Some(feature) = candidates.pop() {
            self.project(&feature);
            self.finder
                .find_best(&mut self.projected, &totals, &feature, &mut best);
            if best.is_perfect() {
                break;
            }
        }

        match best.into_feature() {
            None => NodeOutcome::Leaf { class },
            Some((feature, cut_value)) => {
                let data = self.ctx.data;
                let (left, right) =
                    buffer.split(&node.range, |obs| feature.project(data, obs) <= cut_value);
                NodeOutcome::Split {
                    feature,
                    cut_value,
                    left,
                    right,
                }
            }
        }
    }

    fn project(&mut self, feature: &FeatureRef) {
        let data = self.ctx.data;
        self.projected.clear();
        for (idx, &(obs, class)) in self.working_set.iter().enumerate() {
            if let Some(&(ahead, _)) = self.working_set.get(idx + PREFETCH_DISTANCE) {
                feature.prefetch(data, ahead);
            }
            self.projected.push((feature.project(data, obs), class));
        }
    }
}
