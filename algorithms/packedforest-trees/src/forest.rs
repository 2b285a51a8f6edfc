use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Zip};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use packedforest::{
    error::{Error, Result},
    traits::{Fit, PredictInplace},
    Dataset, Feature, Mwc,
};

use crate::binned::BinnedForest;
use crate::context::TrainingContext;
use crate::hyperparams::{ForestParams, ForestType, ForestValidParams};
use crate::tree::{OutOfBagTally, Tree, TreeGrower, TreeStats};
use crate::unsupervised::{SimilarityMatrix, UnsupervisedForest};
use packedforest::ParamGuard;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A forest of independently stored trees, grown by `rfBase` and `rerf`
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct RandomForest<F> {
    trees: Vec<Tree<F>>,
    num_classes: usize,
}

impl<F: Feature> RandomForest<F> {
    fn grow(ctx: &TrainingContext<F>, num_trees: usize, seed: i32) -> Result<Self> {
        let trees = (0..num_trees)
            .into_par_iter()
            .map_init(
                || TreeGrower::new(ctx),
                |grower, tree| {
                    let mut rng = Mwc::from_seed(seed.wrapping_add(tree as i32));
                    let grown = Tree::grow(grower, &mut rng)?;
                    debug!(tree, nodes = grown.num_nodes(), "grew tree");
                    Ok(grown)
                },
            )
            .collect::<Result<Vec<_>>>()?;

        Ok(RandomForest {
            trees,
            num_classes: ctx.num_classes,
        })
    }

    pub fn trees(&self) -> &[Tree<F>] {
        &self.trees
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Votes per class, `value` supplies the observation's feature values
    pub fn predict_post<V: Fn(usize) -> F>(&self, value: V) -> Vec<usize> {
        let mut votes = vec![0; self.num_classes];
        for tree in self.trees.iter() {
            votes[tree.predict_with(&value)] += 1;
        }
        votes
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for tree in self.trees.iter() {
            stats += tree.stats();
        }
        stats
    }
}

/// The trained model behind a [`Forest`]
#[derive(Debug)]
pub enum ForestEngine<F> {
    Trees(RandomForest<F>),
    Binned(BinnedForest<F>),
    Unsupervised(UnsupervisedForest<F>),
}

/// A trained forest
///
/// Grown by fitting [`ForestParams`] to a [`Dataset`]. Supervised forests predict the class
/// with the most votes, ties going to the lowest class index.
///
/// ### Example
///
/// ```rust
/// use packedforest::prelude::*;
/// use packedforest_trees::{ForestParams, ForestType};
///
/// let (train, test) = packedforest_datasets::iris()
///     .shuffle(&mut Mwc::from_seed(3))
///     .split_with_ratio(0.8);
///
/// let forest = ForestParams::new()
///     .forest_type(ForestType::BinnedBase)
///     .num_trees(16)
///     .seed(1)
///     .fit(&train)?;
///
/// assert!(forest.test_forest(&test)? < 0.2);
/// # Ok::<(), packedforest::error::Error>(())
/// ```
#[derive(Debug)]
pub struct Forest<F> {
    forest_type: ForestType,
    num_features: usize,
    num_classes: usize,
    engine: ForestEngine<F>,
}

fn most_votes(votes: &[usize]) -> usize {
    let mut best = 0;
    for (class, &count) in votes.iter().enumerate() {
        if count > votes[best] {
            best = class;
        }
    }
    best
}

impl<F: Feature> Forest<F> {
    pub fn forest_type(&self) -> ForestType {
        self.forest_type
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn engine(&self) -> &ForestEngine<F> {
        &self.engine
    }

    pub fn num_trees(&self) -> usize {
        match &self.engine {
            ForestEngine::Trees(forest) => forest.trees.len(),
            ForestEngine::Binned(forest) => forest.num_trees(),
            ForestEngine::Unsupervised(forest) => forest.trees().len(),
        }
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::Unsupported(format!(
            "{} is not defined for {} forests",
            operation, self.forest_type
        ))
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.num_features {
            return Err(Error::Data(format!(
                "observation has {} features, the forest was trained on {}",
                width, self.num_features
            )));
        }
        Ok(())
    }

    // votes of a single observation, bins are traversed in parallel when `parallel` is set
    fn votes_with<V: Fn(usize) -> F + Sync>(&self, value: V, parallel: bool) -> Result<Vec<usize>> {
        match &self.engine {
            ForestEngine::Trees(forest) => Ok(forest.predict_post(value)),
            ForestEngine::Binned(forest) if parallel => Ok(forest.predict_post(value)),
            ForestEngine::Binned(forest) => Ok(forest.predict_post_sequential(value)),
            ForestEngine::Unsupervised(_) => Err(self.unsupported("prediction")),
        }
    }

    /// Votes per class for one observation
    pub fn predict_post(&self, observation: &[F]) -> Result<Vec<usize>> {
        self.check_width(observation.len())?;
        self.votes_with(|feature| observation[feature], true)
    }

    /// Class with the most votes for one observation
    pub fn predict_class(&self, observation: &[F]) -> Result<usize> {
        self.predict_post(observation).map(|votes| most_votes(&votes))
    }

    /// Class with the most votes for observation `obs` of `data`
    pub fn predict_observation(&self, data: &Dataset<F>, obs: usize) -> Result<usize> {
        self.check_width(data.nfeatures())?;
        if obs >= data.nobservations() {
            return Err(Error::Data(format!(
                "observation {} out of {}",
                obs,
                data.nobservations()
            )));
        }
        self.votes_with(|feature| data.feature_value(feature, obs), true)
            .map(|votes| most_votes(&votes))
    }

    /// Fraction of the observations of `data` which are misclassified
    pub fn test_forest(&self, data: &Dataset<F>) -> Result<f64> {
        self.check_width(data.nfeatures())?;
        let wrong = (0..data.nobservations())
            .into_par_iter()
            .map(|obs| {
                let votes = self.votes_with(|feature| data.feature_value(feature, obs), false)?;
                Ok(usize::from(most_votes(&votes) != data.label(obs)))
            })
            .sum::<Result<usize>>()?;
        Ok(wrong as f64 / data.nobservations() as f64)
    }

    /// Mean out-of-bag accuracy over all trees with out-of-bag observations, NaN if none has
    pub fn report_oob(&self) -> Result<f64> {
        let tallies: Vec<OutOfBagTally> = match &self.engine {
            ForestEngine::Trees(forest) => forest.trees.iter().map(Tree::out_of_bag).collect(),
            ForestEngine::Binned(forest) => forest.out_of_bag().copied().collect(),
            ForestEngine::Unsupervised(_) => return Err(self.unsupported("out-of-bag accuracy")),
        };
        let accuracies: Vec<f64> = tallies.iter().filter_map(OutOfBagTally::accuracy).collect();
        if accuracies.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(accuracies.iter().sum::<f64>() / accuracies.len() as f64)
    }

    /// Depth statistics summed over every tree
    pub fn tree_stats(&self) -> TreeStats {
        match &self.engine {
            ForestEngine::Trees(forest) => forest.stats(),
            ForestEngine::Binned(forest) => forest.stats(),
            ForestEngine::Unsupervised(forest) => forest.stats(),
        }
    }

    /// The pair co-occurrence map of unsupervised forests
    pub fn similarity(&self) -> Option<&SimilarityMatrix> {
        match &self.engine {
            ForestEngine::Unsupervised(forest) => Some(forest.similarity()),
            _ => None,
        }
    }

    /// Pair co-occurrence counts of unsupervised forests in key order
    pub fn pair_matrix(&self) -> Result<BTreeMap<(usize, usize), f64>> {
        self.similarity()
            .map(SimilarityMatrix::pair_matrix)
            .ok_or_else(|| self.unsupported("a similarity matrix"))
    }
}

impl<F: Feature> PredictInplace<Array2<F>, Array1<usize>> for Forest<F> {
    /// Predicts every row of `x`, in parallel over rows
    ///
    /// Unsupervised forests do not predict, their targets are left at zero.
    fn predict_inplace(&self, x: &Array2<F>, y: &mut Array1<usize>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        assert_eq!(
            x.ncols(),
            self.num_features,
            "The number of features must match the number the forest was trained on."
        );
        if matches!(self.engine, ForestEngine::Unsupervised(_)) {
            warn!(forest_type = %self.forest_type, "prediction is not defined, returning class 0");
            return;
        }

        Zip::from(y).and(x.rows()).par_for_each(|y, row| {
            if let Ok(votes) = self.votes_with(|feature| row[feature], false) {
                *y = most_votes(&votes);
            }
        });
    }

    fn default_target(&self, x: &Array2<F>) -> Array1<usize> {
        Array1::zeros(x.nrows())
    }
}

impl<F: Feature> Fit<Dataset<F>, Error> for ForestValidParams {
    type Object = Forest<F>;

    /// Grows the forest on a worker pool of `numCores` threads
    fn fit(&self, dataset: &Dataset<F>) -> Result<Self::Object> {
        let relaid;
        let data = if dataset.layout() == self.layout() {
            dataset
        } else {
            relaid = dataset.clone().with_layout(self.layout());
            &relaid
        };
        let ctx = TrainingContext::new(self, data)?;
        let forest_type = ctx.forest_type;
        let seed = self.seed().unwrap_or_else(|| Mwc::from_entropy().gen());

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.num_cores())
            .build()
            .map_err(|err| {
                Error::Parameters(format!(
                    "could not start {} worker threads: {}",
                    self.num_cores(),
                    err
                ))
            })?;

        debug!(
            %forest_type,
            seed,
            mtry = ctx.mtry,
            num_classes = ctx.num_classes,
            "growing forest"
        );
        let engine = pool.install(|| -> Result<ForestEngine<F>> {
            if forest_type.is_unsupervised() {
                UnsupervisedForest::grow(&ctx, self.num_trees(), seed)
                    .map(ForestEngine::Unsupervised)
            } else if forest_type.is_binned() {
                let num_bins = self.resolved_num_tree_bins();
                if matches!(self.num_tree_bins(), Some(bins) if bins > num_bins) {
                    warn!(num_bins, "numTreeBins exceeds the number of trees, clamped");
                }
                BinnedForest::grow(&ctx, self.num_trees(), num_bins, seed).map(ForestEngine::Binned)
            } else {
                RandomForest::grow(&ctx, self.num_trees(), seed).map(ForestEngine::Trees)
            }
        })?;

        let forest = Forest {
            forest_type,
            num_features: ctx.num_features,
            num_classes: ctx.num_classes,
            engine,
        };
        let stats = forest.tree_stats();
        info!(
            %forest_type,
            trees = forest.num_trees(),
            max_depth = stats.max_depth,
            avg_leaf_depth = stats.avg_leaf_depth(),
            leaves = stats.num_leaf_nodes,
            "forest grown"
        );
        Ok(forest)
    }
}

impl ForestValidParams {
    /// Loads `CSVFileName` with the labels in `columnWithY` and grows the forest on it
    pub fn fit_csv(&self) -> Result<Forest<f64>> {
        let path = self
            .csv_file_name()
            .ok_or_else(|| Error::Parameters("CSVFileName is not set".to_string()))?;
        let column = self
            .column_with_y()
            .ok_or_else(|| Error::Parameters("columnWithY is not set".to_string()))?;
        let data = Dataset::from_csv(path, column)?;
        self.fit(&data)
    }
}

impl ForestParams {
    /// Checks the parameters, then see [`ForestValidParams::fit_csv`]
    pub fn fit_csv(&self) -> Result<Forest<f64>> {
        self.check_ref()?.fit_csv()
    }
}
