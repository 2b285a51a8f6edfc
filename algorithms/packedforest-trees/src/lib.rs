//!
//! # Randomized decision forests
//! `packedforest-trees` grows random forests, randomer forests (RerF) and their unsupervised
//! and binned variants on a shared observation matrix.
//!
//! # The big picture
//!
//! Every tree is grown from a single buffer of observation indices. A node owns a range of that
//! buffer, grouped by class, and splitting the node partitions the range in place, so growth
//! never copies the data. Nodes are processed from an explicit work stack, the smaller child
//! first, and written into a flat node array where children are indices.
//!
//! At each node `mtry` split candidates are drawn with a seeded multiply-with-carry generator:
//!
//! * single features for [random forests](ForestType::RfBase)
//! * sparse random sums of features for [randomer forests](ForestType::RerF)
//! * sums with `+1`/`-1` weights for [ternary forests](ForestType::BinnedTernary)
//! * rectangular pixel patches for [structured RerF](ForestType::StructuredRerF)
//!
//! and the cut minimizing the summed Gini impurity of both sides is kept.
//!
//! Trees are grown in parallel on a pool of `numCores` threads. Tree `i` draws from a generator
//! seeded with `seed + i`, so a forest grown with a fixed seed is the same on any number of
//! threads.
//!
//! # Current state
//!
//! The crate provides [supervised forests](RandomForest), forests grown into
//! [bins](BinnedForest) of interleaved trees, and the unsupervised URF/URerF forests which
//! build a [pair similarity map](SimilarityMatrix). [`Forest`] is the common entry point.
//!
//! ```rust
//! use packedforest::prelude::*;
//! use packedforest_trees::{ForestParams, ForestType};
//!
//! let dataset = packedforest_datasets::iris();
//! let forest = ForestParams::new()
//!     .forest_type(ForestType::RfBase)
//!     .num_trees(10)
//!     .seed(-1661580697)
//!     .fit(&dataset)?;
//!
//! assert_eq!(forest.predict_class(&[5.1, 3.5, 1.4, 0.2])?, 0);
//! # Ok::<(), packedforest::error::Error>(())
//! ```

mod binned;
mod context;
mod forest;
mod hyperparams;
mod impurity;
mod node;
mod partition;
mod projection;
mod split;
mod tree;
mod unsupervised;

pub use binned::{bin_sizes, BinNode, BinnedForest, TreeBin};
pub use forest::{Forest, ForestEngine, RandomForest};
pub use hyperparams::{
    ForestParams, ForestType, ForestValidParams, ImagePatch, ParameterValue, ProjectionKind,
};
pub use impurity::ClassTotals;
pub use partition::{NodeRange, ObservationBuffer};
pub use projection::FeatureRef;
pub use split::{SplitCandidate, SplitFinder};
pub use tree::{Node, OutOfBagTally, Tree, TreeStats, MAX_BOOTSTRAP_ATTEMPTS};
pub use unsupervised::{
    two_means_split, SimilarityMatrix, TwoMeansSplit, UnsupervisedForest, IN_BAG_FRACTION,
};

pub use packedforest::error::Result;
