use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::AtomicUsize;

use ndarray::{Array1, Array2, Zip};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use packedforest::{
    error::{Error, Result},
    traits::{Fit, PredictInplace},
    Dataset, Feature,
};
use packedforest_trees::{bin_sizes, Forest, ForestEngine, Tree};

use crate::hyperparams::PackingValidParams;
use crate::tree_bin::PackedBin;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Size in bytes of the forest header
pub const FOREST_HEADER_SIZE: usize = 18;

/// A forest packed into bins for inference
///
/// Bins are independent, every bin holds a contiguous run of the forest's trees. The forest can
/// be stored in and loaded from a little-endian binary file, see [`PackedForest::write_to`].
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct PackedForest {
    bins: Vec<PackedBin>,
    num_trees: usize,
    total_nodes: usize,
    num_classes: usize,
    debug_mode: bool,
    show_all_results: bool,
    required_features: usize,
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

impl PackedForest {
    /// Packs `trees` into `num_bins` bins of consecutive trees, earlier bins taking the remainder
    pub fn from_trees<F: Feature>(
        trees: &[Tree<F>],
        num_classes: usize,
        num_bins: usize,
        head_depth: usize,
    ) -> Result<Self> {
        if trees.is_empty() {
            return Err(Error::Packing("cannot pack a forest without trees".into()));
        }
        let num_bins = if num_bins > trees.len() {
            warn!(num_bins, trees = trees.len(), "more bins than trees, clamped");
            trees.len()
        } else {
            num_bins
        };

        let mut ranges = Vec::with_capacity(num_bins);
        let mut start = 0;
        for size in bin_sizes(trees.len(), num_bins) {
            ranges.push(start..start + size);
            start += size;
        }

        let bins = ranges
            .into_par_iter()
            .map(|range| {
                let bin = PackedBin::pack(&trees[range.clone()], head_depth, num_classes)?;
                debug!(
                    first_tree = range.start,
                    trees = bin.num_trees(),
                    nodes = bin.num_nodes(),
                    "packed bin"
                );
                Ok(bin)
            })
            .collect::<Result<Vec<_>>>()?;

        let forest = PackedForest::from_bins(
            bins,
            trees.iter().map(Tree::num_nodes).sum(),
            num_classes,
            false,
            false,
        );
        info!(
            bins = forest.bins.len(),
            trees = forest.num_trees,
            nodes = forest.total_nodes,
            head_depth,
            "forest packed"
        );
        Ok(forest)
    }

    fn from_bins(
        bins: Vec<PackedBin>,
        total_nodes: usize,
        num_classes: usize,
        debug_mode: bool,
        show_all_results: bool,
    ) -> Self {
        let num_trees = bins.iter().map(PackedBin::num_trees).sum();
        let required_features = bins
            .iter()
            .map(PackedBin::required_features)
            .max()
            .unwrap_or(0);
        PackedForest {
            bins,
            num_trees,
            total_nodes,
            num_classes,
            debug_mode,
            show_all_results,
            required_features,
        }
    }

    pub fn bins(&self) -> &[PackedBin] {
        &self.bins
    }

    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Number of nodes of the trees before packing, leaves included
    pub fn total_nodes(&self) -> usize {
        self.total_nodes
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn show_all_results(&self) -> bool {
        self.show_all_results
    }

    /// Smallest observation length the forest can predict
    pub fn required_features(&self) -> usize {
        self.required_features
    }

    fn check_width(&self, len: usize) -> Result<()> {
        if len < self.required_features {
            return Err(Error::Data(format!(
                "observation has {} features but the forest splits on feature {}",
                len,
                self.required_features - 1
            )));
        }
        Ok(())
    }

    /// Votes per class, bins are traversed in parallel
    pub fn predict_post<F: Feature>(&self, observation: &[F]) -> Result<Vec<usize>> {
        self.check_width(observation.len())?;
        let votes: Vec<AtomicUsize> = (0..self.num_classes).map(|_| AtomicUsize::new(0)).collect();
        self.bins
            .par_iter()
            .for_each(|bin| bin.vote_atomic(|feature| observation[feature].as_f64(), &votes));
        Ok(votes.into_iter().map(AtomicUsize::into_inner).collect())
    }

    /// The class with the most votes, ties going to the lowest class index
    pub fn predict_class<F: Feature>(&self, observation: &[F]) -> Result<usize> {
        self.predict_post(observation).map(|votes| most_votes(&votes))
    }

    /// Votes of all bins from a single thread
    fn votes_sequential<V: Fn(usize) -> f64>(
        &self,
        value: V,
        cursors: &mut Vec<u32>,
    ) -> Vec<usize> {
        let mut votes = vec![0; self.num_classes];
        for bin in self.bins.iter() {
            bin.vote(&value, cursors, &mut votes);
        }
        votes
    }

    /// Fraction of the observations of `data` predicted wrong
    pub fn test_forest<F: Feature>(&self, data: &Dataset<F>) -> Result<f64> {
        self.check_width(data.nfeatures())?;
        let wrong: usize = (0..data.nobservations())
            .into_par_iter()
            .map_init(Vec::new, |cursors, obs| {
                let value = |feature| data.feature_value(feature, obs).as_f64();
                let votes = self.votes_sequential(value, cursors);
                usize::from(most_votes(&votes) != data.label(obs))
            })
            .sum();
        Ok(wrong as f64 / data.nobservations() as f64)
    }

    /// Writes the forest header followed by every bin
    ///
    /// The header holds `numBins`, `numTrees`, `totalNodes` and `numClasses` as `i32` and the
    /// `debug` and `showAll` flags as single bytes, everything little-endian.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let field = |value: usize, what: &str| {
            i32::try_from(value)
                .map_err(|_| Error::Packing(format!("{} {} does not fit 32 bits", what, value)))
        };
        let mut header = [0u8; FOREST_HEADER_SIZE];
        header[0..4].copy_from_slice(&field(self.bins.len(), "numBins")?.to_le_bytes());
        header[4..8].copy_from_slice(&field(self.num_trees, "numTrees")?.to_le_bytes());
        header[8..12].copy_from_slice(&field(self.total_nodes, "totalNodes")?.to_le_bytes());
        header[12..16].copy_from_slice(&field(self.num_classes, "numClasses")?.to_le_bytes());
        header[16] = u8::from(self.debug_mode);
        header[17] = u8::from(self.show_all_results);
        writer.write_all(&header)?;

        for bin in self.bins.iter() {
            bin.write_to(writer)?;
        }
        Ok(())
    }

    /// Reads a forest written by [`PackedForest::write_to`]
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; FOREST_HEADER_SIZE];
        reader.read_exact(&mut header)?;
        let field = |at: usize, what: &str| {
            let value =
                i32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
            usize::try_from(value)
                .map_err(|_| Error::Packing(format!("negative {}: {}", what, value)))
        };
        let num_bins = field(0, "numBins")?;
        let num_trees = field(4, "numTrees")?;
        let total_nodes = field(8, "totalNodes")?;
        let num_classes = field(12, "numClasses")?;

        let mut bins = Vec::with_capacity(num_bins.min(1 << 10));
        for _ in 0..num_bins {
            let bin = PackedBin::read_from(reader)?;
            if bin.num_classes() != num_classes {
                return Err(Error::Packing(format!(
                    "bin has {} classes, the forest {}",
                    bin.num_classes(),
                    num_classes
                )));
            }
            bins.push(bin);
        }

        let forest = PackedForest::from_bins(
            bins,
            total_nodes,
            num_classes,
            header[16] != 0,
            header[17] != 0,
        );
        if forest.num_trees != num_trees {
            return Err(Error::Packing(format!(
                "bins hold {} trees, the header {}",
                forest.num_trees, num_trees
            )));
        }
        Ok(forest)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        debug!(path = %path.as_ref().display(), bins = self.bins.len(), "saved packed forest");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let forest = Self::read_from(&mut reader)?;
        debug!(path = %path.as_ref().display(), bins = forest.bins.len(), "loaded packed forest");
        Ok(forest)
    }
}

impl<F: Feature> Fit<Forest<F>, Error> for PackingValidParams {
    type Object = PackedForest;

    /// Packs a grown forest
    ///
    /// Only forests of independent trees splitting on single features can be packed, others
    /// return `Error::Unsupported`.
    fn fit(&self, forest: &Forest<F>) -> Result<Self::Object> {
        match forest.engine() {
            ForestEngine::Trees(trees) => PackedForest::from_trees(
                trees.trees(),
                trees.num_classes(),
                self.num_bins(),
                self.head_depth(),
            ),
            _ => Err(Error::Unsupported(format!(
                "{} forests cannot be packed",
                forest.forest_type()
            ))),
        }
    }
}

impl<F: Feature> PredictInplace<Array2<F>, Array1<usize>> for PackedForest {
    /// Predicts every row of `x`, in parallel over rows
    fn predict_inplace(&self, x: &Array2<F>, y: &mut Array1<usize>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        assert!(
            x.ncols() >= self.required_features,
            "The observations have fewer features than the forest splits on."
        );

        Zip::from(y).and(x.rows()).par_for_each(|y, row| {
            let mut cursors = Vec::new();
            let votes = self.votes_sequential(|feature| row[feature].as_f64(), &mut cursors);
            *y = most_votes(&votes);
        });
    }

    fn default_target(&self, x: &Array2<F>) -> Array1<usize> {
        Array1::zeros(x.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackingParams;
    use ndarray::array;
    use packedforest::prelude::Predict;
    use packedforest_trees::{ForestParams, ForestType};

    fn stripes() -> Dataset<f64> {
        Dataset::new(
            Array2::from_shape_fn((80, 3), |(i, j)| {
                ((i * 11 + j * 5) % 80) as f64 + (i / 40) as f64 * 100.0
            }),
            Array1::from_shape_fn(80, |i| i / 40),
        )
        .unwrap()
    }

    #[test]
    fn ties_go_to_the_lowest_class() {
        assert_eq!(most_votes(&[3, 1, 3]), 0);
        assert_eq!(most_votes(&[0, 2, 4, 4]), 2);
    }

    #[test]
    fn bins_hold_consecutive_trees() -> Result<()> {
        let data = stripes();
        let forest = ForestParams::new().num_trees(10).seed(3).fit(&data)?;
        let packed = PackingParams::new().num_bins(3).fit(&forest)?;

        let sizes: Vec<usize> = packed.bins().iter().map(PackedBin::num_trees).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(packed.num_trees(), 10);
        assert_eq!(packed.total_nodes(), forest.tree_stats().num_leaf_nodes * 2 - 10);
        Ok(())
    }

    #[test]
    fn too_many_bins_are_clamped() -> Result<()> {
        let data = stripes();
        let forest = ForestParams::new().num_trees(2).seed(3).fit(&data)?;
        let packed = PackingParams::new().num_bins(8).fit(&forest)?;
        assert_eq!(packed.bins().len(), 2);
        Ok(())
    }

    #[test]
    fn combination_forests_are_not_packed() -> Result<()> {
        let data = stripes();
        let forest = ForestParams::new()
            .forest_type(ForestType::RerF)
            .num_trees(4)
            .mtry_mult(2.0)
            .seed(3)
            .fit(&data)?;
        let res = PackingParams::new().fit(&forest);
        assert!(matches!(res, Err(Error::Unsupported(_))));

        let binned = ForestParams::new()
            .forest_type(ForestType::BinnedBase)
            .num_trees(4)
            .seed(3)
            .fit(&data)?;
        assert!(matches!(PackingParams::new().fit(&binned), Err(Error::Unsupported(_))));
        Ok(())
    }

    #[test]
    fn batch_prediction_matches_the_forest() -> Result<()> {
        let data = stripes();
        let forest = ForestParams::new().num_trees(12).seed(8).fit(&data)?;
        let packed = PackingParams::new().num_bins(2).head_depth(1).fit(&forest)?;

        let x = array![[3.0, 40.0, 7.0], [120.0, 150.0, 101.0], [60.0, 2.0, 79.0]];
        assert_eq!(packed.predict(&x), forest.predict(&x));
        assert_eq!(packed.test_forest(&data)?, forest.test_forest(&data)?);
        Ok(())
    }

    #[test]
    fn short_observation_is_rejected() -> Result<()> {
        let data = stripes();
        let forest = ForestParams::new().num_trees(4).seed(1).fit(&data)?;
        let packed = PackingParams::new().fit(&forest)?;
        assert!(packed.required_features() >= 1);
        let empty: &[f64] = &[];
        assert!(matches!(packed.predict_post(empty), Err(Error::Data(_))));
        Ok(())
    }

    #[test]
    fn header_fields_are_checked() -> Result<()> {
        let data = stripes();
        let forest = ForestParams::new().num_trees(3).seed(1).fit(&data)?;
        let packed = PackingParams::new().fit(&forest)?;

        let mut bytes = Vec::new();
        packed.write_to(&mut bytes)?;
        assert_eq!(&bytes[0..4], &1i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &3i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &2i32.to_le_bytes());

        // claim a fourth tree
        bytes[4..8].copy_from_slice(&4i32.to_le_bytes());
        let res = PackedForest::read_from(&mut bytes.as_slice());
        assert!(matches!(res, Err(Error::Packing(_))));

        let res = PackedForest::read_from(&mut &bytes[..10]);
        assert!(matches!(res, Err(Error::Io(_))));
        Ok(())
    }
}
