//! Datasets
//!
//! This module implements the dataset struct that every forest trains on, the numeric trait
//! bound for feature values and the accessor contract used by the tree growing engine.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, ShapeBuilder};

use num_traits::{NumCast, Signed, ToPrimitive};
use rand::seq::SliceRandom;
use rand::Rng;

use std::fmt;

use crate::error::{Error, Result};
use crate::prefetch::prefetch_read;

mod impl_csv;

/// Feature values
///
/// This trait bound multiplexes over the numeric types an observation matrix may hold. Floating
/// point values compare with a relative tolerance when the split scan decides whether two
/// neighbouring values can be separated, integers compare exactly.
pub trait Feature:
    num_traits::Num
    + Signed
    + NumCast
    + Copy
    + PartialOrd
    + Default
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + 'static
{
    /// Returns true if a threshold can be placed between `self` and `other`
    fn differs(self, other: Self) -> bool;

    /// The threshold placed between two values which differ, `self` being the smaller one
    fn split_point(self, upper: Self) -> Self;

    /// Lossy conversion used by the packed representation
    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

macro_rules! impl_float_feature {
    ($t:ty) => {
        impl Feature for $t {
            #[inline]
            fn differs(self, other: Self) -> bool {
                let scale = self.abs().max(other.abs());
                (self - other).abs() > <$t>::EPSILON * 4.0 * scale
            }

            #[inline]
            fn split_point(self, upper: Self) -> Self {
                (self + upper) / 2.0
            }
        }
    };
}

macro_rules! impl_integer_feature {
    ($t:ty) => {
        impl Feature for $t {
            #[inline]
            fn differs(self, other: Self) -> bool {
                self != other
            }

            // floors towards the lower value so that `self <= split_point < upper`
            #[inline]
            fn split_point(self, upper: Self) -> Self {
                self + (upper - self) / 2
            }
        }
    };
}

impl_float_feature!(f32);
impl_float_feature!(f64);
impl_integer_feature!(i32);
impl_integer_feature!(i64);

/// Memory order of the observation matrix
#[cfg_attr(
    feature = "serde",
    derive(serde_crate::Serialize, serde_crate::Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// All features of an observation are adjacent
    RowMajor,
    /// All observations of a feature are adjacent
    ColumnMajor,
}

/// Dataset
///
/// Observations with dimensionality (nobservations, nfeatures) together with one class label per
/// observation. Class labels are dense indices `0..num_classes`. The records are immutable once
/// loaded, so a dataset can be shared by every worker growing trees.
///
/// # Fields
///
/// * `records`: a two-dimensional matrix with dimensionality (nobservations, nfeatures)
/// * `targets`: the class label of every observation
/// * `num_classes`: number of classes, at least one more than the largest label
/// * `feature_names`: optional descriptive feature names with dimensionality (nfeatures)
#[cfg_attr(
    feature = "serde",
    derive(serde_crate::Serialize, serde_crate::Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug)]
pub struct Dataset<F> {
    records: Array2<F>,
    targets: Array1<usize>,
    num_classes: usize,
    feature_names: Vec<String>,
}

impl<F: Feature> Dataset<F> {
    /// Creates a labelled dataset
    ///
    /// ### Parameters
    ///
    /// * `records`: observations in rows, features in columns
    /// * `targets`: class label of every observation
    ///
    /// ### Returns
    ///
    /// The dataset, or `Error::Data` if the number of labels does not match the number of
    /// observations or the matrix is empty.
    pub fn new(records: Array2<F>, targets: Array1<usize>) -> Result<Self> {
        if records.nrows() != targets.len() {
            return Err(Error::Data(format!(
                "{} observations but {} labels",
                records.nrows(),
                targets.len()
            )));
        }
        if records.nrows() == 0 || records.ncols() == 0 {
            return Err(Error::Data("dataset contains no observations or no features".into()));
        }
        let num_classes = targets.iter().max().map(|m| m + 1).unwrap_or(1);

        Ok(Dataset {
            records,
            targets,
            num_classes,
            feature_names: Vec::new(),
        })
    }

    /// Creates a dataset without labels, as used by the unsupervised forests
    pub fn unlabeled(records: Array2<F>) -> Result<Self> {
        let targets = Array1::zeros(records.nrows());
        Self::new(records, targets)
    }

    /// Declares more classes than the labels show, e.g. for a subset of a larger dataset
    pub fn with_num_classes(mut self, num_classes: usize) -> Result<Self> {
        if num_classes < self.num_classes {
            return Err(Error::Parameters(format!(
                "numClasses is {} but the labels contain class {}",
                num_classes,
                self.num_classes - 1
            )));
        }
        self.num_classes = num_classes;
        Ok(self)
    }

    /// Updates the feature names of a dataset
    pub fn with_feature_names<I: Into<String>>(mut self, names: Vec<I>) -> Self {
        self.feature_names = names.into_iter().map(|x| x.into()).collect();
        self
    }

    /// Rearranges the records into the requested memory order
    pub fn with_layout(mut self, layout: Layout) -> Self {
        if self.layout() != layout {
            let mut records = match layout {
                Layout::RowMajor => Array2::zeros(self.records.raw_dim()),
                Layout::ColumnMajor => Array2::zeros(self.records.raw_dim().f()),
            };
            records.assign(&self.records);
            self.records = records;
        }
        self
    }

    pub fn layout(&self) -> Layout {
        if self.records.is_standard_layout() {
            Layout::RowMajor
        } else {
            Layout::ColumnMajor
        }
    }

    pub fn records(&self) -> ArrayView2<F> {
        self.records.view()
    }

    pub fn targets(&self) -> ArrayView1<usize> {
        self.targets.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn nobservations(&self) -> usize {
        self.records.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.records.ncols()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Value of `feature` for observation `obs`
    ///
    /// ### Panics
    ///
    /// If either index is out of bounds
    #[inline]
    pub fn feature_value(&self, feature: usize, obs: usize) -> F {
        self.records[[obs, feature]]
    }

    #[inline]
    pub fn label(&self, obs: usize) -> usize {
        self.targets[obs]
    }

    /// Hints the cache that `feature_value(feature, obs)` will be read soon
    #[inline]
    pub fn prefetch_feature_value(&self, feature: usize, obs: usize) {
        if let Some(value) = self.records.get((obs, feature)) {
            prefetch_read(value);
        }
    }

    pub fn observation(&self, obs: usize) -> ArrayView1<F> {
        self.records.row(obs)
    }

    /// Number of observations per class
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for &label in self.targets.iter() {
            counts[label] += 1;
        }
        counts
    }

    /// Returns a copy with the observations in random order
    pub fn shuffle<R: Rng>(&self, rng: &mut R) -> Self {
        let mut indices = (0..self.nobservations()).collect::<Vec<_>>();
        indices.shuffle(rng);
        self.select(&indices)
    }

    /// Splits the observations at `ratio` into two datasets sharing the class count
    pub fn split_with_ratio(&self, ratio: f32) -> (Self, Self) {
        let n = ((self.nobservations() as f32) * ratio).ceil() as usize;
        let n = n.min(self.nobservations());
        let first = (0..n).collect::<Vec<_>>();
        let second = (n..self.nobservations()).collect::<Vec<_>>();

        (self.select(&first), self.select(&second))
    }

    fn select(&self, indices: &[usize]) -> Self {
        let records = self.records.select(Axis(0), indices);
        let records = match self.layout() {
            Layout::RowMajor => records,
            Layout::ColumnMajor => {
                let mut out = Array2::zeros(records.raw_dim().f());
                out.assign(&records);
                out
            }
        };
        Dataset {
            records,
            targets: self.targets.select(Axis(0), indices),
            num_classes: self.num_classes,
            feature_names: self.feature_names.clone(),
        }
    }
}
