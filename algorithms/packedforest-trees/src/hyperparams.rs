use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use packedforest::{
    error::{Error, Result},
    Layout, ParamGuard,
};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// The family of forest to grow
///
/// Selected once when the parameters are set. The family fixes how split candidates are drawn,
/// whether trees are grown into shared bins and whether labels are used at all.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForestType {
    /// Breiman's random forest, every split on a single feature
    RfBase,
    /// Randomer forest, splits on sparse random sums of features
    RerF,
    /// Unsupervised random forest
    Urf,
    /// Unsupervised randomer forest
    Urerf,
    /// Random forest grown into bins of interleaved trees
    BinnedBase,
    /// Randomer forest grown into bins
    BinnedRerF,
    /// Randomer forest with `+1`/`-1` weights grown into bins
    BinnedTernary,
    /// Randomer forest on images, split candidates are rectangular patches of pixels
    StructuredRerF,
}

/// How split candidates are drawn at a node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionKind {
    Single,
    Combination,
    Ternary,
    ImagePatch,
}

impl ForestType {
    /// The name accepted by the `forestType` parameter
    pub fn name(&self) -> &'static str {
        match self {
            ForestType::RfBase => "rfBase",
            ForestType::RerF => "rerf",
            ForestType::Urf => "urf",
            ForestType::Urerf => "urerf",
            ForestType::BinnedBase => "binnedBase",
            ForestType::BinnedRerF => "binnedBaseRerF",
            ForestType::BinnedTernary => "binnedBaseTern",
            ForestType::StructuredRerF => "structuredRerF",
        }
    }

    pub fn is_binned(&self) -> bool {
        matches!(
            self,
            ForestType::BinnedBase
                | ForestType::BinnedRerF
                | ForestType::BinnedTernary
                | ForestType::StructuredRerF
        )
    }

    pub fn is_unsupervised(&self) -> bool {
        matches!(self, ForestType::Urf | ForestType::Urerf)
    }

    pub fn projection(&self) -> ProjectionKind {
        match self {
            ForestType::RfBase | ForestType::Urf | ForestType::BinnedBase => ProjectionKind::Single,
            ForestType::RerF | ForestType::Urerf | ForestType::BinnedRerF => {
                ProjectionKind::Combination
            }
            ForestType::BinnedTernary => ProjectionKind::Ternary,
            ForestType::StructuredRerF => ProjectionKind::ImagePatch,
        }
    }
}

impl fmt::Display for ForestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ForestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rfBase" => Ok(ForestType::RfBase),
            "rerf" => Ok(ForestType::RerF),
            "urf" => Ok(ForestType::Urf),
            "urerf" => Ok(ForestType::Urerf),
            "binnedBase" => Ok(ForestType::BinnedBase),
            "binnedBaseRerF" => Ok(ForestType::BinnedRerF),
            "binnedBaseTern" => Ok(ForestType::BinnedTernary),
            "structuredRerF" => Ok(ForestType::StructuredRerF),
            other => Err(Error::UnimplementedForestType(other.to_string())),
        }
    }
}

/// Geometry of the image patches drawn by structured RerF
///
/// Features are the pixels of an `image_height × image_width` image in row-major order.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImagePatch {
    pub image_height: usize,
    pub image_width: usize,
    pub patch_height_min: usize,
    pub patch_height_max: usize,
    pub patch_width_min: usize,
    pub patch_width_max: usize,
}

impl ImagePatch {
    fn check(&self) -> Result<()> {
        if self.image_height == 0 || self.image_width == 0 {
            return Err(Error::Parameters(format!(
                "image dimensions must be positive, but were {}x{}",
                self.image_height, self.image_width
            )));
        }
        if self.patch_height_min == 0
            || self.patch_height_min > self.patch_height_max
            || self.patch_height_max > self.image_height
        {
            return Err(Error::Parameters(format!(
                "patch height range [{}, {}] does not fit an image of height {}",
                self.patch_height_min, self.patch_height_max, self.image_height
            )));
        }
        if self.patch_width_min == 0
            || self.patch_width_min > self.patch_width_max
            || self.patch_width_max > self.image_width
        {
            return Err(Error::Parameters(format!(
                "patch width range [{}, {}] does not fit an image of width {}",
                self.patch_width_min, self.patch_width_max, self.image_width
            )));
        }
        Ok(())
    }
}

/// A value for the name based parameter interface, see [`ForestParams::set_parameter`]
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Int(v.into())
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<usize> for ParameterValue {
    fn from(v: usize) -> Self {
        ParameterValue::Int(v as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Text(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::Text(v)
    }
}

impl ParameterValue {
    fn as_int(&self, name: &str) -> Result<i64> {
        match self {
            ParameterValue::Int(v) => Ok(*v),
            // numeric parameters given as doubles are truncated
            ParameterValue::Float(v) if v.is_finite() => Ok(v.trunc() as i64),
            ParameterValue::Bool(v) => Ok(*v as i64),
            ParameterValue::Text(v) => v.trim().parse().map_err(|_| {
                Error::Parameters(format!("{} expects an integer, got `{}`", name, v))
            }),
            ParameterValue::Float(v) => Err(Error::Parameters(format!(
                "{} expects an integer, got {}",
                name, v
            ))),
        }
    }

    fn as_count(&self, name: &str) -> Result<usize> {
        let v = self.as_int(name)?;
        if v < 0 {
            return Err(Error::Parameters(format!(
                "{} must not be negative, but was {}",
                name, v
            )));
        }
        Ok(v as usize)
    }

    fn as_float(&self, name: &str) -> Result<f64> {
        match self {
            ParameterValue::Int(v) => Ok(*v as f64),
            ParameterValue::Float(v) => Ok(*v),
            ParameterValue::Bool(v) => Ok(*v as i64 as f64),
            ParameterValue::Text(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::Parameters(format!("{} expects a number, got `{}`", name, v))),
        }
    }

    fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            ParameterValue::Bool(v) => Ok(*v),
            ParameterValue::Text(v) => match v.trim() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => Err(Error::Parameters(format!(
                    "{} expects a boolean, got `{}`",
                    name, other
                ))),
            },
            other => Ok(other.as_int(name)? != 0),
        }
    }

    fn as_text(&self, name: &str) -> Result<&str> {
        match self {
            ParameterValue::Text(v) => Ok(v),
            other => Err(Error::Parameters(format!(
                "{} expects a string, got {:?}",
                name, other
            ))),
        }
    }
}

/// The set of hyperparameters that can be specified for growing a [forest](crate::Forest).
///
/// ### Example
///
/// ```rust
/// use packedforest::prelude::*;
/// use packedforest_trees::{ForestParams, ForestType};
///
/// let params = ForestParams::new()
///     .forest_type(ForestType::RerF)
///     .num_trees(20)
///     .seed(42);
///
/// let forest = params.fit(&packedforest_datasets::iris()).unwrap();
/// assert!(forest.report_oob().unwrap() > 0.8);
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct ForestValidParams {
    forest_type: ForestType,
    csv_file_name: Option<PathBuf>,
    column_with_y: Option<usize>,
    num_trees: usize,
    min_parent: usize,
    max_depth: Option<usize>,
    num_classes: Option<usize>,
    mtry: Option<usize>,
    mtry_mult: f64,
    fraction_of_features_to_test: Option<f64>,
    bin_size: usize,
    bin_min: usize,
    num_cores: usize,
    seed: Option<i32>,
    num_tree_bins: Option<usize>,
    layout: Layout,
    method_to_use: u8,
    image_patch: ImagePatch,
}

impl ForestValidParams {
    /// The forest family, with `binnedBaseTern` and `methodToUse = 2` resolving to
    /// structured RerF
    pub fn forest_type(&self) -> ForestType {
        match (self.forest_type, self.method_to_use) {
            (ForestType::BinnedTernary, 2) => ForestType::StructuredRerF,
            (forest_type, _) => forest_type,
        }
    }

    pub fn csv_file_name(&self) -> Option<&Path> {
        self.csv_file_name.as_deref()
    }

    pub fn column_with_y(&self) -> Option<usize> {
        self.column_with_y
    }

    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    pub fn min_parent(&self) -> usize {
        self.min_parent
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    pub fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    pub fn mtry(&self) -> Option<usize> {
        self.mtry
    }

    pub fn mtry_mult(&self) -> f64 {
        self.mtry_mult
    }

    pub fn fraction_of_features_to_test(&self) -> Option<f64> {
        self.fraction_of_features_to_test
    }

    pub fn bin_size(&self) -> usize {
        self.bin_size
    }

    pub fn bin_min(&self) -> usize {
        self.bin_min
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn seed(&self) -> Option<i32> {
        self.seed
    }

    pub fn num_tree_bins(&self) -> Option<usize> {
        self.num_tree_bins
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn method_to_use(&self) -> u8 {
        self.method_to_use
    }

    pub fn image_patch(&self) -> &ImagePatch {
        &self.image_patch
    }

    /// Number of bins a binned forest is grown into: unset or zero selects 4, and there are
    /// never more bins than trees
    pub fn resolved_num_tree_bins(&self) -> usize {
        let bins = match self.num_tree_bins {
            Some(bins) if bins >= 1 => bins,
            _ => 4,
        };
        bins.min(self.num_trees)
    }

    /// Node subsampling threshold and sample size, `None` when disabled
    ///
    /// With `binSize > 0` nodes holding more than `binMin` in-bag observations search for
    /// their split on a subsample of `binSize` observations. An unset `binMin` falls back to
    /// `binSize`.
    pub fn node_subsampling(&self) -> Option<(usize, usize)> {
        if self.bin_size == 0 {
            return None;
        }
        let threshold = if self.bin_min == 0 {
            self.bin_size
        } else {
            self.bin_min
        };
        Some((threshold, self.bin_size))
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct ForestParams(ForestValidParams);

impl ForestParams {
    pub fn new() -> Self {
        Self(ForestValidParams {
            forest_type: ForestType::RfBase,
            csv_file_name: None,
            column_with_y: None,
            num_trees: 100,
            min_parent: 1,
            max_depth: None,
            num_classes: None,
            mtry: None,
            mtry_mult: 1.0,
            fraction_of_features_to_test: None,
            bin_size: 0,
            bin_min: 0,
            num_cores: 1,
            seed: None,
            num_tree_bins: None,
            layout: Layout::RowMajor,
            method_to_use: 1,
            image_patch: ImagePatch::default(),
        })
    }

    /// Sets the forest family
    pub fn forest_type(mut self, forest_type: ForestType) -> Self {
        match forest_type {
            ForestType::StructuredRerF => {
                self.0.forest_type = ForestType::BinnedTernary;
                self.0.method_to_use = 2;
            }
            forest_type => {
                self.0.forest_type = forest_type;
                self.0.method_to_use = 1;
            }
        }
        self
    }

    /// Sets the CSV file used by [`ForestValidParams::fit_csv`]
    pub fn csv_file_name<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.0.csv_file_name = Some(path.into());
        self
    }

    /// Sets the CSV column holding the class labels
    pub fn column_with_y(mut self, column: usize) -> Self {
        self.0.column_with_y = Some(column);
        self
    }

    /// Sets the number of trees in the forest
    pub fn num_trees(mut self, num_trees: usize) -> Self {
        self.0.num_trees = num_trees;
        self
    }

    /// Nodes with at most `min_parent` in-bag observations become leaves
    pub fn min_parent(mut self, min_parent: usize) -> Self {
        self.0.min_parent = min_parent;
        self
    }

    /// Sets the optional limit to the depth of every tree
    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.0.max_depth = max_depth;
        self
    }

    /// Declares the number of classes instead of deriving it from the labels
    pub fn num_classes(mut self, num_classes: Option<usize>) -> Self {
        self.0.num_classes = num_classes;
        self
    }

    /// Sets the number of split candidates drawn at each node
    pub fn mtry(mut self, mtry: Option<usize>) -> Self {
        self.0.mtry = mtry;
        self
    }

    /// Randomer forests draw `mtry * mtry_mult` features spread over the `mtry` candidates
    pub fn mtry_mult(mut self, mtry_mult: f64) -> Self {
        self.0.mtry_mult = mtry_mult;
        self
    }

    /// Derives `mtry` as a fraction of the number of features instead of its square root
    pub fn fraction_of_features_to_test(mut self, fraction: Option<f64>) -> Self {
        self.0.fraction_of_features_to_test = fraction;
        self
    }

    /// Sets the node subsample size, zero disables subsampling
    pub fn bin_size(mut self, bin_size: usize) -> Self {
        self.0.bin_size = bin_size;
        self
    }

    /// Sets the in-bag size above which nodes are subsampled
    pub fn bin_min(mut self, bin_min: usize) -> Self {
        self.0.bin_min = bin_min;
        self
    }

    /// Sets the number of worker threads growing trees
    pub fn num_cores(mut self, num_cores: usize) -> Self {
        self.0.num_cores = num_cores;
        self
    }

    /// Fixes the seed, tree `i` draws from a generator seeded with `seed + i`
    pub fn seed(mut self, seed: i32) -> Self {
        self.0.seed = Some(seed);
        self
    }

    /// Draws a fresh seed for every fit
    pub fn random_seed(mut self) -> Self {
        self.0.seed = None;
        self
    }

    /// Sets the number of bins of a binned forest
    pub fn num_tree_bins(mut self, bins: Option<usize>) -> Self {
        self.0.num_tree_bins = bins;
        self
    }

    /// Sets the memory order the observations are trained from
    pub fn layout(mut self, layout: Layout) -> Self {
        self.0.layout = layout;
        self
    }

    /// Sets the image and patch geometry of structured RerF
    pub fn image_patch(mut self, image_patch: ImagePatch) -> Self {
        self.0.image_patch = image_patch;
        self
    }

    /// Sets a parameter by the name used in configuration files
    ///
    /// ### Parameters
    ///
    /// * `name`: one of `forestType`, `CSVFileName`, `numTreesInForest`, `minParent`,
    ///   `maxDepth`, `numClasses`, `mtry`, `mtryMult`, `fractionOfFeaturesToTest`,
    ///   `columnWithY`, `binSize`, `binMin`, `numCores`, `seed`, `numTreeBins`, `useRowMajor`,
    ///   `methodToUse`, `imageHeight`, `imageWidth`, `patchHeightMax`, `patchHeightMin`,
    ///   `patchWidthMax` or `patchWidthMin`
    /// * `value`: an integer, float, boolean or string, converted to the parameter's type
    ///
    /// ### Returns
    ///
    /// The updated parameters, `Error::UnknownParameter` for an unknown name and
    /// `Error::Parameters` for a value that cannot be converted.
    pub fn set_parameter<V: Into<ParameterValue>>(mut self, name: &str, value: V) -> Result<Self> {
        let value = value.into();
        let p = &mut self.0;
        match name {
            "forestType" => {
                p.forest_type = value.as_text(name)?.parse()?;
            }
            "CSVFileName" => p.csv_file_name = Some(PathBuf::from(value.as_text(name)?)),
            "numTreesInForest" => p.num_trees = value.as_count(name)?,
            "minParent" => p.min_parent = value.as_count(name)?,
            "maxDepth" => {
                let depth = value.as_int(name)?;
                p.max_depth = if depth < 0 || depth >= i64::from(i32::MAX) {
                    None
                } else {
                    Some(depth as usize)
                };
            }
            "numClasses" => p.num_classes = Some(value.as_count(name)?),
            "mtry" => {
                let mtry = value.as_int(name)?;
                p.mtry = if mtry < 0 { None } else { Some(mtry as usize) };
            }
            "mtryMult" => p.mtry_mult = value.as_float(name)?,
            "fractionOfFeaturesToTest" => {
                let fraction = value.as_float(name)?;
                p.fraction_of_features_to_test = if fraction < 0.0 { None } else { Some(fraction) };
            }
            "columnWithY" => p.column_with_y = Some(value.as_count(name)?),
            "binSize" => p.bin_size = value.as_count(name)?,
            "binMin" => p.bin_min = value.as_count(name)?,
            "numCores" => p.num_cores = value.as_count(name)?,
            "seed" => {
                let seed = value.as_int(name)?;
                if seed < i64::from(i32::MIN) || seed > i64::from(i32::MAX) {
                    return Err(Error::Parameters(format!("seed {} does not fit 32 bits", seed)));
                }
                p.seed = if seed == -1 { None } else { Some(seed as i32) };
            }
            "numTreeBins" => {
                let bins = value.as_int(name)?;
                p.num_tree_bins = if bins < 1 { None } else { Some(bins as usize) };
            }
            "useRowMajor" => {
                p.layout = if value.as_bool(name)? {
                    Layout::RowMajor
                } else {
                    Layout::ColumnMajor
                };
            }
            "methodToUse" => {
                let method = value.as_int(name)?;
                if method != 1 && method != 2 {
                    return Err(Error::Parameters(format!(
                        "methodToUse outside allowable parameters {{1,2}}: {}",
                        method
                    )));
                }
                p.method_to_use = method as u8;
            }
            "imageHeight" => p.image_patch.image_height = value.as_count(name)?,
            "imageWidth" => p.image_patch.image_width = value.as_count(name)?,
            "patchHeightMax" => p.image_patch.patch_height_max = value.as_count(name)?,
            "patchHeightMin" => p.image_patch.patch_height_min = value.as_count(name)?,
            "patchWidthMax" => p.image_patch.patch_width_max = value.as_count(name)?,
            "patchWidthMin" => p.image_patch.patch_width_min = value.as_count(name)?,
            other => return Err(Error::UnknownParameter(other.to_string())),
        }
        Ok(self)
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamGuard for ForestParams {
    type Checked = ForestValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let p = &self.0;
        if p.num_trees == 0 {
            Err(Error::Parameters(
                "numTreesInForest should be at least one, but was 0".to_string(),
            ))
        } else if p.min_parent == 0 {
            Err(Error::Parameters(
                "minParent should be at least one, but was 0".to_string(),
            ))
        } else if p.max_depth == Some(0) {
            Err(Error::Parameters(
                "maxDepth should be at least one, but was 0".to_string(),
            ))
        } else if p.num_cores == 0 {
            Err(Error::Parameters(
                "numCores should be at least one, but was 0".to_string(),
            ))
        } else if p.mtry == Some(0) {
            Err(Error::Parameters("mtry should be at least one, but was 0".to_string()))
        } else if !(p.mtry_mult > 0.0 && p.mtry_mult.is_finite()) {
            Err(Error::Parameters(format!(
                "mtryMult should be a positive number, but was {}",
                p.mtry_mult
            )))
        } else if matches!(p.fraction_of_features_to_test, Some(f) if !(f > 0.0 && f <= 1.0)) {
            Err(Error::Parameters(format!(
                "fractionOfFeaturesToTest should be in (0, 1], but was {:?}",
                p.fraction_of_features_to_test
            )))
        } else if p.method_to_use == 2 && p.forest_type != ForestType::BinnedTernary {
            Err(Error::Parameters(format!(
                "methodToUse 2 requires forestType binnedBaseTern, but was {}",
                p.forest_type
            )))
        } else if p.method_to_use == 2 {
            p.image_patch.check().map(|_| p)
        } else {
            Ok(p)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
