use packedforest::{error::Error, error::Result, ParamGuard};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// The set of valid hyper-parameters for packing a forest
///
/// See [`PackingParams`] for more information.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackingValidParams {
    num_bins: usize,
    head_depth: usize,
}

impl PackingValidParams {
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn head_depth(&self) -> usize {
        self.head_depth
    }
}

/// Layout of a packed forest
///
/// ### Parameters
///
/// * `num_bins`: number of bins the trees are spread over, bins are traversed in parallel.
///   Clamped to the number of trees. Defaults to `1`.
/// * `head_depth`: number of top levels of each bin laid out level by level across all of its
///   trees. Defaults to `0`, every tree laid out depth first.
///
/// ### Example
///
/// ```rust
/// use packedforest::prelude::*;
/// use packedforest_packing::PackingParams;
/// use packedforest_trees::ForestParams;
///
/// let dataset = packedforest_datasets::iris();
/// let forest = ForestParams::new().num_trees(16).seed(4).fit(&dataset)?;
///
/// let packed = PackingParams::new().num_bins(4).head_depth(2).fit(&forest)?;
/// assert_eq!(packed.num_trees(), 16);
/// assert_eq!(packed.predict_class(&[5.1, 3.5, 1.4, 0.2])?, 0);
/// # Ok::<(), packedforest::error::Error>(())
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackingParams(PackingValidParams);

impl Default for PackingParams {
    fn default() -> Self {
        Self::new()
    }
}

impl PackingParams {
    pub fn new() -> Self {
        PackingParams(PackingValidParams {
            num_bins: 1,
            head_depth: 0,
        })
    }

    pub fn num_bins(mut self, num_bins: usize) -> Self {
        self.0.num_bins = num_bins;
        self
    }

    pub fn head_depth(mut self, head_depth: usize) -> Self {
        self.0.head_depth = head_depth;
        self
    }
}

impl ParamGuard for PackingParams {
    type Checked = PackingValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.num_bins == 0 {
            Err(Error::Parameters(
                "number of bins should be at least one, but was 0".to_string(),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_bins_are_rejected() {
        assert!(PackingParams::new().num_bins(0).check().is_err());
        let params = PackingParams::new().num_bins(3).head_depth(5).check_unwrap();
        assert_eq!(params.num_bins(), 3);
        assert_eq!(params.head_depth(), 5);
    }
}
