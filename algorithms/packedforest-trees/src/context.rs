use packedforest::{
    error::{Error, Result},
    Dataset, Feature,
};

use crate::hyperparams::{ForestType, ForestValidParams, ImagePatch, ProjectionKind};

/// Everything growth needs that stays fixed for the whole forest
///
/// Shared read-only by every worker, so one context serves all trees.
#[derive(Debug)]
pub(crate) struct TrainingContext<'a, F> {
    pub data: &'a Dataset<F>,
    pub forest_type: ForestType,
    pub projection: ProjectionKind,
    pub num_classes: usize,
    pub num_features: usize,
    pub min_parent: usize,
    pub max_depth: usize,
    /// Candidates drawn at every node
    pub mtry: usize,
    /// Features spread over the candidates of a randomer forest
    pub features_per_draw: usize,
    pub image_patch: ImagePatch,
    pub subsampling: Option<(usize, usize)>,
}

impl<'a, F: Feature> TrainingContext<'a, F> {
    pub fn new(params: &ForestValidParams, data: &'a Dataset<F>) -> Result<Self> {
        let num_features = data.nfeatures();
        let num_classes = match params.num_classes() {
            Some(n) if n < data.num_classes() => {
                return Err(Error::Parameters(format!(
                    "numClasses is {} but the labels contain class {}",
                    n,
                    data.num_classes() - 1
                )))
            }
            Some(n) => n,
            None => data.num_classes(),
        };

        let forest_type = params.forest_type();
        let projection = forest_type.projection();

        let mtry = match (params.mtry(), params.fraction_of_features_to_test()) {
            (Some(mtry), _) => mtry,
            (None, Some(fraction)) => (fraction * num_features as f64) as usize,
            (None, None) => (num_features as f64).sqrt() as usize,
        }
        .max(1);
        // single feature candidates are drawn without replacement
        let mtry = if projection == ProjectionKind::Single {
            mtry.min(num_features)
        } else {
            mtry
        };
        let features_per_draw = ((mtry as f64 * params.mtry_mult()) as usize).max(1);

        let image_patch = *params.image_patch();
        if projection == ProjectionKind::ImagePatch
            && image_patch.image_height * image_patch.image_width > num_features
        {
            return Err(Error::Parameters(format!(
                "a {}x{} image needs {} features but the data has {}",
                image_patch.image_height,
                image_patch.image_width,
                image_patch.image_height * image_patch.image_width,
                num_features
            )));
        }

        Ok(TrainingContext {
            data,
            forest_type,
            projection,
            num_classes,
            num_features,
            min_parent: params.min_parent(),
            max_depth: params.max_depth().unwrap_or(usize::MAX),
            mtry,
            features_per_draw,
            image_patch,
            subsampling: params.node_subsampling(),
        })
    }

    /// Number of classes among the labels, used to detect degenerate bootstrap samples
    pub fn num_observed_classes(&self) -> usize {
        self.data.class_counts().iter().filter(|&&c| c > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ForestParams;
    use ndarray::{Array1, Array2};
    use packedforest::ParamGuard;

    fn dataset(nfeatures: usize) -> Dataset<f64> {
        let records = Array2::from_shape_fn((10, nfeatures), |(i, j)| (i + j) as f64);
        Dataset::new(records, Array1::from_shape_fn(10, |i| i % 2)).unwrap()
    }

    #[test]
    fn mtry_defaults_to_square_root() -> Result<()> {
        let data = dataset(17);
        let params = ForestParams::new().check()?;
        let ctx = TrainingContext::new(&params, &data)?;
        assert_eq!(ctx.mtry, 4);
        assert_eq!(ctx.features_per_draw, 4);
        assert_eq!(ctx.max_depth, usize::MAX);
        Ok(())
    }

    #[test]
    fn mtry_from_fraction_and_multiplier() -> Result<()> {
        let data = dataset(20);
        let params = ForestParams::new()
            .forest_type(ForestType::RerF)
            .fraction_of_features_to_test(Some(0.25))
            .mtry_mult(1.5)
            .check()?;
        let ctx = TrainingContext::new(&params, &data)?;
        assert_eq!(ctx.mtry, 5);
        assert_eq!(ctx.features_per_draw, 7);
        Ok(())
    }

    #[test]
    fn single_feature_mtry_is_capped() -> Result<()> {
        let data = dataset(3);
        let params = ForestParams::new().mtry(Some(10)).check()?;
        let ctx = TrainingContext::new(&params, &data)?;
        assert_eq!(ctx.mtry, 3);
        Ok(())
    }

    #[test]
    fn declared_classes_must_cover_labels() {
        let data = dataset(3);
        let params = ForestParams::new().num_classes(Some(1)).check().unwrap();
        assert!(TrainingContext::new(&params, &data).is_err());

        let params = ForestParams::new().num_classes(Some(5)).check().unwrap();
        assert_eq!(TrainingContext::new(&params, &data).unwrap().num_classes, 5);
    }
}
