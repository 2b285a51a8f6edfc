//! Utility functions for randomly generating labelled datasets

use ndarray::{s, Array, Array1, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::{
    rand::Rng,
    rand_distr::{Distribution, StandardNormal},
    RandomExt,
};
use packedforest::Dataset;

/// Special case of `blobs_with_distribution` with a standard normal distribution.
pub fn blobs(
    blob_size: usize,
    blob_centroids: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    rng: &mut impl Rng,
) -> Dataset<f64> {
    blobs_with_distribution(blob_size, blob_centroids, StandardNormal, rng)
}

/// Given an input matrix `blob_centroids`, with shape `(n_blobs, n_features)`,
/// generate `blob_size` observations around each of the blob centroids. Observations of
/// blob `i` carry the class label `i`.
pub fn blobs_with_distribution(
    blob_size: usize,
    blob_centroids: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    distribution: impl Distribution<f64> + Clone,
    rng: &mut impl Rng,
) -> Dataset<f64> {
    let (n_centroids, n_features) = blob_centroids.dim();
    let mut records: Array2<f64> = Array2::zeros((n_centroids * blob_size, n_features));

    for (blob_index, blob_centroid) in blob_centroids.rows().into_iter().enumerate() {
        let shape = (blob_size, n_features);
        let blob = Array::random_using(shape, distribution.clone(), rng) + blob_centroid;

        let indexes = s![blob_index * blob_size..(blob_index + 1) * blob_size, ..];
        records.slice_mut(indexes).assign(&blob);
    }
    let targets = Array1::from_shape_fn(n_centroids * blob_size, |i| i / blob_size);

    Dataset::new(records, targets).unwrap()
}
