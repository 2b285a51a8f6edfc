//! `packedforest-datasets` provides datasets ready to be used in tests, examples and benches of
//! the packedforest crates.
//!
//! Currently the following datasets are provided:
//!
//! * `["iris"]` : iris flower dataset, 150 observations of 4 features in 3 classes
//! * `["generate"]` : labelled gaussian blobs of any size
//!
//! ```ignore
//! packedforest-datasets = { version = "0.3.0", features = ["iris"] }
//! ```
//! and then use it in your tests as
//! ```ignore
//! let (train, valid) = packedforest_datasets::iris().split_with_ratio(0.8);
//! ```

#[cfg(feature = "generate")]
pub mod generate;

#[cfg(feature = "iris")]
use csv::ReaderBuilder;
#[cfg(feature = "iris")]
use flate2::read::GzDecoder;
#[cfg(feature = "iris")]
use ndarray::prelude::*;
#[cfg(feature = "iris")]
use ndarray_csv::Array2Reader;
#[cfg(feature = "iris")]
use packedforest::Dataset;

#[cfg(feature = "iris")]
fn array_from_buf(buf: &[u8]) -> Array2<f64> {
    // unzip file
    let file = GzDecoder::new(buf);
    // create a CSV reader with headers and `,` as delimiter
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .from_reader(file);

    // extract ndarray
    reader.deserialize_array2_dynamic().unwrap()
}

#[cfg(feature = "iris")]
/// Read in the iris-flower dataset, labels are `0` setosa, `1` versicolor and `2` virginica
// The `.csv` data is two dimensional: Axis(0) denotes y-axis (rows), Axis(1) denotes x-axis
// (columns)
pub fn iris() -> Dataset<f64> {
    let data = include_bytes!("../data/iris.csv.gz");
    let array = array_from_buf(&data[..]);

    let records = array.slice(s![.., 0..4]).to_owned();
    let targets = array.column(4).mapv(|x| x as usize);

    let feature_names = vec!["sepal length", "sepal width", "petal length", "petal width"];

    Dataset::new(records, targets)
        .unwrap()
        .with_feature_names(feature_names)
}

#[cfg(test)]
mod tests {
    #[cfg(feature = "iris")]
    #[test]
    fn test_iris() {
        let ds = super::iris();

        assert_eq!(ds.nobservations(), 150);
        assert_eq!(ds.nfeatures(), 4);
        assert_eq!(ds.num_classes(), 3);
        assert_eq!(ds.class_counts(), vec![50, 50, 50]);
        assert_eq!(ds.feature_names().len(), 4);
        approx::assert_abs_diff_eq!(ds.feature_value(0, 0), 5.1);
    }
}
