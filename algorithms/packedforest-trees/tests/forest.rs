// packedforest-trees/tests/forest.rs

use std::io::Write;

use ndarray::{Array1, Array2};
use packedforest::prelude::*;
use packedforest_datasets::iris;
use packedforest_trees::{ForestEngine, ForestParams, ForestType};

const SEED: i32 = -1661580697;
const SETOSA: [f64; 4] = [5.1, 3.5, 1.4, 0.2];

#[test]
fn iris_setosa_gets_every_vote() -> Result<()> {
    let dataset = iris();

    for forest_type in [
        ForestType::RfBase,
        ForestType::RerF,
        ForestType::BinnedBase,
        ForestType::BinnedRerF,
    ] {
        let forest = ForestParams::new()
            .forest_type(forest_type)
            .num_trees(10)
            .min_parent(1)
            .seed(SEED)
            .fit(&dataset)?;

        assert_eq!(forest.num_trees(), 10);
        assert_eq!(forest.predict_post(&SETOSA)?, vec![10, 0, 0], "{}", forest_type);
        assert_eq!(forest.predict_class(&SETOSA)?, 0);
    }
    Ok(())
}

#[test]
fn iris_random_forest_high_accuracy() -> Result<()> {
    let (train, valid) = iris().shuffle(&mut Mwc::from_seed(42)).split_with_ratio(0.8);

    let forest = ForestParams::new()
        .forest_type(ForestType::RerF)
        .num_trees(100)
        .seed(42)
        .fit(&train)?;

    // 30 held out observations, so a handful of versicolor/virginica mixups is expected
    let error = forest.test_forest(&valid)?;
    assert!(error <= 0.15, "Expected at most 15% error on Iris, got {:.2}", error);

    let oob = forest.report_oob()?;
    assert!(oob >= 0.9, "Expected at least 90% OOB accuracy on Iris, got {:.2}", oob);
    Ok(())
}

#[test]
fn single_class_data_grows_single_leaves() -> Result<()> {
    let records = Array2::from_shape_fn((20, 3), |(i, j)| (i * 3 + j) as f64);
    let dataset = Dataset::new(records, Array1::from_elem(20, 4))?;

    let forest = ForestParams::new()
        .num_trees(5)
        .seed(9)
        .fit(&dataset)?;

    match forest.engine() {
        ForestEngine::Trees(trees) => {
            assert!(trees.trees().iter().all(|tree| tree.num_nodes() == 1));
        }
        _ => panic!("rfBase should grow independent trees"),
    }
    assert_eq!(forest.predict_class(&[1.0, 2.0, 3.0])?, 4);
    Ok(())
}

#[test]
fn max_depth_bounds_every_tree() -> Result<()> {
    let dataset = iris();

    for max_depth in 1..10 {
        for forest_type in [ForestType::RfBase, ForestType::BinnedBase] {
            let forest = ForestParams::new()
                .forest_type(forest_type)
                .num_trees(8)
                .max_depth(Some(max_depth))
                .seed(SEED)
                .fit(&dataset)?;

            let stats = forest.tree_stats();
            assert!(stats.max_depth <= max_depth);
            assert!(stats.avg_leaf_depth() <= max_depth as f64);
        }
    }
    Ok(())
}

#[test]
fn same_seed_grows_the_same_forest_on_any_pool() -> Result<()> {
    let dataset = iris();
    let params = ForestParams::new()
        .forest_type(ForestType::RerF)
        .num_trees(24)
        .seed(5);

    let single = params.clone().num_cores(1).fit(&dataset)?;
    let pooled = params.num_cores(4).fit(&dataset)?;

    match (single.engine(), pooled.engine()) {
        (ForestEngine::Trees(a), ForestEngine::Trees(b)) => assert_eq!(a, b),
        _ => panic!("rerf should grow independent trees"),
    }
    assert_eq!(single.report_oob()?, pooled.report_oob()?);
    Ok(())
}

#[test]
fn binned_forest_is_reproducible() -> Result<()> {
    let dataset = iris();
    let params = ForestParams::new()
        .forest_type(ForestType::BinnedBase)
        .num_trees(12)
        .num_tree_bins(Some(3))
        .seed(77);

    let first = params.clone().num_cores(1).fit(&dataset)?;
    let second = params.num_cores(3).fit(&dataset)?;

    for obs in 0..dataset.nobservations() {
        let row = dataset.observation(obs).to_vec();
        assert_eq!(first.predict_post(&row)?, second.predict_post(&row)?);
    }
    Ok(())
}

#[test]
fn urf_counts_every_observation_in_every_tree() -> Result<()> {
    let dataset = Dataset::unlabeled(iris().records().to_owned())?;

    let forest = ForestParams::new()
        .forest_type(ForestType::Urf)
        .num_trees(6)
        .min_parent(10)
        .seed(SEED)
        .fit(&dataset)?;

    let pairs = forest.pair_matrix()?;
    for obs in 0..dataset.nobservations() {
        assert_eq!(pairs[&(obs, obs)], 6.0);
    }
    assert!(pairs.values().all(|&count| count >= 1.0 && count <= 6.0));
    assert!(pairs.keys().all(|&(i, j)| i <= j));

    assert!(matches!(forest.predict_class(&SETOSA), Err(Error::Unsupported(_))));
    assert!(matches!(forest.report_oob(), Err(Error::Unsupported(_))));
    Ok(())
}

#[test]
fn string_parameters_grow_from_csv() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    let dataset = iris();
    for obs in 0..dataset.nobservations() {
        let row = dataset.observation(obs);
        writeln!(
            file,
            "{},{},{},{},{}",
            row[0],
            row[1],
            dataset.label(obs),
            row[2],
            row[3]
        )?;
    }
    file.flush()?;

    let path = file.path().to_string_lossy().into_owned();
    let forest = ForestParams::new()
        .set_parameter("forestType", "binnedBaseRerF")?
        .set_parameter("CSVFileName", path)?
        .set_parameter("columnWithY", 2)?
        .set_parameter("numTreesInForest", 10)?
        .set_parameter("numTreeBins", 2)?
        .set_parameter("seed", SEED)?
        .set_parameter("useRowMajor", false)?
        .fit_csv()?;

    assert_eq!(forest.forest_type(), ForestType::BinnedRerF);
    assert_eq!(forest.num_features(), 4);
    assert_eq!(forest.predict_class(&[5.1, 3.5, 1.4, 0.2])?, 0);
    Ok(())
}

#[test]
fn unknown_forest_type_is_rejected() {
    let res = ForestParams::new().set_parameter("forestType", "gradientBoosted");
    assert!(matches!(res, Err(Error::UnimplementedForestType(_))));

    let res = ForestParams::new().set_parameter("numLeaves", 3);
    assert!(matches!(res, Err(Error::UnknownParameter(_))));
}
