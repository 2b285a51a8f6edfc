use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use packedforest::benchmarks::config;
use packedforest::prelude::*;
use packedforest_datasets::generate;
use packedforest_trees::{ForestParams, ForestType};
use rand::rngs::SmallRng;

fn forest_growth_bench(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(42);

    // Controls how many observations for each class are generated
    let training_set_sizes = &[100, 1000, 10000];

    let n_classes = 4;
    let n_features = 8;

    let mut group = c.benchmark_group("forest_growth");
    config::set_training_benchmark_configs(&mut group);

    for n in training_set_sizes.iter() {
        let centroids =
            Array2::random_using((n_classes, n_features), Uniform::new(-30., 30.), &mut rng);
        let dataset = generate::blobs(*n, &centroids, &mut rng);

        for forest_type in [ForestType::RfBase, ForestType::RerF, ForestType::BinnedBase] {
            let params = ForestParams::new()
                .forest_type(forest_type)
                .num_trees(64)
                .seed(42);

            group.bench_with_input(
                BenchmarkId::new(forest_type.name(), n),
                &dataset,
                |b, d| b.iter(|| params.fit(d)),
            );
        }
    }

    group.finish();
}

fn prediction_bench(c: &mut Criterion) {
    let dataset = packedforest_datasets::iris();
    let mut group = c.benchmark_group("forest_prediction");
    config::set_prediction_benchmark_configs(&mut group);

    for forest_type in [ForestType::RfBase, ForestType::BinnedBase] {
        let forest = ForestParams::new()
            .forest_type(forest_type)
            .num_trees(128)
            .seed(42)
            .fit(&dataset)
            .unwrap();
        let records = dataset.records().to_owned();

        group.bench_function(forest_type.name(), |b| b.iter(|| forest.predict(&records)));
    }

    group.finish();
}

#[cfg(not(target_os = "windows"))]
criterion_group! {
    name = benches;
    config = config::get_default_profiling_configs();
    targets = forest_growth_bench, prediction_bench
}
#[cfg(target_os = "windows")]
criterion_group!(benches, forest_growth_bench, prediction_bench);

criterion_main!(benches);
