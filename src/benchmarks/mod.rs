//! Shared criterion configuration for the benches of every crate in the workspace
#[cfg(feature = "benchmarks")]
pub mod config {
    use criterion::{measurement::WallTime, BenchmarkGroup, Criterion};
    #[cfg(not(target_os = "windows"))]
    use pprof::criterion::{Output, PProfProfiler};
    use std::time::Duration;

    /// Criterion with a flamegraph profiler attached
    #[cfg(not(target_os = "windows"))]
    pub fn get_default_profiling_configs() -> Criterion {
        Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
    }

    /// Few, long samples for benches that grow whole forests
    pub fn set_training_benchmark_configs(benchmark: &mut BenchmarkGroup<WallTime>) {
        benchmark
            .sample_size(20)
            .measurement_time(Duration::new(20, 0))
            .confidence_level(0.95)
            .warm_up_time(Duration::new(5, 0))
            .noise_threshold(0.05);
    }

    /// Many short samples for prediction throughput
    pub fn set_prediction_benchmark_configs(benchmark: &mut BenchmarkGroup<WallTime>) {
        benchmark
            .sample_size(200)
            .measurement_time(Duration::new(10, 0))
            .confidence_level(0.97)
            .warm_up_time(Duration::new(5, 0))
            .noise_threshold(0.02);
    }
}
