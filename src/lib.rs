//! `packedforest` is the shared foundation of a family of crates growing randomized decision
//! forests and serving them from a cache friendly packed layout.
//!
//! ## The big picture
//!
//! Random forests and "randomer forests" (RerF, splitting on random sparse linear combinations
//! of features) are grown in place: every tree owns one buffer of observation indices which is
//! partitioned as nodes are split, so growth never copies data. Grown forests can be repacked
//! into bins which interleave the top levels of many trees breadth first, and predicted with a
//! level synchronous traversal that prefetches the next node of every tree in the batch.
//!
//! This crate holds the pieces every algorithm crate shares:
//!
//! * [`Dataset`], the immutable observation matrix with class labels, and its CSV loader
//! * the [`error`] type and the [`ParamGuard`] hyperparameter checking pattern
//! * the [`Fit`](traits::Fit) and [`Predict`](traits::Predict) traits
//! * [`Mwc`], the seeded multiply-with-carry generator which makes growth reproducible
//! * the [`prefetch`] hint layer
//!
//! The tree growing engine lives in `packedforest-trees`, the bin packer and prefetching
//! predictor in `packedforest-packing`.
//!

pub mod benchmarks;
pub mod dataset;
pub mod error;
mod param_guard;
pub mod prefetch;
pub mod prelude;
pub mod rng;
pub mod traits;

pub use dataset::{Dataset, Feature, Layout};
pub use param_guard::ParamGuard;
pub use rng::Mwc;
