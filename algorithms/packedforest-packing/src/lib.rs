//!
//! # Packed forests
//! `packedforest-packing` repacks grown forests into bins laid out for fast inference.
//!
//! ## The big picture
//!
//! Predicting with a forest stored tree by tree chases one pointer per level per tree, and every
//! chase is likely a cache miss. A packed bin puts several trees into one flat array:
//!
//! * the top levels of all trees are interleaved level by level, so the entries needed in the
//!   same traversal round are neighbours
//! * below that each subtree is stored depth first, the child that saw more training
//!   observations right after its parent
//! * leaves are not stored at all, a child index past the internal nodes names the class
//!
//! The trees of a bin are then walked in lockstep. Every round advances each tree by one level
//! and hints the memory of its next entry while the other trees are being advanced.
//!
//! ## Current state
//!
//! Forests of independent trees splitting on single features (`rfBase`) can be packed with
//! [`PackingParams`], stored with [`PackedForest::save`] and loaded with [`PackedForest::load`].
//!
//! ```rust
//! use packedforest::prelude::*;
//! use packedforest_packing::{PackedForest, PackingParams};
//! use packedforest_trees::ForestParams;
//!
//! let dataset = packedforest_datasets::iris();
//! let forest = ForestParams::new().num_trees(8).seed(2).fit(&dataset)?;
//! let packed = PackingParams::new().num_bins(2).fit(&forest)?;
//!
//! let mut bytes = Vec::new();
//! packed.write_to(&mut bytes)?;
//! let loaded = PackedForest::read_from(&mut bytes.as_slice())?;
//! assert_eq!(loaded, packed);
//! # Ok::<(), packedforest::error::Error>(())
//! ```

mod forest;
mod hyperparams;
mod node;
mod tree_bin;

pub use forest::{PackedForest, FOREST_HEADER_SIZE};
pub use hyperparams::{PackingParams, PackingValidParams};
pub use node::{PackedNode, RECORD_SIZE};
pub use tree_bin::{PackedBin, BIN_HEADER_SIZE};
