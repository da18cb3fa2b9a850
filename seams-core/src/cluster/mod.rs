//! Hierarchical clustering: linkage, cuts, and parameter sweeps.

pub mod cut;
pub mod linkage;
pub mod sweep;

pub use cut::{CutSpec, max_clusters};
pub use linkage::{Dendrogram, Linkage, Merge};
pub use sweep::{DecompositionCache, SweepKey, SweepOutcome, SweepParams, SweepReport, sweep};

use crate::error::DecomposeError;
use crate::similarity::SimilarityMatrix;
use crate::types::Decomposition;

/// Fewer entities than this cannot be meaningfully clustered.
pub const MIN_ENTITIES: usize = 4;

/// Cluster `matrix` with `linkage` and cut the tree with `cut`.
pub fn generate(
    matrix: &SimilarityMatrix,
    linkage: Linkage,
    cut: CutSpec,
) -> Result<Decomposition, DecomposeError> {
    Dendrogram::build(matrix, linkage, MIN_ENTITIES)?.cut(cut)
}
