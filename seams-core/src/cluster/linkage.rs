// Cluster sizes feed Lance-Williams coefficients as f64.
#![allow(clippy::cast_precision_loss)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::DecomposeError;
use crate::similarity::SimilarityMatrix;

/// Agglomerative linkage criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Single,
    Complete,
    Average,
    Weighted,
    Ward,
}

impl Linkage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Complete => "complete",
            Self::Average => "average",
            Self::Weighted => "weighted",
            Self::Ward => "ward",
        }
    }

    /// Distance from the union of `i` and `j` to `k`.
    fn update(self, d_ik: f64, d_jk: f64, d_ij: f64, n_i: usize, n_j: usize, n_k: usize) -> f64 {
        let (ni, nj, nk) = (n_i as f64, n_j as f64, n_k as f64);
        match self {
            Self::Single => d_ik.min(d_jk),
            Self::Complete => d_ik.max(d_jk),
            Self::Average => (ni * d_ik + nj * d_jk) / (ni + nj),
            Self::Weighted => 0.5 * (d_ik + d_jk),
            Self::Ward => {
                let t = ni + nj + nk;
                (((ni + nk) * d_ik * d_ik + (nj + nk) * d_jk * d_jk - nk * d_ij * d_ij) / t)
                    .max(0.0)
                    .sqrt()
            }
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Linkage {
    type Err = DecomposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "complete" => Ok(Self::Complete),
            "average" => Ok(Self::Average),
            "weighted" => Ok(Self::Weighted),
            "ward" => Ok(Self::Ward),
            _ => Err(DecomposeError::UnknownLinkage(s.to_string())),
        }
    }
}

/// One merge step. Leaves are `0..n`; the cluster created by merge `k`
/// has id `n + k`. `left < right`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// Full merge tree over a similarity matrix's entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    entities: Vec<String>,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Cluster `1 - similarity` distances. Fails before doing any work when
    /// the matrix has fewer than `min_entities` entities.
    ///
    /// Among equal distances the pair with the lowest indices merges first.
    /// A merged cluster takes the slot of its lower member, so the slot
    /// index is always the smallest original index inside the cluster.
    #[instrument(skip_all, name = "linkage", fields(method = %linkage, n = matrix.len()))]
    pub fn build(
        matrix: &SimilarityMatrix,
        linkage: Linkage,
        min_entities: usize,
    ) -> Result<Self, DecomposeError> {
        let n = matrix.len();
        if n < min_entities {
            return Err(DecomposeError::TooFewEntities {
                found: n,
                required: min_entities,
            });
        }

        let mut dist = vec![0.0f64; n * n];
        for i in 0..n {
            for j in 0..n {
                dist[i * n + j] = matrix.distance(i, j);
            }
        }
        let mut active = vec![true; n];
        let mut size = vec![1usize; n];
        let mut id: Vec<usize> = (0..n).collect();
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for step in 0..n.saturating_sub(1) {
            let mut best: Option<(usize, usize, f64)> = None;
            for i in (0..n).filter(|i| active[*i]) {
                for j in (i + 1..n).filter(|j| active[*j]) {
                    let d = dist[i * n + j];
                    if best.is_none_or(|(_, _, b)| d < b) {
                        best = Some((i, j, d));
                    }
                }
            }
            let Some((i, j, d_ij)) = best else {
                break;
            };

            for k in (0..n).filter(|k| active[*k] && *k != i && *k != j) {
                let d = linkage.update(
                    dist[i * n + k],
                    dist[j * n + k],
                    d_ij,
                    size[i],
                    size[j],
                    size[k],
                );
                dist[i * n + k] = d;
                dist[k * n + i] = d;
            }

            let (a, b) = (id[i].min(id[j]), id[i].max(id[j]));
            size[i] += size[j];
            active[j] = false;
            id[i] = n + step;
            merges.push(Merge {
                left: a,
                right: b,
                distance: d_ij,
                size: size[i],
            });
        }

        debug!(merges = merges.len(), "Built dendrogram");
        Ok(Self {
            entities: matrix.entities().to_vec(),
            merges,
        })
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn leaf_count(&self) -> usize {
        self.entities.len()
    }
}
