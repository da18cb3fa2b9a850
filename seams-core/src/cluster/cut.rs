use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::linkage::Dendrogram;
use crate::error::DecomposeError;
use crate::types::{ClusterId, Decomposition};

/// How to turn a dendrogram into flat clusters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutSpec {
    /// Exactly this many clusters.
    Clusters(usize),
    /// Merge everything joined at or below this distance.
    Threshold(f64),
}

impl std::fmt::Display for CutSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clusters(n) => write!(f, "n={n}"),
            Self::Threshold(t) => write!(f, "t={t}"),
        }
    }
}

/// Largest cluster count worth sweeping for `entities` entities.
pub fn max_clusters(entities: usize) -> usize {
    if entities < 25 {
        3
    } else if entities < 100 {
        5
    } else {
        10
    }
}

impl Dendrogram {
    /// Flat clusters for `cut`. Cluster ids are numbered in order of each
    /// cluster's first entity.
    pub fn cut(&self, cut: CutSpec) -> Result<Decomposition, DecomposeError> {
        let n = self.leaf_count();
        let applied = match cut {
            CutSpec::Clusters(k) => {
                if k == 0 || k > n {
                    return Err(DecomposeError::InvalidCut(format!(
                        "cannot cut {n} entities into {k} clusters"
                    )));
                }
                n - k
            }
            CutSpec::Threshold(t) => {
                if t.is_nan() || t < 0.0 {
                    return Err(DecomposeError::InvalidCut(format!(
                        "distance threshold must be non-negative, got {t}"
                    )));
                }
                self.merges()
                    .iter()
                    .take_while(|m| m.distance <= t)
                    .count()
            }
        };

        // Union-find over leaves and merge nodes.
        let mut parent: Vec<usize> = (0..n + applied).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for (step, merge) in self.merges().iter().take(applied).enumerate() {
            let node = n + step;
            let a = find(&mut parent, merge.left);
            let b = find(&mut parent, merge.right);
            parent[a] = node;
            parent[b] = node;
        }

        let mut ids: HashMap<usize, ClusterId> = HashMap::new();
        let mut pairs = Vec::with_capacity(n);
        for (leaf, entity) in self.entities().iter().enumerate() {
            let root = find(&mut parent, leaf);
            let next = ClusterId(u32::try_from(ids.len()).unwrap_or(u32::MAX));
            let cluster = *ids.entry(root).or_insert(next);
            pairs.push((entity.clone(), cluster));
        }
        Decomposition::from_assignment(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Linkage;
    use crate::similarity::SimilarityMatrix;

    fn dendrogram() -> Dendrogram {
        let s = [
            [1.0, 0.9, 0.1, 0.1, 0.3],
            [0.9, 1.0, 0.1, 0.1, 0.3],
            [0.1, 0.1, 1.0, 0.8, 0.2],
            [0.1, 0.1, 0.8, 1.0, 0.2],
            [0.3, 0.3, 0.2, 0.2, 1.0],
        ];
        let m = SimilarityMatrix::new(
            ["a", "b", "c", "d", "e"].iter().map(|s| (*s).to_string()).collect(),
            s.iter().flatten().copied().collect(),
        )
        .unwrap();
        Dendrogram::build(&m, Linkage::Average, 4).unwrap()
    }

    #[test]
    fn fixed_count_cut() {
        let d = dendrogram().cut(CutSpec::Clusters(3)).unwrap();
        assert_eq!(d.cluster_count(), 3);
        assert_eq!(d.cluster_of("a"), Some(ClusterId(0)));
        assert_eq!(d.cluster_of("b"), Some(ClusterId(0)));
        assert_eq!(d.cluster_of("c"), Some(ClusterId(1)));
        assert_eq!(d.cluster_of("d"), Some(ClusterId(1)));
        assert_eq!(d.cluster_of("e"), Some(ClusterId(2)));
    }

    #[test]
    fn threshold_cut() {
        let d = dendrogram();
        assert_eq!(d.cut(CutSpec::Threshold(0.0)).unwrap().cluster_count(), 5);
        assert_eq!(d.cut(CutSpec::Threshold(0.15)).unwrap().cluster_count(), 4);
        assert_eq!(d.cut(CutSpec::Threshold(0.75)).unwrap().cluster_count(), 2);
        assert_eq!(d.cut(CutSpec::Threshold(1.0)).unwrap().cluster_count(), 1);
    }

    #[test]
    fn invalid_cuts_are_rejected() {
        let d = dendrogram();
        assert!(d.cut(CutSpec::Clusters(0)).is_err());
        assert!(d.cut(CutSpec::Clusters(6)).is_err());
        assert!(d.cut(CutSpec::Threshold(-1.0)).is_err());
        assert!(d.cut(CutSpec::Threshold(f64::NAN)).is_err());
    }

    #[test]
    fn max_clusters_scales_with_size() {
        assert_eq!(max_clusters(4), 3);
        assert_eq!(max_clusters(24), 3);
        assert_eq!(max_clusters(25), 5);
        assert_eq!(max_clusters(99), 5);
        assert_eq!(max_clusters(100), 10);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_matrix() -> impl Strategy<Value = SimilarityMatrix> {
            (4usize..12).prop_flat_map(|n| {
                prop::collection::vec(0u8..=10, n * n).prop_map(move |raw| {
                    let mut values = vec![0.0; n * n];
                    for i in 0..n {
                        for j in 0..n {
                            let (a, b) = (i.min(j), i.max(j));
                            values[i * n + j] = f64::from(raw[a * n + b]) / 10.0;
                        }
                    }
                    SimilarityMatrix::new((0..n).map(|i| format!("e{i:02}")).collect(), values)
                        .unwrap()
                })
            })
        }

        fn arb_linkage() -> impl Strategy<Value = Linkage> {
            prop::sample::select(vec![
                Linkage::Single,
                Linkage::Complete,
                Linkage::Average,
                Linkage::Weighted,
                Linkage::Ward,
            ])
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn every_entity_gets_exactly_one_cluster(m in arb_matrix(), linkage in arb_linkage(), k in 1usize..4) {
                let d = Dendrogram::build(&m, linkage, 4).unwrap().cut(CutSpec::Clusters(k)).unwrap();
                prop_assert_eq!(d.entity_count(), m.len());
                prop_assert_eq!(d.cluster_count(), k);
                let members: usize = d.clusters().values().map(Vec::len).sum();
                prop_assert_eq!(members, m.len());
                for e in m.entities() {
                    prop_assert!(d.cluster_of(e).is_some());
                }
            }

            #[test]
            fn coarser_cuts_are_unions_of_finer_cuts(m in arb_matrix(), linkage in arb_linkage()) {
                let tree = Dendrogram::build(&m, linkage, 4).unwrap();
                let fine = tree.cut(CutSpec::Clusters(m.len().min(5))).unwrap();
                let coarse = tree.cut(CutSpec::Clusters(3)).unwrap();
                for a in m.entities() {
                    for b in m.entities() {
                        if fine.cluster_of(a) == fine.cluster_of(b) {
                            prop_assert_eq!(coarse.cluster_of(a), coarse.cluster_of(b));
                        }
                    }
                }
            }

            #[test]
            fn clustering_is_deterministic(m in arb_matrix(), linkage in arb_linkage()) {
                let first = Dendrogram::build(&m, linkage, 4).unwrap();
                let second = Dendrogram::build(&m, linkage, 4).unwrap();
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(
                    first.cut(CutSpec::Clusters(3)).unwrap(),
                    second.cut(CutSpec::Clusters(3)).unwrap()
                );
            }
        }
    }
}
