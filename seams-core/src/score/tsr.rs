#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ClusterId, Decomposition};

/// Team-size reduction: mean distinct authors per cluster over distinct
/// authors overall. Lower means smaller teams per service. 0 when no
/// authors are known.
pub fn team_size_reduction(
    decomposition: &Decomposition,
    authors: &BTreeMap<String, Vec<String>>,
) -> f64 {
    let total: BTreeSet<&str> = authors.values().flatten().map(String::as_str).collect();
    let clusters = decomposition.cluster_count();
    if total.is_empty() || clusters == 0 {
        return 0.0;
    }

    let mut per_cluster: BTreeMap<ClusterId, BTreeSet<&str>> = BTreeMap::new();
    for (entity, cluster) in decomposition.assignment() {
        let set = per_cluster.entry(*cluster).or_default();
        if let Some(names) = authors.get(entity) {
            set.extend(names.iter().map(String::as_str));
        }
    }

    let sum: usize = per_cluster.values().map(BTreeSet::len).sum();
    let mean = sum as f64 / clusters as f64;
    mean / total.len() as f64
}
