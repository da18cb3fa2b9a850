//! Time-windowed logical coupling.
//!
//! The timeline is cut into fixed-width buckets measured from its earliest
//! record. Every unordered pair of distinct files inside one bucket gains
//! one unit of weight, so a pair can gain at most one unit per bucket no
//! matter how many commits touched it there.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::history::Timeline;

/// One unordered file pair and its co-change count. `first < second`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouplingPair {
    pub first: String,
    pub second: String,
    pub weight: u32,
}

/// Symmetric co-change counts over every file seen in the timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CouplingMatrix {
    files: BTreeSet<String>,
    weights: BTreeMap<(String, String), u32>,
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

impl CouplingMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: &str) {
        if !self.files.contains(file) {
            self.files.insert(file.to_string());
        }
    }

    /// Add `by` to the weight of `{a, b}`. Self pairs are ignored.
    pub fn increment(&mut self, a: &str, b: &str, by: u32) {
        if a == b {
            return;
        }
        self.add_file(a);
        self.add_file(b);
        let (x, y) = ordered(a, b);
        *self
            .weights
            .entry((x.to_string(), y.to_string()))
            .or_default() += by;
    }

    /// Weight of `{a, b}`; 0 for pairs never seen together.
    pub fn weight(&self, a: &str, b: &str) -> u32 {
        let (x, y) = ordered(a, b);
        self.weights
            .get(&(x.to_string(), y.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn pair_count(&self) -> usize {
        self.weights.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = CouplingPair> + '_ {
        self.weights.iter().map(|((a, b), w)| CouplingPair {
            first: a.clone(),
            second: b.clone(),
            weight: *w,
        })
    }

    /// Largest pair weight, 0 when there are no pairs.
    pub fn max_weight(&self) -> u32 {
        self.weights.values().copied().max().unwrap_or(0)
    }

    /// Keep only files passing `keep`, and pairs between them.
    #[must_use]
    pub fn restrict_to(&self, mut keep: impl FnMut(&str) -> bool) -> Self {
        let files: BTreeSet<String> = self.files.iter().filter(|f| keep(f)).cloned().collect();
        let weights = self
            .weights
            .iter()
            .filter(|((a, b), _)| files.contains(a) && files.contains(b))
            .map(|(k, w)| (k.clone(), *w))
            .collect();
        Self { files, weights }
    }

    /// `file → partners`, each partner listed once per unit of weight.
    /// Files without partners map to an empty list.
    pub fn to_adjacency(&self) -> BTreeMap<String, Vec<String>> {
        let mut adjacency: BTreeMap<String, Vec<String>> = self
            .files
            .iter()
            .map(|f| (f.clone(), Vec::new()))
            .collect();
        for ((a, b), w) in &self.weights {
            for _ in 0..*w {
                if let Some(list) = adjacency.get_mut(a) {
                    list.push(b.clone());
                }
                if let Some(list) = adjacency.get_mut(b) {
                    list.push(a.clone());
                }
            }
        }
        for list in adjacency.values_mut() {
            list.sort();
        }
        adjacency
    }

    /// Inverse of [`to_adjacency`](Self::to_adjacency). If the two sides of
    /// a pair disagree, the larger count wins.
    pub fn from_adjacency(adjacency: &BTreeMap<String, Vec<String>>) -> Self {
        let mut counts: BTreeMap<(String, String), u32> = BTreeMap::new();
        let mut files = BTreeSet::new();
        for (file, partners) in adjacency {
            files.insert(file.clone());
            let mut per_partner: BTreeMap<&str, u32> = BTreeMap::new();
            for p in partners {
                if p != file {
                    *per_partner.entry(p).or_default() += 1;
                }
            }
            for (p, n) in per_partner {
                files.insert(p.to_string());
                let (x, y) = ordered(file, p);
                let entry = counts.entry((x.to_string(), y.to_string())).or_default();
                *entry = (*entry).max(n);
            }
        }
        Self {
            files,
            weights: counts,
        }
    }
}

/// Count co-changes per time bucket of `window_seconds`.
#[instrument(skip_all, name = "aggregate", fields(window_seconds = window_seconds))]
pub fn aggregate(timeline: &Timeline, window_seconds: i64) -> CouplingMatrix {
    let mut matrix = CouplingMatrix::new();
    for file in timeline.files() {
        matrix.add_file(file);
    }
    let Some((start, _)) = timeline.span() else {
        return matrix;
    };
    let window = if window_seconds > 0 {
        window_seconds
    } else {
        warn!(window_seconds, "Non-positive window, using 1s buckets");
        1
    };

    let mut buckets: BTreeMap<i64, BTreeSet<&str>> = BTreeMap::new();
    for record in timeline.records() {
        let offset = (record.timestamp - start).num_seconds();
        buckets
            .entry(offset.div_euclid(window))
            .or_default()
            .insert(record.path());
    }
    debug!(buckets = buckets.len(), "Bucketed timeline");

    for files in buckets.values().filter(|f| f.len() >= 2) {
        let files: Vec<&str> = files.iter().copied().collect();
        for (i, a) in files.iter().enumerate() {
            for b in &files[i + 1..] {
                matrix.increment(a, b, 1);
            }
        }
    }

    info!(
        files = matrix.file_count(),
        pairs = matrix.pair_count(),
        "Aggregated coupling"
    );
    matrix
}
