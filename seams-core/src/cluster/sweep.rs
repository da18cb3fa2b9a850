//! Exhaustive sweep over signal blends and cluster counts.
//!
//! Every blend yields one dendrogram, cut at each cluster count from 3 up
//! to [`max_clusters`]. Blends run in parallel; a failing combination is
//! recorded and its siblings carry on.

// Pondered complexity divides two complexities.
#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::cut::{CutSpec, max_clusters};
use super::linkage::{Dendrogram, Linkage};
use crate::config::{DecomposeSection, ScoringSection};
use crate::error::{DecomposeError, SeamsError};
use crate::progress::ProgressReporter;
use crate::score::{ComplexityNormalization, Scorer, team_size_reduction};
use crate::similarity::{SignalMode, SignalSet, Weights, weight_combinations};
use crate::types::{AccessTraces, Decomposition};

/// Smallest cluster count a sweep tries.
pub const MIN_SWEEP_CLUSTERS: usize = 3;

/// Sweep settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepParams {
    pub mode: SignalMode,
    pub linkage: Linkage,
    pub weight_interval: u32,
    pub min_entities: usize,
    pub normalization: ComplexityNormalization,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self::from_config(&DecomposeSection::default(), &ScoringSection::default())
    }
}

impl SweepParams {
    pub fn from_config(decompose: &DecomposeSection, scoring: &ScoringSection) -> Self {
        Self {
            mode: decompose.mode,
            linkage: decompose.linkage,
            weight_interval: decompose.weight_interval,
            min_entities: decompose.min_entities,
            normalization: scoring.normalization,
        }
    }
}

/// Parameters that fully determine one decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SweepKey {
    pub weights: Weights,
    pub linkage: Linkage,
    pub clusters: usize,
}

impl fmt::Display for SweepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "weights={} linkage={} n={}",
            self.weights, self.linkage, self.clusters
        )
    }
}

/// Decompositions already computed, keyed by their parameters. Shared by
/// every worker of a sweep and reusable across sweeps over the same
/// signals.
#[derive(Debug, Default)]
pub struct DecompositionCache {
    entries: Mutex<HashMap<SweepKey, Arc<Decomposition>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecompositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SweepKey) -> Option<Arc<Decomposition>> {
        self.entries
            .lock()
            .expect("decomposition cache mutex poisoned")
            .get(key)
            .cloned()
    }

    /// Return the cached decomposition for `key`, computing it with `make`
    /// on a miss. The lock is not held while `make` runs.
    pub fn get_or_try_insert(
        &self,
        key: SweepKey,
        make: impl FnOnce() -> Result<Decomposition, DecomposeError>,
    ) -> Result<Arc<Decomposition>, DecomposeError> {
        if let Some(found) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let made = Arc::new(make()?);
        let mut entries = self.entries.lock().expect("decomposition cache mutex poisoned");
        Ok(Arc::clone(entries.entry(key).or_insert(made)))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("decomposition cache mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// One scored point of the sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub key: SweepKey,
    pub decomposition: Arc<Decomposition>,
    pub complexity: f64,
    /// Complexity relative to the singleton decomposition.
    pub pondered_complexity: f64,
    pub tsr: f64,
}

#[derive(Debug)]
pub struct SweepReport {
    pub mode: SignalMode,
    pub entities: usize,
    /// Complexity of every entity in its own cluster.
    pub singleton_complexity: f64,
    /// In enumeration order: blends first, then cluster count.
    pub outcomes: Vec<SweepOutcome>,
    pub errors: Vec<(String, SeamsError)>,
    pub duration: Duration,
}

impl SweepReport {
    /// Lowest-complexity outcome for every cluster count. Ties keep the
    /// earliest outcome.
    pub fn best_per_cluster_count(&self) -> BTreeMap<usize, &SweepOutcome> {
        let mut best: BTreeMap<usize, &SweepOutcome> = BTreeMap::new();
        for outcome in &self.outcomes {
            best.entry(outcome.key.clusters)
                .and_modify(|current| {
                    if outcome.complexity < current.complexity {
                        *current = outcome;
                    }
                })
                .or_insert(outcome);
        }
        best
    }

    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Sweep every blend of `params.mode`'s signals.
///
/// Fails as a whole only when the entity set is too small or the traces
/// cannot be scored at all (the singleton decomposition fails).
#[instrument(skip_all, name = "sweep", fields(mode = params.mode.as_str()))]
pub fn sweep(
    signals: &SignalSet,
    traces: &AccessTraces,
    authors: &BTreeMap<String, Vec<String>>,
    params: &SweepParams,
    cache: &DecompositionCache,
    progress: &dyn ProgressReporter,
) -> Result<SweepReport, SeamsError> {
    let start = Instant::now();
    let entities = signals.entities();
    if entities.len() < params.min_entities {
        return Err(DecomposeError::TooFewEntities {
            found: entities.len(),
            required: params.min_entities,
        }
        .into());
    }

    let scorer = Scorer::new(params.normalization);
    let singleton = Decomposition::singletons(entities.iter().map(String::as_str));
    let singleton_complexity = scorer.score(&singleton, traces)?.complexity;

    let blends = weight_combinations(params.mode.signals(), params.weight_interval);
    let top = max_clusters(entities.len()).min(entities.len());
    info!(
        entities = entities.len(),
        blends = blends.len(),
        max_clusters = top,
        singleton_complexity,
        "Starting sweep"
    );

    progress.start("Sweeping blends", Some(blends.len() as u64));
    let ctx = BlendContext {
        signals,
        traces,
        authors,
        params,
        cache,
        scorer,
        singleton_complexity,
        top,
    };
    let per_blend: Vec<Vec<Result<SweepOutcome, (String, SeamsError)>>> = blends
        .par_iter()
        .map(|weights| {
            let results = ctx.run(*weights);
            progress.advance(1);
            results
        })
        .collect();
    progress.finish();

    let mut outcomes = Vec::new();
    let mut errors = Vec::new();
    for result in per_blend.into_iter().flatten() {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err((label, e)) => {
                warn!(combination = %label, error = %e, "Sweep combination failed");
                errors.push((label, e));
            }
        }
    }

    let duration = start.elapsed();
    info!(
        outcomes = outcomes.len(),
        errors = errors.len(),
        cache_hits = cache.hits(),
        duration = ?duration,
        "Sweep complete"
    );
    Ok(SweepReport {
        mode: params.mode,
        entities: entities.len(),
        singleton_complexity,
        outcomes,
        errors,
        duration,
    })
}

/// Read-only inputs shared by every blend.
struct BlendContext<'a> {
    signals: &'a SignalSet,
    traces: &'a AccessTraces,
    authors: &'a BTreeMap<String, Vec<String>>,
    params: &'a SweepParams,
    cache: &'a DecompositionCache,
    scorer: Scorer,
    singleton_complexity: f64,
    top: usize,
}

impl BlendContext<'_> {
    fn run(&self, weights: Weights) -> Vec<Result<SweepOutcome, (String, SeamsError)>> {
        let mut tree: Option<Dendrogram> = None;
        (MIN_SWEEP_CLUSTERS..=self.top)
            .map(|clusters| {
                let key = SweepKey {
                    weights,
                    linkage: self.params.linkage,
                    clusters,
                };
                self.outcome(key, &mut tree)
                    .map_err(|e| (key.to_string(), e))
            })
            .collect()
    }

    fn outcome(
        &self,
        key: SweepKey,
        tree: &mut Option<Dendrogram>,
    ) -> Result<SweepOutcome, SeamsError> {
        let decomposition = self.cache.get_or_try_insert(key, || {
            if tree.is_none() {
                let matrix = self.signals.blend(&key.weights)?;
                *tree = Some(Dendrogram::build(
                    &matrix,
                    key.linkage,
                    self.params.min_entities,
                )?);
            }
            match tree.as_ref() {
                Some(t) => t.cut(CutSpec::Clusters(key.clusters)),
                None => Err(DecomposeError::InvalidCut("no dendrogram".into())),
            }
        })?;

        let complexity = self.scorer.score(&decomposition, self.traces)?.complexity;
        let pondered_complexity = if self.singleton_complexity > 0.0 {
            complexity / self.singleton_complexity
        } else {
            0.0
        };
        Ok(SweepOutcome {
            key,
            tsr: team_size_reduction(&decomposition, self.authors),
            decomposition,
            complexity,
            pondered_complexity,
        })
    }
}
