//! Transactional complexity of a decomposition against access traces.
//!
//! Each trace is split into local transactions: maximal runs of accesses
//! that stay in one cluster. Inside a local transaction only the first
//! access to an entity, or a write following reads of it, carries cost.
//! A trace's profile is the set of modes of its cost-bearing accesses per
//! entity.
//!
//! A cost-bearing access conflicts with another trace when that trace spans
//! more than one cluster and its profile for the same entity holds the
//! opposite mode. Each local transaction costs the number of distinct
//! conflicting traces over its cost-bearing accesses.

// Complexity is a mean of integer costs.
#![allow(clippy::cast_precision_loss)]

pub mod tsr;

pub use tsr::team_size_reduction;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ScoreError;
use crate::types::{Access, AccessMode, AccessTrace, AccessTraces, ClusterId, Decomposition};

/// What the summed cost is divided by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplexityNormalization {
    /// Every trace with at least one access. The singleton decomposition
    /// is guaranteed to score highest under this choice.
    #[default]
    AllTraces,
    /// Only traces spanning more than one cluster.
    MultiClusterTraces,
    /// Number of clusters in the decomposition.
    Clusters,
}

impl std::str::FromStr for ComplexityNormalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-traces" => Ok(Self::AllTraces),
            "multi-cluster-traces" => Ok(Self::MultiClusterTraces),
            "clusters" => Ok(Self::Clusters),
            other => Err(format!("unknown normalization {other:?}")),
        }
    }
}

/// A maximal same-cluster run of one trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTransaction {
    pub cluster: ClusterId,
    /// Distinct cost-bearing accesses, in first-seen order.
    pub costly: Vec<Access>,
}

/// Modes seen for one entity among a trace's cost-bearing accesses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ModeSet {
    read: bool,
    write: bool,
}

impl ModeSet {
    fn add(&mut self, mode: AccessMode) {
        match mode {
            AccessMode::Read => self.read = true,
            AccessMode::Write => self.write = true,
        }
    }

    /// Whether this profile differs from a single `mode`.
    fn conflicts_with(self, mode: AccessMode) -> bool {
        match mode {
            AccessMode::Read => self.write,
            AccessMode::Write => self.read,
        }
    }
}

/// Per-trace result of the first pass.
#[derive(Debug)]
struct TraceShape {
    transactions: Vec<LocalTransaction>,
    profile: BTreeMap<String, ModeSet>,
    clusters: BTreeSet<ClusterId>,
}

/// Split `trace` into local transactions under `decomposition`.
pub fn local_transactions(
    name: &str,
    trace: &AccessTrace,
    decomposition: &Decomposition,
) -> Result<Vec<LocalTransaction>, ScoreError> {
    shape(name, trace, decomposition).map(|s| s.transactions)
}

fn shape(
    name: &str,
    trace: &AccessTrace,
    decomposition: &Decomposition,
) -> Result<TraceShape, ScoreError> {
    let mut transactions = Vec::new();
    let mut profile: BTreeMap<String, ModeSet> = BTreeMap::new();
    let mut clusters = BTreeSet::new();

    let mut current: Option<LocalTransaction> = None;
    let mut seen: HashMap<&str, AccessMode> = HashMap::new();

    for access in &trace.accesses {
        let cluster = decomposition.cluster_of(&access.entity).ok_or_else(|| {
            ScoreError::UnassignedEntity {
                entity: access.entity.clone(),
                trace: name.to_string(),
            }
        })?;
        clusters.insert(cluster);

        let costly = match current.as_mut() {
            Some(lt) if lt.cluster == cluster => {
                let new_cost = match seen.get(access.entity.as_str()) {
                    None => true,
                    Some(AccessMode::Read) => access.mode == AccessMode::Write,
                    Some(AccessMode::Write) => false,
                };
                if new_cost && !lt.costly.contains(access) {
                    lt.costly.push(access.clone());
                }
                new_cost
            }
            _ => {
                if let Some(done) = current.take() {
                    transactions.push(done);
                }
                current = Some(LocalTransaction {
                    cluster,
                    costly: vec![access.clone()],
                });
                seen.clear();
                true
            }
        };

        if costly {
            seen.insert(access.entity.as_str(), access.mode);
            profile.entry(access.entity.clone()).or_default().add(access.mode);
        }
    }

    if let Some(done) = current.filter(|lt| !lt.costly.is_empty()) {
        transactions.push(done);
    }

    Ok(TraceShape {
        transactions,
        profile,
        clusters,
    })
}

/// Detailed scoring result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub complexity: f64,
    /// Sum of every local transaction's cost.
    pub total_cost: u64,
    /// Traces with at least one access.
    pub traces: usize,
    pub multi_cluster_traces: usize,
    pub clusters: usize,
    /// Cost per trace name; single-cluster traces are 0.
    pub per_trace: BTreeMap<String, u64>,
}

/// Scores decompositions with a fixed normalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    normalization: ComplexityNormalization,
}

impl Scorer {
    pub fn new(normalization: ComplexityNormalization) -> Self {
        Self { normalization }
    }

    pub fn normalization(&self) -> ComplexityNormalization {
        self.normalization
    }

    /// Complexity of `decomposition` over `traces`. Fails if any trace
    /// touches an entity the decomposition does not assign.
    #[instrument(skip_all, name = "score", fields(traces = traces.len()))]
    pub fn score(
        &self,
        decomposition: &Decomposition,
        traces: &AccessTraces,
    ) -> Result<ComplexityScore, ScoreError> {
        let named: Vec<(&String, &AccessTrace)> = traces.iter().collect();

        // Results are checked in trace-name order so the reported missing
        // entity does not depend on scheduling.
        let shapes: Vec<Result<TraceShape, ScoreError>> = named
            .par_iter()
            .map(|(name, trace)| shape(name, trace, decomposition))
            .collect();
        let mut profiled: Vec<(&str, TraceShape)> = Vec::with_capacity(shapes.len());
        for ((name, _), shape) in named.iter().zip(shapes) {
            let shape = shape?;
            if !shape.profile.is_empty() {
                profiled.push((name.as_str(), shape));
            }
        }

        // entity → (trace slot, modes) over multi-cluster traces only.
        let mut by_entity: HashMap<&str, Vec<(usize, ModeSet)>> = HashMap::new();
        for (slot, (_, shape)) in profiled.iter().enumerate() {
            if shape.clusters.len() > 1 {
                for (entity, modes) in &shape.profile {
                    by_entity.entry(entity.as_str()).or_default().push((slot, *modes));
                }
            }
        }

        let costs: Vec<u64> = profiled
            .par_iter()
            .enumerate()
            .map(|(slot, (_, shape))| {
                if shape.clusters.len() <= 1 {
                    return 0;
                }
                let mut cache: HashMap<&Access, Vec<usize>> = HashMap::new();
                let mut cost = 0u64;
                for lt in &shape.transactions {
                    let mut conflicting: BTreeSet<usize> = BTreeSet::new();
                    for access in &lt.costly {
                        let others = cache.entry(access).or_insert_with(|| {
                            by_entity
                                .get(access.entity.as_str())
                                .map(|list| {
                                    list.iter()
                                        .filter(|(other, modes)| {
                                            *other != slot && modes.conflicts_with(access.mode)
                                        })
                                        .map(|(other, _)| *other)
                                        .collect()
                                })
                                .unwrap_or_default()
                        });
                        conflicting.extend(others.iter().copied());
                    }
                    cost += conflicting.len() as u64;
                }
                cost
            })
            .collect();

        let total_cost: u64 = costs.iter().sum();
        let multi_cluster_traces = profiled.iter().filter(|(_, s)| s.clusters.len() > 1).count();
        let clusters = decomposition.cluster_count();
        let denominator = match self.normalization {
            ComplexityNormalization::AllTraces => profiled.len(),
            ComplexityNormalization::MultiClusterTraces => multi_cluster_traces,
            ComplexityNormalization::Clusters => clusters,
        };
        let complexity = if denominator == 0 {
            0.0
        } else {
            total_cost as f64 / denominator as f64
        };

        let mut per_trace: BTreeMap<String, u64> = traces.keys().map(|k| (k.clone(), 0)).collect();
        for ((name, _), cost) in profiled.iter().zip(&costs) {
            per_trace.insert((*name).to_string(), *cost);
        }

        debug!(total_cost, denominator, complexity, "Scored decomposition");
        Ok(ComplexityScore {
            complexity,
            total_cost,
            traces: profiled.len(),
            multi_cluster_traces,
            clusters,
            per_trace,
        })
    }
}

/// Complexity with the default normalization.
pub fn score(decomposition: &Decomposition, traces: &AccessTraces) -> Result<f64, ScoreError> {
    Scorer::default()
        .score(decomposition, traces)
        .map(|s| s.complexity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use AccessMode::{Read as R, Write as W};

    fn trace(accesses: &[(AccessMode, &str)]) -> AccessTrace {
        AccessTrace::new(accesses.iter().map(|(m, e)| Access::new(*m, *e)).collect())
    }

    fn decomposition(clusters: &[&[&str]]) -> Decomposition {
        Decomposition::from_assignment(clusters.iter().enumerate().flat_map(|(i, members)| {
            members
                .iter()
                .map(move |m| ((*m).to_string(), ClusterId(u32::try_from(i).unwrap())))
        }))
        .unwrap()
    }

    fn sample_traces() -> AccessTraces {
        AccessTraces::from([
            (
                "CreateOrder".to_string(),
                trace(&[(R, "Customer"), (W, "Order"), (W, "Item"), (R, "Customer")]),
            ),
            (
                "ViewOrder".to_string(),
                trace(&[(R, "Order"), (R, "Item"), (R, "Customer")]),
            ),
            (
                "EditCustomer".to_string(),
                trace(&[(R, "Customer"), (W, "Customer"), (R, "Address")]),
            ),
            (
                "Checkout".to_string(),
                trace(&[(W, "Customer"), (R, "Order")]),
            ),
        ])
    }

    #[test]
    fn local_transactions_follow_cluster_runs() {
        let d = decomposition(&[&["Customer", "Address"], &["Order", "Item"]]);
        let t = trace(&[
            (R, "Customer"),
            (R, "Customer"),
            (W, "Customer"),
            (W, "Customer"),
            (W, "Order"),
            (R, "Order"),
            (R, "Item"),
            (R, "Address"),
        ]);
        let lts = local_transactions("t", &t, &d).unwrap();
        assert_eq!(lts.len(), 3);
        assert_eq!(lts[0].cluster, ClusterId(0));
        assert_eq!(
            lts[0].costly,
            vec![Access::new(R, "Customer"), Access::new(W, "Customer")]
        );
        assert_eq!(
            lts[1].costly,
            vec![Access::new(W, "Order"), Access::new(R, "Item")]
        );
        assert_eq!(lts[2].costly, vec![Access::new(R, "Address")]);
    }

    #[test]
    fn revisiting_a_cluster_opens_a_new_transaction() {
        let d = decomposition(&[&["A"], &["B"]]);
        let t = trace(&[(R, "A"), (R, "B"), (R, "A")]);
        let lts = local_transactions("t", &t, &d).unwrap();
        assert_eq!(lts.len(), 3);
        assert_eq!(lts[2].costly, vec![Access::new(R, "A")]);
    }

    #[test]
    fn single_cluster_scores_zero() {
        let traces = sample_traces();
        let d = decomposition(&[&["Customer", "Order", "Item", "Address"]]);
        let s = Scorer::default().score(&d, &traces).unwrap();
        assert!(s.complexity.abs() < f64::EPSILON);
        assert_eq!(s.multi_cluster_traces, 0);
        assert_eq!(s.traces, 4);
    }

    #[test]
    fn conflicts_count_distinct_traces_per_transaction() {
        let traces = sample_traces();
        let d = decomposition(&[&["Customer", "Address"], &["Order", "Item"]]);
        let s = Scorer::default().score(&d, &traces).unwrap();

        // Checkout: [W Customer] [R Order]
        //   W Customer vs CreateOrder, ViewOrder (R) -> 2
        //   R Order vs CreateOrder (W) -> 1
        // CreateOrder: [R Customer] [W Order, W Item] [R Customer]
        //   R Customer vs Checkout (W) -> 1
        //   W Order vs ViewOrder, Checkout; W Item vs ViewOrder -> 2 distinct
        //   R Customer again -> 1
        // ViewOrder: [R Order, R Item] [R Customer]
        //   Order and Item both vs CreateOrder -> 1
        //   R Customer vs Checkout -> 1
        // EditCustomer stays in one cluster and is no conflict source.
        assert_eq!(s.per_trace["Checkout"], 3);
        assert_eq!(s.per_trace["CreateOrder"], 4);
        assert_eq!(s.per_trace["ViewOrder"], 2);
        assert_eq!(s.per_trace["EditCustomer"], 0);
        assert_eq!(s.total_cost, 9);
        assert_eq!(s.multi_cluster_traces, 3);
        assert!((s.complexity - 9.0 / 4.0).abs() < 1e-12);

        let by_multi = Scorer::new(ComplexityNormalization::MultiClusterTraces)
            .score(&d, &traces)
            .unwrap();
        assert!((by_multi.complexity - 3.0).abs() < 1e-12);
        let by_clusters = Scorer::new(ComplexityNormalization::Clusters)
            .score(&d, &traces)
            .unwrap();
        assert!((by_clusters.complexity - 4.5).abs() < 1e-12);
    }

    #[test]
    fn unassigned_entity_is_fatal() {
        let traces = sample_traces();
        let d = decomposition(&[&["Customer", "Order", "Item"]]);
        let err = score(&d, &traces).unwrap_err();
        let ScoreError::UnassignedEntity { entity, trace } = err;
        assert_eq!(entity, "Address");
        assert_eq!(trace, "EditCustomer");
    }

    #[test]
    fn empty_traces_score_zero() {
        let d = decomposition(&[&["A"], &["B"]]);
        assert!(score(&d, &AccessTraces::new()).unwrap().abs() < f64::EPSILON);
        let only_empty = AccessTraces::from([("Nothing".to_string(), AccessTrace::default())]);
        assert!(score(&d, &only_empty).unwrap().abs() < f64::EPSILON);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        const ENTITIES: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

        fn arb_traces() -> impl Strategy<Value = AccessTraces> {
            let access = (prop::bool::ANY, 0usize..ENTITIES.len()).prop_map(|(w, e)| {
                Access::new(if w { W } else { R }, ENTITIES[e])
            });
            prop::collection::vec(prop::collection::vec(access, 0..10), 0..6).prop_map(|ts| {
                ts.into_iter()
                    .enumerate()
                    .map(|(i, a)| (format!("T{i}"), AccessTrace::new(a)))
                    .collect()
            })
        }

        fn arb_decomposition() -> impl Strategy<Value = Decomposition> {
            prop::collection::vec(0u32..4, ENTITIES.len()).prop_map(|ids| {
                Decomposition::from_assignment(
                    ENTITIES.iter().zip(ids).map(|(e, c)| (*e, ClusterId(c))),
                )
                .unwrap()
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn single_cluster_is_always_zero(traces in arb_traces()) {
                let d = Decomposition::single_cluster(ENTITIES);
                prop_assert!(score(&d, &traces).unwrap().abs() < f64::EPSILON);
            }

            #[test]
            fn singletons_bound_every_decomposition(
                traces in arb_traces(),
                d in arb_decomposition(),
            ) {
                let max = score(&Decomposition::singletons(ENTITIES), &traces).unwrap();
                let c = score(&d, &traces).unwrap();
                prop_assert!(c >= 0.0);
                prop_assert!(c <= max + 1e-12, "complexity {} above singleton {}", c, max);
            }

            #[test]
            fn scoring_is_deterministic(traces in arb_traces(), d in arb_decomposition()) {
                let a = Scorer::default().score(&d, &traces).unwrap();
                let b = Scorer::default().score(&d, &traces).unwrap();
                prop_assert_eq!(a, b);
            }
        }
    }
}
