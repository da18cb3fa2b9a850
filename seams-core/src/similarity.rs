// Signal normalization divides integer counts; precision loss is irrelevant here.
#![allow(clippy::cast_precision_loss, clippy::cast_lossless)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coupling::CouplingMatrix;
use crate::error::DecomposeError;
use crate::types::{AccessMode, AccessTraces};

// ── Signals ────────────────────────────────────────────────────────

/// A raw pairwise similarity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Traces touching both entities.
    Access,
    /// Traces writing both entities.
    Write,
    /// Traces reading both entities.
    Read,
    /// Times the two entities are accessed back to back.
    Sequence,
    /// Co-change windows containing both files.
    Commit,
    /// Distinct authors who changed both files.
    Author,
}

impl Signal {
    pub const ALL: [Self; 6] = [
        Self::Access,
        Self::Write,
        Self::Read,
        Self::Sequence,
        Self::Commit,
        Self::Author,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Write => "write",
            Self::Read => "read",
            Self::Sequence => "sequence",
            Self::Commit => "commit",
            Self::Author => "author",
        }
    }
}

/// Which family of signals a sweep varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMode {
    /// Access, write, read, sequence.
    Static,
    /// Commit, author.
    Commit,
    /// All six.
    Mixed,
}

impl SignalMode {
    pub fn signals(self) -> &'static [Signal] {
        match self {
            Self::Static => &Signal::ALL[..4],
            Self::Commit => &Signal::ALL[4..],
            Self::Mixed => &Signal::ALL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Commit => "commit",
            Self::Mixed => "mixed",
        }
    }
}

impl FromStr for SignalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "commit" => Ok(Self::Commit),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown signal mode {other:?}")),
        }
    }
}

// ── Weights ────────────────────────────────────────────────────────

/// Non-negative integer weight per signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Weights {
    pub access: u32,
    pub write: u32,
    pub read: u32,
    pub sequence: u32,
    pub commit: u32,
    pub author: u32,
}

impl Weights {
    pub fn only(signal: Signal) -> Self {
        let mut w = Self::default();
        w.set(signal, 1);
        w
    }

    pub fn get(&self, signal: Signal) -> u32 {
        match signal {
            Signal::Access => self.access,
            Signal::Write => self.write,
            Signal::Read => self.read,
            Signal::Sequence => self.sequence,
            Signal::Commit => self.commit,
            Signal::Author => self.author,
        }
    }

    pub fn set(&mut self, signal: Signal, value: u32) {
        let slot = match signal {
            Signal::Access => &mut self.access,
            Signal::Write => &mut self.write,
            Signal::Read => &mut self.read,
            Signal::Sequence => &mut self.sequence,
            Signal::Commit => &mut self.commit,
            Signal::Author => &mut self.author,
        };
        *slot = value;
    }

    pub fn total(&self) -> u32 {
        Signal::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

impl fmt::Display for Weights {
    /// `a,w,r,s,c,au` order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.access, self.write, self.read, self.sequence, self.commit, self.author
        )
    }
}

impl FromStr for Weights {
    type Err = DecomposeError;

    /// Parse `a,w,r,s,c,au`. Missing trailing values are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() > Signal::ALL.len() {
            return Err(DecomposeError::InvalidWeights(format!(
                "expected at most {} weights, got {}",
                Signal::ALL.len(),
                parts.len()
            )));
        }
        let mut weights = Self::default();
        for (signal, part) in Signal::ALL.iter().zip(parts) {
            let value = part.parse::<u32>().map_err(|e| {
                DecomposeError::InvalidWeights(format!("{} weight {part:?}: {e}", signal.as_str()))
            })?;
            weights.set(*signal, value);
        }
        Ok(weights)
    }
}

/// Every way to split `interval` units among `signals`, in lexicographic
/// order of the signal weights.
pub fn weight_combinations(signals: &[Signal], interval: u32) -> Vec<Weights> {
    fn fill(signals: &[Signal], remaining: u32, current: Weights, out: &mut Vec<Weights>) {
        match signals {
            [] => {}
            [last] => {
                let mut w = current;
                w.set(*last, remaining);
                out.push(w);
            }
            [first, rest @ ..] => {
                for v in 0..=remaining {
                    let mut w = current;
                    w.set(*first, v);
                    fill(rest, remaining - v, w, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    fill(signals, interval, Weights::default(), &mut out);
    out
}

// ── Matrices ───────────────────────────────────────────────────────

/// Square similarity matrix over a sorted entity list. Diagonal is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    entities: Vec<String>,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Build from a row-major `n × n` value grid.
    pub fn new(entities: Vec<String>, values: Vec<f64>) -> Result<Self, DecomposeError> {
        let n = entities.len();
        if values.len() != n * n {
            return Err(DecomposeError::Shape(format!(
                "{n} entities need {} values, got {}",
                n * n,
                values.len()
            )));
        }
        let mut m = Self { entities, values };
        for i in 0..n {
            m.values[i * n + i] = 1.0;
        }
        Ok(m)
    }

    /// Commit-only similarity straight from a coupling matrix.
    pub fn from_coupling(coupling: &CouplingMatrix) -> Self {
        let entities: Vec<String> = coupling.files().map(String::from).collect();
        let signals = SignalSet::build(entities, &SignalInputs::default().coupling(coupling));
        signals.blend_unchecked(&Weights::only(Signal::Commit))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.entities.len() + j]
    }

    /// `1 - similarity`, clamped to `[0, 1]`.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        if i == j {
            0.0
        } else {
            (1.0 - self.get(i, j)).clamp(0.0, 1.0)
        }
    }
}

/// Optional inputs for [`SignalSet::build`]. Absent inputs yield all-zero
/// signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalInputs<'a> {
    pub traces: Option<&'a AccessTraces>,
    pub coupling: Option<&'a CouplingMatrix>,
    pub authors: Option<&'a BTreeMap<String, Vec<String>>>,
}

impl<'a> SignalInputs<'a> {
    #[must_use]
    pub fn traces(mut self, traces: &'a AccessTraces) -> Self {
        self.traces = Some(traces);
        self
    }

    #[must_use]
    pub fn coupling(mut self, coupling: &'a CouplingMatrix) -> Self {
        self.coupling = Some(coupling);
        self
    }

    #[must_use]
    pub fn authors(mut self, authors: &'a BTreeMap<String, Vec<String>>) -> Self {
        self.authors = Some(authors);
        self
    }
}

/// All six signals over one entity list, each scaled to `[0, 1]` by its
/// largest off-diagonal value. Built once per codebase, blended per sweep
/// combination.
#[derive(Debug, Clone)]
pub struct SignalSet {
    entities: Vec<String>,
    signals: BTreeMap<Signal, Vec<f64>>,
}

impl SignalSet {
    /// Entities are sorted and deduplicated; signal values for unknown
    /// entities are ignored.
    pub fn build(mut entities: Vec<String>, inputs: &SignalInputs<'_>) -> Self {
        entities.sort();
        entities.dedup();
        let n = entities.len();
        let index: HashMap<&str, usize> = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.as_str(), i))
            .collect();

        let mut counts: BTreeMap<Signal, Vec<u32>> =
            Signal::ALL.iter().map(|s| (*s, vec![0u32; n * n])).collect();
        let mut bump = |signal: Signal, a: usize, b: usize| {
            if a != b {
                if let Some(m) = counts.get_mut(&signal) {
                    m[a * n + b] += 1;
                    m[b * n + a] += 1;
                }
            }
        };

        if let Some(traces) = inputs.traces {
            for trace in traces.values() {
                let mut touched = vec![(false, false); n];
                let mut previous: Option<usize> = None;
                for access in &trace.accesses {
                    let Some(&i) = index.get(access.entity.as_str()) else {
                        previous = None;
                        continue;
                    };
                    match access.mode {
                        AccessMode::Read => touched[i].0 = true,
                        AccessMode::Write => touched[i].1 = true,
                    }
                    if let Some(p) = previous {
                        bump(Signal::Sequence, p, i);
                    }
                    previous = Some(i);
                }
                let seen: Vec<usize> = (0..n).filter(|i| touched[*i] != (false, false)).collect();
                for (k, &a) in seen.iter().enumerate() {
                    for &b in &seen[k + 1..] {
                        bump(Signal::Access, a, b);
                        if touched[a].0 && touched[b].0 {
                            bump(Signal::Read, a, b);
                        }
                        if touched[a].1 && touched[b].1 {
                            bump(Signal::Write, a, b);
                        }
                    }
                }
            }
        }

        if let Some(coupling) = inputs.coupling {
            for pair in coupling.pairs() {
                if let (Some(&a), Some(&b)) = (
                    index.get(pair.first.as_str()),
                    index.get(pair.second.as_str()),
                ) {
                    for _ in 0..pair.weight {
                        bump(Signal::Commit, a, b);
                    }
                }
            }
        }

        if let Some(authors) = inputs.authors {
            let mut by_author: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for (entity, names) in authors {
                if let Some(&i) = index.get(entity.as_str()) {
                    let mut names: Vec<&str> = names.iter().map(String::as_str).collect();
                    names.sort_unstable();
                    names.dedup();
                    for name in names {
                        by_author.entry(name).or_default().push(i);
                    }
                }
            }
            for members in by_author.values() {
                for (k, &a) in members.iter().enumerate() {
                    for &b in &members[k + 1..] {
                        bump(Signal::Author, a, b);
                    }
                }
            }
        }

        let signals = counts
            .into_iter()
            .map(|(signal, raw)| {
                let max = raw.iter().copied().max().unwrap_or(0);
                let scaled = if max == 0 {
                    vec![0.0; raw.len()]
                } else {
                    raw.iter().map(|c| f64::from(*c) / f64::from(max)).collect()
                };
                debug!(signal = signal.as_str(), max, "Scaled signal");
                (signal, scaled)
            })
            .collect();

        Self { entities, signals }
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Weighted average of the scaled signals.
    pub fn blend(&self, weights: &Weights) -> Result<SimilarityMatrix, DecomposeError> {
        if weights.total() == 0 {
            return Err(DecomposeError::InvalidWeights(format!(
                "weights {weights} sum to zero"
            )));
        }
        Ok(self.blend_unchecked(weights))
    }

    fn blend_unchecked(&self, weights: &Weights) -> SimilarityMatrix {
        let n = self.entities.len();
        let total = f64::from(weights.total().max(1));
        let mut values = vec![0.0; n * n];
        for (signal, scaled) in &self.signals {
            let w = weights.get(*signal);
            if w == 0 {
                continue;
            }
            let w = f64::from(w) / total;
            for (v, s) in values.iter_mut().zip(scaled) {
                *v += w * s;
            }
        }
        for i in 0..n {
            values[i * n + i] = 1.0;
        }
        SimilarityMatrix {
            entities: self.entities.clone(),
            values,
        }
    }
}
