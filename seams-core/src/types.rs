use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DecomposeError, RecordError};

// ── Change history ─────────────────────────────────────────────────

/// The kind of change a commit made to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Renamed => "RENAMED",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    /// Accepts the long upper-case names and git's single-letter status codes.
    /// Git similarity suffixes (`R087`) are tolerated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "ADDED" | "A" => Ok(Self::Added),
            "MODIFIED" | "M" => Ok(Self::Modified),
            "DELETED" | "D" => Ok(Self::Deleted),
            "RENAMED" | "R" => Ok(Self::Renamed),
            upper if upper.starts_with('R') && upper[1..].chars().all(|c| c.is_ascii_digit()) => {
                Ok(Self::Renamed)
            }
            _ => Err(trimmed.to_string()),
        }
    }
}

/// A file-level change as delivered by a history source, before validation.
///
/// Sources fill in whatever they could read; [`ChangeRecord::try_from`]
/// decides the variant and rejects incomplete records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawChange {
    pub commit_id: String,
    pub kind: String,
    pub previous_path: Option<String>,
    pub path: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

/// What happened to a file in one commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Added { path: String },
    Modified { path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },
}

/// A validated file-level change. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub commit_id: String,
    pub change: Change,
    pub timestamp: DateTime<Utc>,
    pub author: String,
}

impl ChangeRecord {
    pub fn kind(&self) -> ChangeKind {
        match self.change {
            Change::Added { .. } => ChangeKind::Added,
            Change::Modified { .. } => ChangeKind::Modified,
            Change::Deleted { .. } => ChangeKind::Deleted,
            Change::Renamed { .. } => ChangeKind::Renamed,
        }
    }

    /// The path the file has after this change.
    pub fn path(&self) -> &str {
        match &self.change {
            Change::Added { path } | Change::Modified { path } | Change::Deleted { path } => path,
            Change::Renamed { to, .. } => to,
        }
    }

    /// The path the file had before this change (renames only).
    pub fn previous_path(&self) -> Option<&str> {
        match &self.change {
            Change::Renamed { from, .. } => Some(from),
            _ => None,
        }
    }
}

impl TryFrom<RawChange> for ChangeRecord {
    type Error = RecordError;

    fn try_from(raw: RawChange) -> Result<Self, Self::Error> {
        let commit = raw.commit_id.trim().to_string();
        if commit.is_empty() {
            return Err(RecordError::MissingCommit);
        }

        let kind = ChangeKind::from_str(&raw.kind).map_err(|raw| {
            RecordError::UnknownChangeKind {
                commit: commit.clone(),
                raw,
            }
        })?;

        let Some(timestamp) = raw.timestamp else {
            return Err(RecordError::MissingTimestamp { commit });
        };

        let path = match raw.path.map(|p| p.trim().to_string()) {
            Some(p) if !p.is_empty() => p,
            _ => return Err(RecordError::MissingPath { commit }),
        };

        let change = match kind {
            ChangeKind::Added => Change::Added { path },
            ChangeKind::Modified => Change::Modified { path },
            ChangeKind::Deleted => Change::Deleted { path },
            ChangeKind::Renamed => {
                let from = match raw.previous_path.map(|p| p.trim().to_string()) {
                    Some(p) if !p.is_empty() => p,
                    _ => return Err(RecordError::MissingPreviousPath { commit }),
                };
                if from == path {
                    Change::Modified { path }
                } else {
                    Change::Renamed { from, to: path }
                }
            }
        };

        Ok(Self {
            commit_id: commit,
            change,
            timestamp,
            author: raw.author.unwrap_or_default().trim().to_string(),
        })
    }
}

// ── Access traces ──────────────────────────────────────────────────

/// Whether a transaction reads or writes an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessMode {
    #[serde(rename = "R")]
    Read,
    #[serde(rename = "W")]
    Write,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "R",
            Self::Write => "W",
        }
    }
}

/// One recorded access of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Access {
    pub mode: AccessMode,
    pub entity: String,
}

impl Access {
    pub fn new(mode: AccessMode, entity: impl Into<String>) -> Self {
        Self {
            mode,
            entity: entity.into(),
        }
    }
}

/// The ordered accesses of one transaction (controller, use case).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTrace {
    pub accesses: Vec<Access>,
}

impl AccessTrace {
    pub fn new(accesses: Vec<Access>) -> Self {
        Self { accesses }
    }

    /// Distinct entities touched by this trace.
    pub fn entities(&self) -> BTreeSet<&str> {
        self.accesses.iter().map(|a| a.entity.as_str()).collect()
    }
}

/// Traces keyed by transaction name. Ordered so every pass is deterministic.
pub type AccessTraces = BTreeMap<String, AccessTrace>;

// ── Decompositions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClusterId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// An assignment of every entity to exactly one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    assignment: BTreeMap<String, ClusterId>,
}

impl Decomposition {
    /// Build from `entity → cluster` pairs. Later pairs for the same entity
    /// are rejected rather than silently overwriting.
    pub fn from_assignment<I, S>(pairs: I) -> Result<Self, DecomposeError>
    where
        I: IntoIterator<Item = (S, ClusterId)>,
        S: Into<String>,
    {
        let mut assignment = BTreeMap::new();
        for (entity, cluster) in pairs {
            let entity = entity.into();
            if let Some(previous) = assignment.insert(entity.clone(), cluster) {
                if previous != cluster {
                    return Err(DecomposeError::InvalidCut(format!(
                        "entity {entity} assigned to clusters {previous} and {cluster}"
                    )));
                }
            }
        }
        Ok(Self { assignment })
    }

    /// Build from `cluster → members` lists (the persisted cut format).
    pub fn from_clusters(
        clusters: &BTreeMap<ClusterId, Vec<String>>,
    ) -> Result<Self, DecomposeError> {
        Self::from_assignment(
            clusters
                .iter()
                .flat_map(|(id, members)| members.iter().map(move |m| (m.clone(), *id))),
        )
    }

    /// Every entity in its own cluster, numbered in entity order.
    pub fn singletons<'a>(entities: impl IntoIterator<Item = &'a str>) -> Self {
        let unique: BTreeSet<&str> = entities.into_iter().collect();
        let assignment = unique
            .into_iter()
            .enumerate()
            .map(|(i, e)| (e.to_string(), ClusterId(u32::try_from(i).unwrap_or(u32::MAX))))
            .collect();
        Self { assignment }
    }

    /// All entities in one cluster.
    pub fn single_cluster<'a>(entities: impl IntoIterator<Item = &'a str>) -> Self {
        let assignment = entities
            .into_iter()
            .map(|e| (e.to_string(), ClusterId(0)))
            .collect();
        Self { assignment }
    }

    pub fn cluster_of(&self, entity: &str) -> Option<ClusterId> {
        self.assignment.get(entity).copied()
    }

    pub fn entity_count(&self) -> usize {
        self.assignment.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.assignment.values().collect::<BTreeSet<_>>().len()
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.assignment.keys().map(String::as_str)
    }

    pub fn assignment(&self) -> &BTreeMap<String, ClusterId> {
        &self.assignment
    }

    /// Invert to `cluster → sorted members`.
    pub fn clusters(&self) -> BTreeMap<ClusterId, Vec<String>> {
        let mut out: BTreeMap<ClusterId, Vec<String>> = BTreeMap::new();
        for (entity, cluster) in &self.assignment {
            out.entry(*cluster).or_default().push(entity.clone());
        }
        out
    }
}
