use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::rename::RenameIndex;
use crate::error::RecordError;
use crate::types::{Change, ChangeKind, ChangeRecord, RawChange};

/// Canonical per-file history in chronological order: every path is the
/// file's latest name, and files whose last recorded change is a deletion
/// are gone. Renames are folded into the names, so no record is a rename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    records: Vec<ChangeRecord>,
}

impl Timeline {
    pub fn from_records(records: Vec<ChangeRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct canonical paths, sorted.
    pub fn files(&self) -> BTreeSet<&str> {
        self.records.iter().map(ChangeRecord::path).collect()
    }

    /// Earliest and latest timestamps.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let min = self.records.iter().map(|r| r.timestamp).min()?;
        let max = self.records.iter().map(|r| r.timestamp).max()?;
        Some((min, max))
    }

    /// Keep only records whose canonical path passes `keep`.
    #[must_use]
    pub fn restrict_to(&self, mut keep: impl FnMut(&str) -> bool) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| keep(r.path()))
                .cloned()
                .collect(),
        }
    }

    /// Rewrite every path through `rename`. Files mapped to the same name
    /// share one history from then on.
    #[must_use]
    pub fn map_paths(&self, mut rename: impl FnMut(&str) -> String) -> Self {
        let records = self
            .records
            .iter()
            .map(|r| {
                let change = match &r.change {
                    Change::Added { path } => Change::Added { path: rename(path) },
                    Change::Modified { path } => Change::Modified { path: rename(path) },
                    Change::Deleted { path } => Change::Deleted { path: rename(path) },
                    Change::Renamed { from, to } => {
                        let (from, to) = (rename(from), rename(to));
                        if from == to {
                            Change::Modified { path: to }
                        } else {
                            Change::Renamed { from, to }
                        }
                    }
                };
                ChangeRecord {
                    change,
                    ..r.clone()
                }
            })
            .collect();
        Self { records }
    }

    /// Canonical path → sorted distinct authors. Records without an author
    /// are ignored.
    pub fn authors(&self) -> BTreeMap<String, Vec<String>> {
        let mut sets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for record in &self.records {
            let entry = sets.entry(record.path()).or_default();
            if !record.author.is_empty() {
                entry.insert(record.author.as_str());
            }
        }
        sets.into_iter()
            .map(|(path, authors)| {
                (
                    path.to_string(),
                    authors.into_iter().map(String::from).collect(),
                )
            })
            .collect()
    }
}

/// What the normalizer produced, plus what it set aside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub timeline: Timeline,
    /// Records rejected as malformed, in input order.
    pub skipped: Vec<RecordError>,
    /// Commits excluded from the timeline as bulk changes, oldest first.
    pub excluded_commits: Vec<String>,
}

/// Turn raw history into a canonical [`Timeline`].
///
/// Records are stably sorted by timestamp, so the changes of one commit keep
/// the order the source gave them. Malformed records are skipped and
/// reported. Commits touching more than `refactor_cutoff` files still feed
/// rename and deletion bookkeeping but contribute no records to the timeline.
#[instrument(skip_all, name = "normalize")]
pub fn normalize(
    changes: impl IntoIterator<Item = RawChange>,
    refactor_cutoff: usize,
) -> NormalizeOutcome {
    let mut skipped = Vec::new();
    let mut records = Vec::new();
    for raw in changes {
        match ChangeRecord::try_from(raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(reason = %e, "Skipping malformed change record");
                skipped.push(e);
            }
        }
    }
    records.sort_by_key(|r| r.timestamp);

    let renames = RenameIndex::build(records.iter().enumerate().filter_map(|(i, r)| {
        match &r.change {
            Change::Renamed { from, to } => Some((i, from.as_str(), to.as_str())),
            _ => None,
        }
    }));
    debug!(renames = renames.rename_count(), "Built rename index");

    // Rewrite every record to the name its identity ends up with.
    let canonical: Vec<ChangeRecord> = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let name = renames.resolve(r.path(), Some(i)).to_string();
            let change = match r.kind() {
                ChangeKind::Added => Change::Added { path: name },
                ChangeKind::Modified | ChangeKind::Renamed => Change::Modified { path: name },
                ChangeKind::Deleted => Change::Deleted { path: name },
            };
            ChangeRecord {
                change,
                ..r.clone()
            }
        })
        .collect();

    // A file is gone only if its very last change is a deletion.
    let mut last_kind: HashMap<&str, ChangeKind> = HashMap::new();
    for record in &canonical {
        last_kind.insert(record.path(), record.kind());
    }
    let deleted: HashSet<&str> = last_kind
        .into_iter()
        .filter(|(_, kind)| *kind == ChangeKind::Deleted)
        .map(|(path, _)| path)
        .collect();

    let mut per_commit: HashMap<&str, usize> = HashMap::new();
    for record in &canonical {
        *per_commit.entry(record.commit_id.as_str()).or_default() += 1;
    }
    let mut excluded_commits = Vec::new();
    let mut seen = HashSet::new();
    for record in &canonical {
        let commit = record.commit_id.as_str();
        if per_commit[commit] > refactor_cutoff && seen.insert(commit) {
            excluded_commits.push(commit.to_string());
        }
    }
    let excluded: HashSet<&str> = excluded_commits.iter().map(String::as_str).collect();

    let kept: Vec<ChangeRecord> = canonical
        .iter()
        .filter(|r| !deleted.contains(r.path()) && !excluded.contains(r.commit_id.as_str()))
        .cloned()
        .collect();

    info!(
        records = kept.len(),
        skipped = skipped.len(),
        deleted_files = deleted.len(),
        excluded_commits = excluded_commits.len(),
        "Normalized history"
    );

    NormalizeOutcome {
        timeline: Timeline::from_records(kept),
        skipped,
        excluded_commits,
    }
}
