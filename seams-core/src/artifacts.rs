//! JSON boundary artifacts.
//!
//! Four shapes cross the process boundary:
//!
//! - adjacency (`commit.json`): `{entity: [partner, …]}`, a partner repeated
//!   once per shared co-change window
//! - authors (`authors.json`): `{entity: [author, …]}`
//! - cuts: `{"clusters": {"<id>": [entity, …]}}`
//! - access traces: `{name: {"t": [{"id": n, "a": [["R", id], …]}]}}`
//!
//! Entity ids in trace files may be numbers or strings; both become strings.
//! Only the first run recorded under a name is read.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ArtifactError;
use crate::types::{Access, AccessMode, AccessTrace, AccessTraces, ClusterId, Decomposition};

/// `entity → [entity]` lists. Used for coupling and for authors.
pub type Adjacency = BTreeMap<String, Vec<String>>;

pub const TIMELINE_FILE: &str = "timeline.json";
pub const COUPLING_FILE: &str = "commit.json";
pub const AUTHORS_FILE: &str = "authors.json";

// ── Generic JSON ───────────────────────────────────────────────────

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let text = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Pretty-print `value` to `path`, creating parent directories.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, text).map_err(io_err)?;
    debug!(path = %path.display(), "Wrote artifact");
    Ok(())
}

// ── Adjacency and authors ──────────────────────────────────────────

pub fn read_adjacency(path: &Path) -> Result<Adjacency, ArtifactError> {
    read_json(path)
}

pub fn write_adjacency(path: &Path, adjacency: &Adjacency) -> Result<(), ArtifactError> {
    write_json(path, adjacency)
}

// ── Cuts ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct CutFile {
    clusters: BTreeMap<String, Vec<String>>,
}

pub fn read_cut(path: &Path) -> Result<Decomposition, ArtifactError> {
    let file: CutFile = read_json(path)?;
    let invalid = |message: String| ArtifactError::Invalid {
        path: path.display().to_string(),
        message,
    };

    let mut pairs = Vec::new();
    for (id, members) in file.clusters {
        let id: u32 = id
            .parse()
            .map_err(|_| invalid(format!("cluster id {id:?} is not a number")))?;
        pairs.extend(members.into_iter().map(|m| (m, ClusterId(id))));
    }
    Decomposition::from_assignment(pairs).map_err(|e| invalid(e.to_string()))
}

pub fn write_cut(path: &Path, decomposition: &Decomposition) -> Result<(), ArtifactError> {
    let clusters = decomposition
        .clusters()
        .into_iter()
        .map(|(id, members)| (id.to_string(), members))
        .collect();
    write_json(path, &CutFile { clusters })
}

// ── Access traces ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum EntityRef {
    Id(u64),
    Name(String),
}

impl EntityRef {
    fn into_name(self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Name(name) => name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TraceRun {
    #[serde(default)]
    id: u64,
    a: Vec<(AccessMode, EntityRef)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TraceEntry {
    t: Vec<TraceRun>,
}

/// Parse an access-trace document. A name's first run in file order is its
/// trace; later runs are ignored. A name with no runs has an empty trace.
pub fn parse_traces(text: &str) -> Result<AccessTraces, serde_json::Error> {
    let file: BTreeMap<String, TraceEntry> = serde_json::from_str(text)?;
    Ok(file
        .into_iter()
        .map(|(name, entry)| {
            if entry.t.len() > 1 {
                debug!(trace = %name, runs = entry.t.len(), "Using first trace run");
            }
            let accesses = entry
                .t
                .into_iter()
                .next()
                .map(|run| {
                    run.a
                        .into_iter()
                        .map(|(mode, entity)| Access::new(mode, entity.into_name()))
                        .collect()
                })
                .unwrap_or_default();
            (name, AccessTrace::new(accesses))
        })
        .collect())
}

pub fn read_traces(path: &Path) -> Result<AccessTraces, ArtifactError> {
    let text = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_traces(&text).map_err(|source| ArtifactError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write traces as one run per name with string entity ids.
pub fn write_traces(path: &Path, traces: &AccessTraces) -> Result<(), ArtifactError> {
    let file: BTreeMap<&str, TraceEntry> = traces
        .iter()
        .map(|(name, trace)| {
            let a = trace
                .accesses
                .iter()
                .map(|access| (access.mode, EntityRef::Name(access.entity.clone())))
                .collect();
            (name.as_str(), TraceEntry {
                t: vec![TraceRun { id: 0, a }],
            })
        })
        .collect();
    write_json(path, &file)
}
