//! Persistence for normalized timelines and sweep scores.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster::SweepReport;
use crate::config::HistorySection;
use crate::history::Timeline;

/// Key under which a timeline is cached when no terminal commit was given.
pub const HEAD_REV: &str = "HEAD";

/// Identifies one cached timeline: the codebase, the terminal commit, and
/// the history settings it was normalized under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimelineKey {
    pub codebase: String,
    pub until: String,
    pub history: String,
}

impl TimelineKey {
    pub fn new(codebase: &str, until: Option<&str>, history: &HistorySection) -> Self {
        Self {
            codebase: codebase.to_string(),
            until: until.unwrap_or(HEAD_REV).to_string(),
            history: history.cache_key(),
        }
    }
}

/// One stored sweep outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub run_id: Uuid,
    pub codebase: String,
    pub mode: String,
    pub weights: String,
    pub linkage: String,
    pub cut: String,
    pub clusters: usize,
    pub complexity: f64,
    pub pondered_complexity: f64,
    pub tsr: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Summary of one recorded sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub codebase: String,
    pub outcomes: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Where pipeline results are kept between runs.
pub trait ResultStore: Send + Sync {
    /// Cache a normalized timeline, replacing any previous one for the key.
    fn save_timeline(&self, key: &TimelineKey, timeline: &Timeline) -> crate::error::Result<()>;

    fn load_timeline(&self, key: &TimelineKey) -> crate::error::Result<Option<Timeline>>;

    /// Store every outcome of `report` under a fresh run id.
    fn record_sweep(&self, codebase: &str, report: &SweepReport) -> crate::error::Result<Uuid>;

    /// Scores for a codebase, optionally limited to one run, ordered by
    /// cluster count then complexity.
    fn list_scores(
        &self,
        codebase: &str,
        run: Option<Uuid>,
    ) -> crate::error::Result<Vec<ScoreRow>>;

    /// Recorded runs, newest first.
    fn list_runs(&self, codebase: &str) -> crate::error::Result<Vec<RunInfo>>;
}
