/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the seams results database.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS seams_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Normalized timelines, cached per codebase, terminal commit and history settings
CREATE TABLE IF NOT EXISTS timelines (
    codebase TEXT NOT NULL,
    until_rev TEXT NOT NULL,
    history_key TEXT NOT NULL,
    records INTEGER NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (codebase, until_rev, history_key)
);

-- One row per scored sweep outcome
CREATE TABLE IF NOT EXISTS scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    codebase TEXT NOT NULL,
    mode TEXT NOT NULL,
    weights TEXT NOT NULL,
    linkage TEXT NOT NULL,
    cut TEXT NOT NULL,
    clusters INTEGER NOT NULL,
    complexity REAL NOT NULL,
    pondered_complexity REAL NOT NULL,
    tsr REAL NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scores_run ON scores(run_id);
CREATE INDEX IF NOT EXISTS idx_scores_codebase ON scores(codebase, clusters);
";
