/// Top-level seams error type.
///
/// All fallible operations in `seams-core` return [`Result<T, SeamsError>`](Result).
/// Each variant wraps a stage-specific error enum, so a sweep can report
/// which stage rejected a parameter combination without losing detail.
#[derive(thiserror::Error, Debug)]
pub enum SeamsError {
    /// Error loading or normalizing change history.
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Error building a similarity matrix or cutting a dendrogram.
    #[error("Decomposition error: {0}")]
    Decompose(#[from] DecomposeError),

    /// Error computing transactional complexity.
    #[error("Scoring error: {0}")]
    Score(#[from] ScoreError),

    /// Error from the results store (`SQLite` operations, migrations).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error reading or writing a boundary artifact (JSON files).
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while loading history from a source.
#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    /// Git operation failed (open, walk, diff).
    #[error("Git error: {0}")]
    Git(String),

    /// Filesystem I/O error reading a history log.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single change record that could not be turned into a [`ChangeRecord`].
///
/// These never abort a run. The normalizer logs them, skips the record,
/// and hands the list back to the caller.
///
/// [`ChangeRecord`]: crate::types::ChangeRecord
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record in commit {commit} has no timestamp")]
    MissingTimestamp { commit: String },

    #[error("record in commit {commit} has no path")]
    MissingPath { commit: String },

    #[error("rename in commit {commit} has no previous path")]
    MissingPreviousPath { commit: String },

    #[error("record in commit {commit} has unknown change type {raw:?}")]
    UnknownChangeKind { commit: String, raw: String },

    #[error("record has no commit id")]
    MissingCommit,
}

/// Errors raised at the decomposition generator boundary.
#[derive(thiserror::Error, Debug)]
pub enum DecomposeError {
    /// Not enough entities for a meaningful clustering.
    #[error("Too few entities to cluster: found {found}, need at least {required}")]
    TooFewEntities { found: usize, required: usize },

    /// The cut cannot be applied to this dendrogram.
    #[error("Invalid cut: {0}")]
    InvalidCut(String),

    /// A linkage method name that is not one of the supported methods.
    #[error("Unknown linkage method {0:?}")]
    UnknownLinkage(String),

    /// Signal weights are empty, negative, or do not match the signal mode.
    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    /// A similarity matrix was built with inconsistent dimensions.
    #[error("Matrix shape mismatch: {0}")]
    Shape(String),
}

/// Errors raised while scoring a decomposition.
#[derive(thiserror::Error, Debug)]
pub enum ScoreError {
    /// A trace touches an entity that the decomposition never assigned.
    #[error("Entity {entity} accessed by {trace} is not assigned to any cluster")]
    UnassignedEntity { entity: String, trace: String },
}

/// Errors from the SQLite-backed results store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema migration failed (version mismatch or DDL error).
    #[error("Migration failed: {0}")]
    Migration(String),

    /// JSON serialization/deserialization of a stored payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reading or writing boundary artifacts.
#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    /// Filesystem I/O error.
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The artifact is not valid JSON of the expected shape.
    #[error("Malformed artifact {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The artifact parsed but its content is inconsistent.
    #[error("Invalid artifact {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Errors in seams configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, SeamsError>`.
pub type Result<T> = std::result::Result<T, SeamsError>;
