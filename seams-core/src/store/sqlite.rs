use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cluster::{CutSpec, SweepReport};
use crate::error::StoreError;
use crate::history::Timeline;

use super::schema;
use super::{ResultStore, RunInfo, ScoreRow, TimelineKey};

/// SQLite-backed implementation of [`ResultStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("seams store mutex poisoned");

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(StoreError::Sqlite)?;

        // Silently ignored for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        Self::drop_unkeyed_timelines(&conn).map_err(StoreError::Sqlite)?;

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;

        conn.execute(
            "INSERT OR IGNORE INTO seams_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        let version: String = conn
            .query_row(
                "SELECT value FROM seams_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        if version != schema::SCHEMA_VERSION {
            return Err(StoreError::Migration(format!(
                "database schema version {version}, expected {}",
                schema::SCHEMA_VERSION
            ))
            .into());
        }

        Ok(())
    }

    /// Older stores cached timelines without the history settings in the
    /// key. The table only holds a cache, so it is dropped and rebuilt.
    fn drop_unkeyed_timelines(conn: &Connection) -> rusqlite::Result<()> {
        let mut has_table = false;
        let mut has_history_key = false;

        let mut table_info = conn.prepare("PRAGMA table_info(timelines)")?;
        let rows = table_info.query_map([], |row| row.get::<_, String>(1))?;
        for row in rows {
            has_table = true;
            if row? == "history_key" {
                has_history_key = true;
            }
        }

        if has_table && !has_history_key {
            conn.execute("DROP TABLE timelines", [])?;
            info!("Dropped timeline cache without history settings");
        }
        Ok(())
    }

    fn parse_time(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    }
}

impl ResultStore for SqliteStore {
    fn save_timeline(&self, key: &TimelineKey, timeline: &Timeline) -> crate::error::Result<()> {
        let data = serde_json::to_string(timeline).map_err(StoreError::Serialization)?;
        let conn = self.conn.lock().expect("seams store mutex poisoned");
        conn.execute(
            "INSERT INTO timelines (codebase, until_rev, history_key, records, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(codebase, until_rev, history_key) DO UPDATE SET
                records = excluded.records,
                data = excluded.data,
                created_at = excluded.created_at",
            params![
                key.codebase,
                key.until,
                key.history,
                i64::try_from(timeline.len()).unwrap_or(i64::MAX),
                data,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(StoreError::Sqlite)?;
        debug!(
            codebase = %key.codebase,
            until = %key.until,
            records = timeline.len(),
            "Cached timeline"
        );
        Ok(())
    }

    fn load_timeline(&self, key: &TimelineKey) -> crate::error::Result<Option<Timeline>> {
        let conn = self.conn.lock().expect("seams store mutex poisoned");
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM timelines
                 WHERE codebase = ?1 AND until_rev = ?2 AND history_key = ?3",
                params![key.codebase, key.until, key.history],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Sqlite)?;

        let Some(data) = data else {
            return Ok(None);
        };
        let timeline = serde_json::from_str(&data).map_err(StoreError::Serialization)?;
        Ok(Some(timeline))
    }

    fn record_sweep(&self, codebase: &str, report: &SweepReport) -> crate::error::Result<Uuid> {
        let run_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().expect("seams store mutex poisoned");

        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO scores (run_id, codebase, mode, weights, linkage, cut,
                        clusters, complexity, pondered_complexity, tsr, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )
                .map_err(StoreError::Sqlite)?;
            for outcome in &report.outcomes {
                let key = &outcome.key;
                stmt.execute(params![
                    run_id.to_string(),
                    codebase,
                    report.mode.as_str(),
                    key.weights.to_string(),
                    key.linkage.as_str(),
                    CutSpec::Clusters(key.clusters).to_string(),
                    i64::try_from(key.clusters).unwrap_or(i64::MAX),
                    outcome.complexity,
                    outcome.pondered_complexity,
                    outcome.tsr,
                    now,
                ])
                .map_err(StoreError::Sqlite)?;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;

        info!(
            codebase,
            run = %run_id,
            outcomes = report.outcomes.len(),
            "Recorded sweep"
        );
        Ok(run_id)
    }

    fn list_scores(
        &self,
        codebase: &str,
        run: Option<Uuid>,
    ) -> crate::error::Result<Vec<ScoreRow>> {
        let conn = self.conn.lock().expect("seams store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT run_id, codebase, mode, weights, linkage, cut, clusters,
                        complexity, pondered_complexity, tsr, recorded_at
                 FROM scores
                 WHERE codebase = ?1 AND (?2 IS NULL OR run_id = ?2)
                 ORDER BY clusters ASC, complexity ASC, id ASC",
            )
            .map_err(StoreError::Sqlite)?;

        let run_filter = run.map(|r| r.to_string());
        let rows = stmt
            .query_map(params![codebase, run_filter], |row| {
                let run_id: String = row.get(0)?;
                let clusters: i64 = row.get(6)?;
                let recorded_at: String = row.get(10)?;
                Ok(ScoreRow {
                    run_id: Uuid::parse_str(&run_id).unwrap_or_default(),
                    codebase: row.get(1)?,
                    mode: row.get(2)?,
                    weights: row.get(3)?,
                    linkage: row.get(4)?,
                    cut: row.get(5)?,
                    clusters: usize::try_from(clusters).unwrap_or(0),
                    complexity: row.get(7)?,
                    pondered_complexity: row.get(8)?,
                    tsr: row.get(9)?,
                    recorded_at: Self::parse_time(&recorded_at),
                })
            })
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;

        Ok(rows)
    }

    fn list_runs(&self, codebase: &str) -> crate::error::Result<Vec<RunInfo>> {
        let conn = self.conn.lock().expect("seams store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT run_id, codebase, COUNT(*), MIN(recorded_at)
                 FROM scores WHERE codebase = ?1
                 GROUP BY run_id
                 ORDER BY MAX(id) DESC",
            )
            .map_err(StoreError::Sqlite)?;

        let rows = stmt
            .query_map(params![codebase], |row| {
                let run_id: String = row.get(0)?;
                let codebase: String = row.get(1)?;
                let outcomes: i64 = row.get(2)?;
                let at: String = row.get(3)?;
                Ok((run_id, codebase, outcomes, at))
            })
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;

        Ok(rows
            .into_iter()
            .map(|(run_id, codebase, outcomes, at)| RunInfo {
                run_id: Uuid::parse_str(&run_id).unwrap_or_default(),
                codebase,
                outcomes: u64::try_from(outcomes).unwrap_or(0),
                recorded_at: Self::parse_time(&at),
            })
            .collect())
    }
}
