use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use super::traits::{HistorySource, PathFilter};
use crate::error::HistoryError;
use crate::types::RawChange;

/// Reads history from a semicolon-separated log, one change per line:
///
/// ```text
/// commit;CHANGE_TYPE;previous_path;path;unix_timestamp;author
/// ```
///
/// Lines must already be oldest first. Fields that are missing or do not
/// parse are left empty here and rejected later by the normalizer.
#[derive(Debug)]
pub struct LogHistorySource {
    path: PathBuf,
    name: String,
    filter: PathFilter,
}

impl LogHistorySource {
    pub fn new(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());
        Self {
            path: path.to_path_buf(),
            name,
            filter: PathFilter::default(),
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl HistorySource for LogHistorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<RawChange>, HistoryError> {
        let text = std::fs::read_to_string(&self.path)?;
        let changes: Vec<RawChange> = parse_log(&text)
            .into_iter()
            .filter(|c| self.filter.accepts(c))
            .collect();
        debug!(changes = changes.len(), path = %self.path.display(), "Log history loaded");
        Ok(changes)
    }
}

/// Parse every non-blank line of a history log.
pub fn parse_log(text: &str) -> Vec<RawChange> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> RawChange {
    let mut fields = line.splitn(6, ';').map(str::trim);
    let mut next = || fields.next().filter(|f| !f.is_empty()).map(String::from);

    let commit_id = next().unwrap_or_default();
    let kind = next().unwrap_or_default();
    let previous_path = next();
    let path = next();
    let timestamp = next().and_then(|t| parse_timestamp(&t));
    let author = next();

    RawChange {
        commit_id,
        kind,
        previous_path,
        path,
        timestamp,
        author,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let seconds: i64 = raw.parse().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::normalize;

    const LOG: &str = "\
a1;ADDED;;src/Order.java;1700000000;alice
a1;ADDED;;src/Customer.java;1700000000;alice
b2;MODIFIED;;src/Order.java;1700000100;bob
c3;RENAMED;src/Customer.java;src/Client.java;1700003600;alice

d4;MODIFIED;;src/Order.java;not-a-time;bob
e5;MODIFIED;;;1700009000;bob
";

    #[test]
    fn parses_all_fields() {
        let changes = parse_log(LOG);
        assert_eq!(changes.len(), 6);
        assert_eq!(changes[3].kind, "RENAMED");
        assert_eq!(changes[3].previous_path.as_deref(), Some("src/Customer.java"));
        assert_eq!(changes[3].path.as_deref(), Some("src/Client.java"));
        assert_eq!(changes[2].author.as_deref(), Some("bob"));
        assert_eq!(changes[0].previous_path, None);
        assert_eq!(changes[0].timestamp.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn bad_fields_surface_in_normalization() {
        let out = normalize(parse_log(LOG), 100);
        assert_eq!(out.skipped.len(), 2);
        assert_eq!(out.timeline.len(), 4);
    }

    #[test]
    fn load_reads_file_and_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.log");
        std::fs::write(&path, LOG).unwrap();

        let source = LogHistorySource::new(&path)
            .filter(PathFilter::new(&[], &["**/Order.java".to_string()]).unwrap());
        assert_eq!(source.name(), "history");
        let changes = source.load().unwrap();
        // Order.java lines dropped; the line with no path is kept for the normalizer.
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = LogHistorySource::new(Path::new("/nonexistent/history.log"));
        assert!(matches!(source.load(), Err(HistoryError::Io(_))));
    }
}
