use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use super::traits::{HistorySource, PathFilter};
use crate::error::HistoryError;
use crate::types::{ChangeKind, RawChange};

/// Walks a local git repository with `gix` and emits one [`RawChange`] per
/// file diff, oldest commit first.
#[derive(Debug)]
pub struct GitHistorySource {
    repo_path: PathBuf,
    name: String,
    until: Option<String>,
    max_commits: u32,
    filter: PathFilter,
}

impl GitHistorySource {
    pub fn new(repo_path: &Path) -> Self {
        let name = repo_path
            .file_name()
            .map_or_else(|| repo_path.display().to_string(), |n| n.to_string_lossy().to_string());
        Self {
            repo_path: repo_path.to_path_buf(),
            name,
            until: None,
            max_commits: 0,
            filter: PathFilter::default(),
        }
    }

    /// Stop the walk at this revision instead of `HEAD`.
    #[must_use]
    pub fn until(mut self, rev: Option<String>) -> Self {
        self.until = rev;
        self
    }

    /// Keep at most the latest `max` commits. 0 means unlimited.
    #[must_use]
    pub fn max_commits(mut self, max: u32) -> Self {
        self.max_commits = max;
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    fn collect_commits(&self, repo: &gix::Repository) -> Result<Vec<gix::ObjectId>, HistoryError> {
        let tip = match &self.until {
            Some(rev) => repo
                .rev_parse_single(rev.as_str())
                .map_err(|e| git_err(format!("cannot resolve {rev}: {e}")))?
                .object()
                .map_err(git_err)?
                .try_into_commit()
                .map_err(git_err)?,
            None => repo.head_commit().map_err(git_err)?,
        };

        let max_commits = if self.max_commits == 0 {
            usize::MAX
        } else {
            self.max_commits as usize
        };

        let mut commits = Vec::new();
        let walk = tip.ancestors().all().map_err(git_err)?;
        for info in walk {
            let info = match info {
                Ok(i) => i,
                Err(e) => {
                    warn!("Error walking commit: {e}");
                    continue;
                }
            };
            commits.push(info.id);
            if commits.len() >= max_commits {
                break;
            }
        }

        // Oldest first
        commits.reverse();
        Ok(commits)
    }

    fn commit_changes(
        &self,
        repo: &gix::Repository,
        oid: gix::ObjectId,
    ) -> Result<Vec<RawChange>, HistoryError> {
        let commit = repo.find_commit(oid).map_err(git_err)?;

        // Merge diffs repeat changes already seen on the merged branch.
        if commit.parent_ids().count() > 1 {
            return Ok(Vec::new());
        }

        let sha = oid.to_string();
        let author_sig = commit
            .author()
            .map_err(|e| git_err(format!("bad author encoding: {e}")))?;
        let email = author_sig.email.to_string();
        let author = if email.is_empty() {
            author_sig.name.to_string()
        } else {
            email
        };
        let timestamp = author_sig.time().ok().and_then(|t| gix_time_to_chrono(&t));

        let changes = compute_diff(repo, &commit)?
            .into_iter()
            .map(|(kind, previous_path, path)| RawChange {
                commit_id: sha.clone(),
                kind: kind.as_str().to_string(),
                previous_path,
                path: Some(path),
                timestamp,
                author: Some(author.clone()),
            })
            .filter(|c| self.filter.accepts(c))
            .collect();
        Ok(changes)
    }
}

impl HistorySource for GitHistorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<RawChange>, HistoryError> {
        let repo = gix::open(&self.repo_path).map_err(git_err)?;
        let commits = self.collect_commits(&repo)?;
        info!(count = commits.len(), repo = %self.repo_path.display(), "Walking commits");

        let mut changes = Vec::new();
        for oid in commits {
            match self.commit_changes(&repo, oid) {
                Ok(c) => changes.extend(c),
                Err(e) => warn!(sha = %oid, error = %e, "Failed to read commit"),
            }
        }
        debug!(changes = changes.len(), "Git history loaded");
        Ok(changes)
    }
}

fn git_err(e: impl std::fmt::Display) -> HistoryError {
    HistoryError::Git(e.to_string())
}

/// `(kind, previous_path, path)` for every file the commit touched,
/// diffed against its first parent.
fn compute_diff(
    repo: &gix::Repository,
    commit: &gix::Commit<'_>,
) -> Result<Vec<(ChangeKind, Option<String>, String)>, HistoryError> {
    let tree = commit.tree().map_err(git_err)?;

    let parent_tree = commit
        .parent_ids()
        .next()
        .and_then(|parent_id| parent_id.object().ok()?.try_into_commit().ok()?.tree().ok());

    let base = match parent_tree {
        Some(ref parent) => parent,
        None => &repo.empty_tree(),
    };

    let mut platform = base.changes().map_err(git_err)?;

    let mut out = Vec::new();
    platform
        .for_each_to_obtain_tree(&tree, |change| {
            use gix::object::tree::diff::Change;
            match change {
                Change::Addition { location, .. } => {
                    out.push((ChangeKind::Added, None, location.to_string()));
                }
                Change::Deletion { location, .. } => {
                    out.push((ChangeKind::Deleted, None, location.to_string()));
                }
                Change::Modification { location, .. } => {
                    out.push((ChangeKind::Modified, None, location.to_string()));
                }
                Change::Rewrite {
                    source_location,
                    location,
                    ..
                } => {
                    out.push((
                        ChangeKind::Renamed,
                        Some(source_location.to_string()),
                        location.to_string(),
                    ));
                }
            }
            Ok::<_, std::convert::Infallible>(std::ops::ControlFlow::Continue(()))
        })
        .map_err(|e| git_err(format!("diff error: {e}")))?;

    Ok(out)
}

fn gix_time_to_chrono(time: &gix::date::Time) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(time.seconds, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str], date: &str) {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .output()
            .expect("git command failed");
        assert!(out.status.success(), "git {args:?} failed: {out:?}");
    }

    /// Three commits: add two files, modify one, rename the other.
    fn create_test_repo(dir: &Path) {
        let date = "2024-01-01T00:00:00Z";
        git(dir, &["init", "--initial-branch=main"], date);
        git(dir, &["config", "user.email", "test@example.com"], date);
        git(dir, &["config", "user.name", "Test"], date);

        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src/Order.java"), "class Order { int id; }\n").unwrap();
        std::fs::write(
            dir.join("src/Customer.java"),
            "class Customer {\n  String name;\n  String email;\n  int age;\n}\n",
        )
        .unwrap();
        std::fs::write(dir.join("README.md"), "# shop\n").unwrap();
        git(dir, &["add", "."], date);
        git(dir, &["commit", "-m", "Initial commit"], "2024-01-01T00:00:00Z");

        std::fs::write(dir.join("src/Order.java"), "class Order { int id; int qty; }\n").unwrap();
        git(dir, &["add", "."], date);
        git(dir, &["commit", "-m", "Add qty"], "2024-01-01T00:10:00Z");

        git(dir, &["mv", "src/Customer.java", "src/Client.java"], date);
        git(dir, &["commit", "-m", "Rename customer"], "2024-01-02T00:00:00Z");
    }

    #[test]
    fn loads_history_oldest_first_with_renames() {
        let tmp = tempfile::tempdir().unwrap();
        create_test_repo(tmp.path());

        let source = GitHistorySource::new(tmp.path())
            .filter(PathFilter::new(&["**/*.java".to_string()], &[]).unwrap());
        let changes = source.load().unwrap();

        let kinds: Vec<(&str, &str)> = changes
            .iter()
            .map(|c| (c.kind.as_str(), c.path.as_deref().unwrap()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("ADDED", "src/Customer.java"),
                ("ADDED", "src/Order.java"),
                ("MODIFIED", "src/Order.java"),
                ("RENAMED", "src/Client.java"),
            ]
        );
        assert_eq!(changes[3].previous_path.as_deref(), Some("src/Customer.java"));
        assert_eq!(changes[0].author.as_deref(), Some("test@example.com"));
        assert_eq!(
            changes[2].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap())
        );
    }

    #[test]
    fn max_commits_keeps_the_latest() {
        let tmp = tempfile::tempdir().unwrap();
        create_test_repo(tmp.path());

        let changes = GitHistorySource::new(tmp.path())
            .max_commits(1)
            .load()
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, "RENAMED");
    }

    #[test]
    fn until_stops_at_revision() {
        let tmp = tempfile::tempdir().unwrap();
        create_test_repo(tmp.path());

        let changes = GitHistorySource::new(tmp.path())
            .until(Some("HEAD~1".into()))
            .load()
            .unwrap();
        assert!(changes.iter().all(|c| c.kind != "RENAMED"));
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn missing_repository_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = GitHistorySource::new(&tmp.path().join("nope")).load();
        assert!(matches!(err, Err(HistoryError::Git(_))));
    }
}
