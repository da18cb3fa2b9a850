use crate::config::HistorySection;
use crate::error::{ConfigError, HistoryError};
use crate::types::RawChange;

/// A source of file-level change history for one codebase, oldest first.
///
/// Implementations only read. Validation of what they return happens in
/// [`normalize`](crate::history::normalize).
pub trait HistorySource {
    /// Short label used in logs and stored results.
    fn name(&self) -> &str;

    fn load(&self) -> Result<Vec<RawChange>, HistoryError>;
}

/// Include/exclude glob filter applied to every path a source emits.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    glob::Pattern::new(p)
                        .map_err(|e| ConfigError::Invalid(format!("bad glob {p:?}: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn from_config(history: &HistorySection) -> Result<Self, ConfigError> {
        Self::new(&history.include_patterns, &history.exclude_patterns)
    }

    /// An empty include list accepts everything not excluded.
    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(path));
        included && !self.exclude.iter().any(|p| p.matches(path))
    }

    /// Whether a raw change touches an accepted path. A rename is kept when
    /// either side matches, so an identity entering or leaving the filtered
    /// set keeps its rename edge.
    pub fn accepts(&self, change: &RawChange) -> bool {
        change.path.as_deref().is_none_or(|p| self.matches(p))
            || change.previous_path.as_deref().is_some_and(|p| self.matches(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_applies_include_then_exclude() {
        let filter = PathFilter::new(
            &["**/*.java".to_string()],
            &["**/test/**".to_string()],
        )
        .unwrap();
        assert!(filter.matches("src/main/java/Order.java"));
        assert!(!filter.matches("src/test/java/OrderTest.java"));
        assert!(!filter.matches("pom.xml"));
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let filter = PathFilter::default();
        assert!(filter.matches("anything/at/all.txt"));
    }

    #[test]
    fn renames_match_on_either_side() {
        let filter = PathFilter::new(&["*.java".to_string()], &[]).unwrap();
        let change = RawChange {
            commit_id: "c".into(),
            kind: "RENAMED".into(),
            previous_path: Some("Order.java".into()),
            path: Some("Order.txt".into()),
            ..RawChange::default()
        };
        assert!(filter.accepts(&change));
    }
}
