//! One analysis run over one codebase.
//!
//! [`AnalysisContext`] owns everything a run needs: the codebase name, its
//! configuration, and the normalized timeline. Contexts share nothing, so
//! several codebases can be analyzed side by side.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{info, instrument};

use crate::cluster::{DecompositionCache, SweepParams, SweepReport, sweep};
use crate::config::SeamsConfig;
use crate::coupling::{CouplingMatrix, aggregate};
use crate::extract::HistorySource;
use crate::history::{Timeline, normalize};
use crate::progress::ProgressReporter;
use crate::similarity::{SignalInputs, SignalSet};
use crate::store::{ResultStore, TimelineKey};
use crate::types::AccessTraces;

/// Counts from loading and normalizing history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub raw_changes: usize,
    pub records: usize,
    pub files: usize,
    pub skipped: usize,
    pub excluded_commits: usize,
    /// The timeline came from the results store.
    pub cached: bool,
}

/// Entity name for a source path: its file stem (`src/shop/Order.java` is
/// `Order`). Files sharing a stem collapse into one entity.
pub fn entity_name(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

#[derive(Debug, Clone)]
pub struct AnalysisContext {
    codebase: String,
    config: SeamsConfig,
    timeline: Timeline,
}

impl AnalysisContext {
    pub fn from_timeline(
        codebase: impl Into<String>,
        config: SeamsConfig,
        timeline: Timeline,
    ) -> Self {
        Self {
            codebase: codebase.into(),
            config,
            timeline,
        }
    }

    /// Load `source` and normalize it with the configured refactor cutoff.
    #[instrument(skip_all, name = "collect", fields(source = source.name()))]
    pub fn collect(
        codebase: impl Into<String>,
        config: SeamsConfig,
        source: &dyn HistorySource,
    ) -> crate::error::Result<(Self, CollectSummary)> {
        let raw = source.load()?;
        let raw_changes = raw.len();
        let outcome = normalize(raw, config.history.refactor_cutoff);

        let summary = CollectSummary {
            raw_changes,
            records: outcome.timeline.len(),
            files: outcome.timeline.files().len(),
            skipped: outcome.skipped.len(),
            excluded_commits: outcome.excluded_commits.len(),
            cached: false,
        };
        info!(
            raw_changes,
            records = summary.records,
            files = summary.files,
            skipped = summary.skipped,
            excluded_commits = summary.excluded_commits,
            "Collected history"
        );
        Ok((Self::from_timeline(codebase, config, outcome.timeline), summary))
    }

    /// Like [`collect`](Self::collect), but reuse a timeline already stored
    /// for the codebase, `until`, and history settings, and store a freshly
    /// collected one.
    pub fn collect_cached(
        codebase: impl Into<String>,
        config: SeamsConfig,
        until: Option<&str>,
        source: &dyn HistorySource,
        store: &dyn ResultStore,
    ) -> crate::error::Result<(Self, CollectSummary)> {
        let codebase = codebase.into();
        let key = TimelineKey::new(&codebase, until, &config.history);
        if let Some(timeline) = store.load_timeline(&key)? {
            info!(codebase = %codebase, records = timeline.len(), "Using cached timeline");
            let summary = CollectSummary {
                records: timeline.len(),
                files: timeline.files().len(),
                cached: true,
                ..CollectSummary::default()
            };
            return Ok((Self::from_timeline(codebase, config, timeline), summary));
        }

        let (ctx, summary) = Self::collect(codebase, config, source)?;
        store.save_timeline(&key, &ctx.timeline)?;
        Ok((ctx, summary))
    }

    pub fn codebase(&self) -> &str {
        &self.codebase
    }

    pub fn config(&self) -> &SeamsConfig {
        &self.config
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// File-level coupling over the whole timeline.
    pub fn coupling(&self) -> CouplingMatrix {
        aggregate(&self.timeline, self.config.coupling.window_seconds)
    }

    pub fn authors(&self) -> BTreeMap<String, Vec<String>> {
        self.timeline.authors()
    }

    /// Coupling and authors keyed by entity name, computed over the files
    /// that back one of `entities`. Records are renamed to their entity
    /// before bucketing, so each bucket counts an entity pair at most once.
    pub fn entity_view(
        &self,
        entities: &BTreeSet<&str>,
    ) -> (CouplingMatrix, BTreeMap<String, Vec<String>>) {
        let restricted = self
            .timeline
            .restrict_to(|path| entities.contains(entity_name(path)))
            .map_paths(|path| entity_name(path).to_string());
        let coupling = aggregate(&restricted, self.config.coupling.window_seconds);
        (coupling, restricted.authors())
    }

    /// Signals over the entities `traces` touch.
    pub fn signals(&self, traces: &AccessTraces) -> SignalSet {
        self.signals_and_authors(traces).0
    }

    fn signals_and_authors(
        &self,
        traces: &AccessTraces,
    ) -> (SignalSet, BTreeMap<String, Vec<String>>) {
        let entities: BTreeSet<&str> = traces.values().flat_map(|t| t.entities()).collect();
        let (coupling, authors) = self.entity_view(&entities);
        let inputs = SignalInputs::default()
            .traces(traces)
            .coupling(&coupling)
            .authors(&authors);
        let signals = SignalSet::build(entities.into_iter().map(String::from).collect(), &inputs);
        (signals, authors)
    }

    /// Sweep with the configured parameters.
    #[instrument(skip_all, name = "analysis", fields(codebase = %self.codebase))]
    pub fn sweep(
        &self,
        traces: &AccessTraces,
        cache: &DecompositionCache,
        progress: &dyn ProgressReporter,
    ) -> crate::error::Result<SweepReport> {
        let (signals, authors) = self.signals_and_authors(traces);
        let params = SweepParams::from_config(&self.config.decompose, &self.config.scoring);
        sweep(&signals, traces, &authors, &params, cache, progress)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::{HistoryError, SeamsError};
    use crate::progress::NoopReporter;
    use crate::store::SqliteStore;
    use crate::types::{Access, AccessMode, AccessTrace, RawChange};

    struct VecSource(Vec<RawChange>);

    impl HistorySource for VecSource {
        fn name(&self) -> &str {
            "vec"
        }

        fn load(&self) -> Result<Vec<RawChange>, HistoryError> {
            Ok(self.0.clone())
        }
    }

    fn change(commit: &str, path: &str, secs: i64, author: &str) -> RawChange {
        RawChange {
            commit_id: commit.into(),
            kind: "MODIFIED".into(),
            previous_path: None,
            path: Some(path.into()),
            timestamp: Some(Utc.timestamp_opt(secs, 0).unwrap()),
            author: Some(author.into()),
        }
    }

    fn history() -> VecSource {
        VecSource(vec![
            change("c1", "src/Order.java", 0, "ann"),
            change("c1", "src/Item.java", 0, "ann"),
            change("c2", "src/Customer.java", 10_000, "bob"),
            change("c2", "src/Address.java", 10_000, "bob"),
            change("c3", "src/Order.java", 20_000, "ann"),
            change("c3", "src/Item.java", 20_000, "ann"),
            change("c4", "README.md", 30_000, "cat"),
            RawChange {
                commit_id: "c5".into(),
                kind: "MODIFIED".into(),
                ..RawChange::default()
            },
        ])
    }

    fn traces() -> AccessTraces {
        let trace = |accesses: &[(AccessMode, &str)]| {
            AccessTrace::new(
                accesses
                    .iter()
                    .map(|(mode, entity)| Access::new(*mode, *entity))
                    .collect(),
            )
        };
        AccessTraces::from([
            (
                "CreateOrder".to_string(),
                trace(&[
                    (AccessMode::Read, "Customer"),
                    (AccessMode::Write, "Order"),
                    (AccessMode::Write, "Item"),
                ]),
            ),
            (
                "MoveCustomer".to_string(),
                trace(&[
                    (AccessMode::Read, "Order"),
                    (AccessMode::Write, "Customer"),
                    (AccessMode::Write, "Address"),
                ]),
            ),
        ])
    }

    #[test]
    fn entity_name_is_file_stem() {
        assert_eq!(entity_name("src/main/java/shop/Order.java"), "Order");
        assert_eq!(entity_name("Order"), "Order");
    }

    #[test]
    fn collect_reports_skipped_records() {
        let (ctx, summary) =
            AnalysisContext::collect("shop", SeamsConfig::default(), &history()).unwrap();
        assert_eq!(summary.raw_changes, 8);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.records, 7);
        assert_eq!(summary.files, 5);
        assert!(!summary.cached);
        assert_eq!(ctx.codebase(), "shop");
    }

    #[test]
    fn entity_view_keeps_only_trace_entities() {
        let (ctx, _) =
            AnalysisContext::collect("shop", SeamsConfig::default(), &history()).unwrap();
        let entities = BTreeSet::from(["Order", "Item", "Customer", "Address"]);
        let (coupling, authors) = ctx.entity_view(&entities);

        assert_eq!(coupling.file_count(), 4);
        assert_eq!(coupling.weight("Order", "Item"), 2);
        assert_eq!(coupling.weight("Customer", "Address"), 1);
        assert_eq!(coupling.weight("Order", "Customer"), 0);
        assert_eq!(authors["Order"], vec!["ann".to_string()]);
        assert!(!authors.contains_key("README"));
    }

    #[test]
    fn shared_stems_count_once_per_bucket() {
        let source = VecSource(vec![
            change("c1", "a/Order.java", 0, "ann"),
            change("c1", "b/Order.java", 0, "bob"),
            change("c1", "src/Item.java", 0, "ann"),
            change("c2", "a/Order.java", 10_000, "ann"),
            change("c2", "src/Item.java", 10_000, "ann"),
        ]);
        let (ctx, _) = AnalysisContext::collect("shop", SeamsConfig::default(), &source).unwrap();
        let (coupling, authors) = ctx.entity_view(&BTreeSet::from(["Order", "Item"]));

        assert_eq!(coupling.file_count(), 2);
        assert_eq!(coupling.weight("Order", "Item"), 2);
        assert_eq!(coupling.weight("Order", "Order"), 0);
        assert_eq!(
            authors["Order"],
            vec!["ann".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn sweep_runs_every_commit_blend() {
        let (ctx, _) =
            AnalysisContext::collect("shop", SeamsConfig::default(), &history()).unwrap();
        let cache = DecompositionCache::new();
        let report = ctx.sweep(&traces(), &cache, &NoopReporter).unwrap();

        assert_eq!(report.entities, 4);
        assert_eq!(report.outcomes.len(), 11);
        assert!(!report.is_partial());
        for outcome in &report.outcomes {
            assert_eq!(outcome.decomposition.entity_count(), 4);
            assert!(outcome.complexity <= report.singleton_complexity + 1e-12);
        }
    }

    #[test]
    fn sweep_with_too_few_entities_fails() {
        let (ctx, _) =
            AnalysisContext::collect("shop", SeamsConfig::default(), &history()).unwrap();
        let traces = AccessTraces::from([(
            "Tiny".to_string(),
            AccessTrace::new(vec![Access::new(AccessMode::Read, "Order")]),
        )]);
        let err = ctx
            .sweep(&traces, &DecompositionCache::new(), &NoopReporter)
            .unwrap_err();
        assert!(matches!(err, SeamsError::Decompose(_)));
    }

    #[test]
    fn cached_collect_reuses_stored_timeline() {
        let store = SqliteStore::in_memory().unwrap();
        let (first, summary) = AnalysisContext::collect_cached(
            "shop",
            SeamsConfig::default(),
            None,
            &history(),
            &store,
        )
        .unwrap();
        assert!(!summary.cached);

        let (second, summary) = AnalysisContext::collect_cached(
            "shop",
            SeamsConfig::default(),
            None,
            &VecSource(Vec::new()),
            &store,
        )
        .unwrap();
        assert!(summary.cached);
        assert_eq!(second.timeline(), first.timeline());
    }

    #[test]
    fn cached_collect_misses_on_new_history_settings() {
        let store = SqliteStore::in_memory().unwrap();
        let (loose, _) = AnalysisContext::collect_cached(
            "shop",
            SeamsConfig::default(),
            None,
            &history(),
            &store,
        )
        .unwrap();

        let mut strict = SeamsConfig::default();
        strict.history.refactor_cutoff = 1;
        let (fresh, _) = AnalysisContext::collect("shop", strict.clone(), &history()).unwrap();
        assert_ne!(fresh.timeline(), loose.timeline());

        let (cached, summary) =
            AnalysisContext::collect_cached("shop", strict.clone(), None, &history(), &store)
                .unwrap();
        assert!(!summary.cached);
        assert_eq!(cached.timeline(), fresh.timeline());

        // Both settings are now cached side by side.
        let (again, summary) = AnalysisContext::collect_cached(
            "shop",
            strict,
            None,
            &VecSource(Vec::new()),
            &store,
        )
        .unwrap();
        assert!(summary.cached);
        assert_eq!(again.timeline(), fresh.timeline());
    }

    #[test]
    fn contexts_are_deterministic() {
        let run = || {
            let (ctx, _) =
                AnalysisContext::collect("shop", SeamsConfig::default(), &history()).unwrap();
            let report = ctx
                .sweep(&traces(), &DecompositionCache::new(), &NoopReporter)
                .unwrap();
            report
                .outcomes
                .iter()
                .map(|o| (o.key, (*o.decomposition).clone(), o.complexity.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
