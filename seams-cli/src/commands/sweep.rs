use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use seams_core::artifacts;
use seams_core::cluster::DecompositionCache;
use seams_core::pipeline::AnalysisContext;
use seams_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use seams_core::similarity::SignalMode;
use seams_core::store::{ResultStore, SqliteStore};

use super::{Format, Globals, HistoryArgs};

#[derive(Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub history: HistoryArgs,

    /// Access-trace artifact
    #[arg(long)]
    pub traces: PathBuf,

    /// Record every outcome in this results database
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Signal family: static, commit, or mixed (default: from config)
    #[arg(long)]
    pub mode: Option<SignalMode>,

    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

pub fn run(args: SweepArgs, globals: &Globals) -> anyhow::Result<()> {
    let mut config = super::load_config(globals)?;
    if let Some(mode) = args.mode {
        config.decompose.mode = mode;
    }

    let traces = artifacts::read_traces(&args.traces).context("Cannot read input traces")?;
    let source = args.history.source(&config)?;
    let codebase = args.history.codebase();

    let store = args
        .db
        .as_deref()
        .map(|path| {
            SqliteStore::open(path)
                .with_context(|| format!("Cannot open database: {}", path.display()))
        })
        .transpose()?;

    let (ctx, summary) = match &store {
        Some(store) => AnalysisContext::collect_cached(
            codebase.as_str(),
            config,
            args.history.until.as_deref(),
            source.as_ref(),
            store,
        ),
        None => AnalysisContext::collect(codebase.as_str(), config, source.as_ref()),
    }
    .with_context(|| format!("Cannot read input history for {codebase}"))?;

    let reporter: Box<dyn ProgressReporter> = if globals.quiet {
        Box::new(NoopReporter)
    } else {
        Box::new(IndicatifReporter::stderr())
    };
    let cache = DecompositionCache::new();
    let report = ctx.sweep(&traces, &cache, reporter.as_ref())?;

    let run_id = store
        .as_ref()
        .map(|store| store.record_sweep(&codebase, &report))
        .transpose()
        .context("Failed to record sweep in database")?;

    let best = report.best_per_cluster_count();
    match args.format {
        Format::Json => {
            let best: Vec<serde_json::Value> = best
                .values()
                .map(|o| {
                    serde_json::json!({
                        "clusters": o.key.clusters,
                        "weights": o.key.weights.to_string(),
                        "linkage": o.key.linkage.as_str(),
                        "complexity": o.complexity,
                        "pondered_complexity": o.pondered_complexity,
                        "tsr": o.tsr,
                    })
                })
                .collect();
            super::print_json(&serde_json::json!({
                "codebase": codebase,
                "mode": report.mode.as_str(),
                "entities": report.entities,
                "records": summary.records,
                "cached_timeline": summary.cached,
                "singleton_complexity": report.singleton_complexity,
                "outcomes": report.outcomes.len(),
                "errors": report.errors.len(),
                "run_id": run_id.map(|id| id.to_string()),
                "best": best,
            }));
        }
        Format::Text => {
            println!(
                "Swept {codebase}: {} entities, {} outcomes in {:.1}s ({} mode)",
                report.entities,
                report.outcomes.len(),
                report.duration.as_secs_f64(),
                report.mode.as_str()
            );
            println!("  singleton complexity {:.4}", report.singleton_complexity);
            for (n, o) in &best {
                println!(
                    "  n={n:<3} complexity={:.4} pondered={:.4} tsr={:.4} weights={}",
                    o.complexity, o.pondered_complexity, o.tsr, o.key.weights
                );
            }
            if let Some(run_id) = run_id {
                println!("  Recorded as run {run_id}");
            }
        }
    }

    if report.is_partial() {
        for (label, err) in &report.errors {
            eprintln!("  {label}: {err}");
        }
        anyhow::bail!(
            "Partial success: {} of {} sweep combinations failed",
            report.errors.len(),
            report.errors.len() + report.outcomes.len()
        );
    }
    Ok(())
}
