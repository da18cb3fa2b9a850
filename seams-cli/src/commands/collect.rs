use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use seams_core::artifacts::{self, AUTHORS_FILE, COUPLING_FILE, TIMELINE_FILE};
use seams_core::pipeline::AnalysisContext;

use super::{Format, Globals, HistoryArgs};

#[derive(Args, Debug)]
pub struct CollectArgs {
    #[command(flatten)]
    pub history: HistoryArgs,

    /// Directory for timeline.json, commit.json, and authors.json
    #[arg(long)]
    pub out: PathBuf,

    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

pub fn run(args: CollectArgs, globals: &Globals) -> anyhow::Result<()> {
    let config = super::load_config(globals)?;
    let source = args.history.source(&config)?;
    let codebase = args.history.codebase();

    let (ctx, summary) = AnalysisContext::collect(codebase.as_str(), config, source.as_ref())
        .with_context(|| format!("Cannot read input history for {codebase}"))?;
    let coupling = ctx.coupling();

    artifacts::write_json(&args.out.join(TIMELINE_FILE), ctx.timeline())?;
    artifacts::write_adjacency(&args.out.join(COUPLING_FILE), &coupling.to_adjacency())?;
    artifacts::write_adjacency(&args.out.join(AUTHORS_FILE), &ctx.authors())?;

    match args.format {
        Format::Json => super::print_json(&serde_json::json!({
            "codebase": codebase,
            "raw_changes": summary.raw_changes,
            "records": summary.records,
            "files": summary.files,
            "skipped": summary.skipped,
            "excluded_commits": summary.excluded_commits,
            "coupled_pairs": coupling.pair_count(),
            "out": args.out.display().to_string(),
        })),
        Format::Text => {
            println!("Collected {codebase}");
            println!(
                "  {} records over {} files ({} raw changes)",
                summary.records, summary.files, summary.raw_changes
            );
            if summary.skipped > 0 || summary.excluded_commits > 0 {
                println!(
                    "  {} malformed records skipped, {} bulk commits excluded",
                    summary.skipped, summary.excluded_commits
                );
            }
            println!("  {} coupled pairs", coupling.pair_count());
            println!("  Artifacts written to {}", args.out.display());
        }
    }
    Ok(())
}
