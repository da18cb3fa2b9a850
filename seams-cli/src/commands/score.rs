use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use seams_core::artifacts;
use seams_core::score::{ComplexityNormalization, Scorer};

use super::{Format, Globals};

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Cut artifact produced by `seams decompose`
    #[arg(long)]
    pub cut: PathBuf,

    /// Access-trace artifact
    #[arg(long)]
    pub traces: PathBuf,

    /// all-traces, multi-cluster-traces, or clusters (default: from config)
    #[arg(long)]
    pub normalization: Option<ComplexityNormalization>,

    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

pub fn run(args: ScoreArgs, globals: &Globals) -> anyhow::Result<()> {
    let config = super::load_config(globals)?;
    let normalization = args
        .normalization
        .unwrap_or(config.scoring.normalization);

    let decomposition = artifacts::read_cut(&args.cut).context("Cannot read input cut")?;
    let traces = artifacts::read_traces(&args.traces).context("Cannot read input traces")?;
    let score = Scorer::new(normalization).score(&decomposition, &traces)?;

    match args.format {
        Format::Json => super::print_json(&serde_json::json!({
            "complexity": score.complexity,
            "total_cost": score.total_cost,
            "traces": score.traces,
            "multi_cluster_traces": score.multi_cluster_traces,
            "clusters": score.clusters,
            "per_trace": score.per_trace,
        })),
        Format::Text => println!("{}", score.complexity),
    }
    Ok(())
}
