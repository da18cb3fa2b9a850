use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use seams_core::artifacts;
use seams_core::cluster::{CutSpec, Dendrogram, Linkage};
use seams_core::coupling::CouplingMatrix;
use seams_core::similarity::{SignalInputs, SignalSet, Weights};

use super::{Format, Globals};

#[derive(Args, Debug)]
pub struct DecomposeArgs {
    /// Coupling adjacency artifact (commit.json)
    #[arg(long)]
    pub coupling: PathBuf,

    /// Authors artifact (authors.json)
    #[arg(long)]
    pub authors: Option<PathBuf>,

    /// Access traces; their entities join the entity set
    #[arg(long)]
    pub traces: Option<PathBuf>,

    /// Signal weights as access,write,read,sequence,commit,author
    #[arg(long, default_value = "0,0,0,0,1,0")]
    pub weights: Weights,

    /// Linkage method (default: from config)
    #[arg(long)]
    pub linkage: Option<Linkage>,

    /// Cut into this many clusters
    #[arg(long, conflicts_with = "threshold", required_unless_present = "threshold")]
    pub clusters: Option<usize>,

    /// Cut at this distance
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Where to write the cut artifact
    #[arg(long)]
    pub out: PathBuf,

    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

impl DecomposeArgs {
    fn cut(&self) -> CutSpec {
        match (self.clusters, self.threshold) {
            (Some(n), _) => CutSpec::Clusters(n),
            (None, Some(t)) => CutSpec::Threshold(t),
            // clap requires one of the two
            (None, None) => CutSpec::Clusters(1),
        }
    }
}

pub fn run(args: DecomposeArgs, globals: &Globals) -> anyhow::Result<()> {
    let config = super::load_config(globals)?;
    let linkage = args.linkage.unwrap_or(config.decompose.linkage);
    let cut = args.cut();

    let coupling = CouplingMatrix::from_adjacency(
        &artifacts::read_adjacency(&args.coupling).context("Cannot read input coupling")?,
    );
    let authors = args
        .authors
        .as_deref()
        .map(artifacts::read_adjacency)
        .transpose()
        .context("Cannot read input authors")?;
    let traces = args
        .traces
        .as_deref()
        .map(artifacts::read_traces)
        .transpose()
        .context("Cannot read input traces")?;

    let mut entities: BTreeSet<String> = coupling.files().map(String::from).collect();
    if let Some(traces) = &traces {
        entities.extend(traces.values().flat_map(|t| t.entities()).map(String::from));
    }

    let mut inputs = SignalInputs::default().coupling(&coupling);
    if let Some(authors) = &authors {
        inputs = inputs.authors(authors);
    }
    if let Some(traces) = &traces {
        inputs = inputs.traces(traces);
    }
    let signals = SignalSet::build(entities.into_iter().collect(), &inputs);
    let matrix = signals.blend(&args.weights)?;
    let decomposition = Dendrogram::build(&matrix, linkage, config.decompose.min_entities)?
        .cut(cut)?;

    artifacts::write_cut(&args.out, &decomposition)?;

    match args.format {
        Format::Json => super::print_json(&serde_json::json!({
            "entities": decomposition.entity_count(),
            "clusters": decomposition.cluster_count(),
            "weights": args.weights.to_string(),
            "linkage": linkage.as_str(),
            "cut": cut.to_string(),
            "out": args.out.display().to_string(),
        })),
        Format::Text => {
            println!(
                "{} entities in {} clusters (weights={}, linkage={}, {})",
                decomposition.entity_count(),
                decomposition.cluster_count(),
                args.weights,
                linkage,
                cut
            );
            println!("  Cut written to {}", args.out.display());
        }
    }
    Ok(())
}
