use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use seams_core::config::{CONFIG_FILE_NAME, SeamsConfig};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to write seams.toml into (default: current directory)
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite an existing seams.toml
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    let dir = super::resolve_path(&args.dir)?;
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() && !args.force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let text = SeamsConfig::default()
        .to_toml_string()
        .context("Cannot serialize default config")?;
    std::fs::write(&path, text).with_context(|| format!("Cannot write {}", path.display()))?;

    println!("Wrote {}", path.display());
    Ok(())
}
