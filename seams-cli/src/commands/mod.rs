pub mod collect;
pub mod decompose;
pub mod init;
pub mod score;
pub mod sweep;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use seams_core::config::{CONFIG_FILE_NAME, SeamsConfig};
use seams_core::extract::{GitHistorySource, HistorySource, LogHistorySource, PathFilter};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default seams.toml
    Init(init::InitArgs),
    /// Normalize history and write timeline, coupling, and author artifacts
    Collect(collect::CollectArgs),
    /// Cluster a coupling artifact into one decomposition
    Decompose(decompose::DecomposeArgs),
    /// Compute the transactional complexity of a decomposition
    Score(score::ScoreArgs),
    /// Run the full pipeline over every signal blend and cluster count
    Sweep(sweep::SweepArgs),
}

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    pub config: Option<PathBuf>,
    pub quiet: bool,
}

pub fn run(cmd: Command, globals: &Globals) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args),
        Command::Collect(args) => collect::run(args, globals),
        Command::Decompose(args) => decompose::run(args, globals),
        Command::Score(args) => score::run(args, globals),
        Command::Sweep(args) => sweep::run(args, globals),
    }
}

/// Load the config named by `--config`, else `./seams.toml` when present,
/// else the defaults.
pub fn load_config(globals: &Globals) -> anyhow::Result<SeamsConfig> {
    let path = match &globals.config {
        Some(path) => path.clone(),
        None => {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if !local.exists() {
                return Ok(SeamsConfig::default());
            }
            local
        }
    };
    let config = SeamsConfig::load(&path)
        .with_context(|| format!("Cannot load config: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Where history comes from: a git repository, or a pre-extracted log.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Path to git repository (default: current directory)
    #[arg(default_value = ".")]
    pub repo: PathBuf,

    /// Read history from a semicolon-separated log instead of git
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Terminal commit (any revision git understands)
    #[arg(long)]
    pub until: Option<String>,

    /// Codebase name (default: repository directory name)
    #[arg(long)]
    pub name: Option<String>,
}

impl HistoryArgs {
    pub fn source(&self, config: &SeamsConfig) -> anyhow::Result<Box<dyn HistorySource>> {
        let filter = PathFilter::from_config(&config.history).context("Invalid config globs")?;
        if let Some(log) = &self.log {
            anyhow::ensure!(log.is_file(), "Input not found: {}", log.display());
            return Ok(Box::new(LogHistorySource::new(log).filter(filter)));
        }

        let repo = resolve_path(&self.repo)?;
        Ok(Box::new(
            GitHistorySource::new(&repo)
                .until(self.until.clone())
                .max_commits(config.history.max_commits)
                .filter(filter),
        ))
    }

    pub fn codebase(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let base = self.log.as_deref().unwrap_or(&self.repo);
        std::fs::canonicalize(base)
            .ok()
            .and_then(|p| {
                let stem = if self.log.is_some() {
                    p.file_stem()
                } else {
                    p.file_name()
                };
                stem.map(|s| s.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "codebase".to_string())
    }
}

pub fn resolve_path(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Cannot resolve path: {}", path.display()))
}

/// Output format for commands that print results.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Json,
}

pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("self-constructed JSON is serializable")
    );
}
