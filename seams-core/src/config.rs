use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::Linkage;
use crate::error::ConfigError;
use crate::score::ComplexityNormalization;
use crate::similarity::SignalMode;

/// Name of the configuration file `seams init` writes.
pub const CONFIG_FILE_NAME: &str = "seams.toml";

/// Top-level seams configuration, matching `seams.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeamsConfig {
    #[serde(default)]
    pub seams: SeamsSection,
    #[serde(default)]
    pub history: HistorySection,
    #[serde(default)]
    pub coupling: CouplingSection,
    #[serde(default)]
    pub decompose: DecomposeSection,
    #[serde(default)]
    pub scoring: ScoringSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeamsSection {
    pub version: String,
}

impl Default for SeamsSection {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Commits touching more valid files than this are excluded from coupling.
    pub refactor_cutoff: usize,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// 0 walks the whole history.
    pub max_commits: u32,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            refactor_cutoff: 100,
            include_patterns: vec!["**/*.java".into()],
            exclude_patterns: vec![
                "**/target/**".into(),
                "**/build/**".into(),
                "**/.git/**".into(),
            ],
            max_commits: 0,
        }
    }
}

impl HistorySection {
    /// Identity of the settings a timeline is normalized under. Two sections
    /// with the same key produce the same timeline from the same history.
    pub fn cache_key(&self) -> String {
        format!(
            "cutoff={};max_commits={};include={};exclude={}",
            self.refactor_cutoff,
            self.max_commits,
            self.include_patterns.join("|"),
            self.exclude_patterns.join("|"),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingSection {
    pub window_seconds: i64,
}

impl Default for CouplingSection {
    fn default() -> Self {
        Self {
            window_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposeSection {
    pub linkage: Linkage,
    /// Every blend's weights sum to this value.
    pub weight_interval: u32,
    pub min_entities: usize,
    pub mode: SignalMode,
}

impl Default for DecomposeSection {
    fn default() -> Self {
        Self {
            linkage: Linkage::Average,
            weight_interval: 10,
            min_entities: crate::cluster::MIN_ENTITIES,
            mode: SignalMode::Commit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub normalization: ComplexityNormalization,
}

impl SeamsConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.refactor_cutoff == 0 {
            return Err(ConfigError::Invalid(
                "history.refactor_cutoff must be at least 1".into(),
            ));
        }
        if self.coupling.window_seconds <= 0 {
            return Err(ConfigError::Invalid(format!(
                "coupling.window_seconds must be positive, got {}",
                self.coupling.window_seconds
            )));
        }
        if self.decompose.weight_interval == 0 {
            return Err(ConfigError::Invalid(
                "decompose.weight_interval must be at least 1".into(),
            ));
        }
        if self.decompose.min_entities < 2 {
            return Err(ConfigError::Invalid(format!(
                "decompose.min_entities must be at least 2, got {}",
                self.decompose.min_entities
            )));
        }
        for pattern in self
            .history
            .include_patterns
            .iter()
            .chain(&self.history.exclude_patterns)
        {
            glob::Pattern::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("bad glob {pattern:?}: {e}")))?;
        }
        Ok(())
    }
}
